//! Wire protocol of the cosim bridge.
//!
//! A controller process and a hardware simulator talk over one local
//! stream socket. Everything on that socket is a length-prefixed frame
//! carrying a channel-tagged [`Message`]:
//!
//! | offset | size | description |
//! |--------|------|--------------------------------------|
//! | 0      | 4    | total frame length (including this)  |
//! | 4      | 4    | channel-name length `n`              |
//! | 8      | n    | channel name (UTF-8, no terminator)  |
//! | 8+n    | rest | payload                              |
//!
//! All multi-byte integers are big-endian. The reserved `"ctrl"` channel
//! carries [`CtrlMessage`] command payloads; every other channel carries
//! one [`Change`] — a timestamped transition of a 9-valued [`Bits`]
//! vector.
//!
//! This crate only encodes and decodes; socket handling, frame-size
//! policy enforcement and dispatch live in `cosim-bridge`.

mod change;
mod codec;
mod command;
mod error;
mod message;
mod signal;

pub use change::*;
pub use codec::*;
pub use command::*;
pub use error::*;
pub use message::*;
pub use signal::*;
