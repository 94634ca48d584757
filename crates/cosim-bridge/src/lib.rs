//! Synchronization and transport core of a hardware co-simulation bridge.
//!
//! An external controller process drives and observes a digital-logic
//! simulator at defined points in simulated time. This crate is the piece
//! in between: it serves one controller connection at a time on a local
//! socket, multiplexes named channels over it, enforces simulated-time
//! breakpoints, and converts between raw per-cycle signal observations
//! and discrete timestamped change events.
//!
//! ## Structure
//!
//! - [`Control`] — the per-process context object: owns the connection,
//!   the channel registry, the breakpoint set and the simulated clock;
//!   runs the command and dispatch threads.
//! - [`Connection`] — one listening socket, one peer generation at a
//!   time, with automatic recovery when a peer dies.
//! - [`Player`] / [`Recorder`] — the per-channel read and write sides a
//!   simulator adapter uses inside its clock callback.
//! - [`MessageQueue`] — the FIFO mailbox everything above is built on.
//!
//! The embedding simulator adapter typically does, once per clock step:
//!
//! ```ignore
//! control.report_time(now);
//! control.wait_hold();
//! if control.check_break(BreakKind::Stop) { /* pause the run */ }
//! if control.check_break(BreakKind::Finish) {
//!     control.shutdown();
//!     /* finish the simulation */
//! }
//! ```

mod breaks;
mod config;
mod connection;
mod control;
mod error;
mod player;
mod queue;
mod recorder;

pub use breaks::Break;
pub use config::BridgeConfig;
pub use connection::Connection;
pub use control::Control;
pub use error::{BridgeError, FetchTimeout};
pub use player::{PlayedValue, Player};
pub use queue::MessageQueue;
pub use recorder::Recorder;

pub use cosim_wire::{Bits, BreakKind, Change, CtrlMessage, Logic, Message};
