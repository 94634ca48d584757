//! Common types shared by the cosim crates.
//!
//! This crate holds the pieces every other layer needs: the simulated-time
//! type with its unit constants and frequency conversions, and the log
//! severity model with the per-scope level registry that backs the
//! protocol's `loglevel` configuration command.

pub mod logging;
pub mod time;

pub use logging::Severity;
pub use time::{fmt_time, freq_to_period, period_to_freq, SimFreq, SimTime};
