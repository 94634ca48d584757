//! Error types for the bridge.

use thiserror::Error;

use cosim_wire::WireError;

/// Errors from control-level operations.
///
/// These indicate adapter or peer misconfiguration, not a recoverable
/// runtime state; connection faults never surface here (they terminate
/// one peer generation internally and the next peer is served).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A break id that is not currently scheduled.
    #[error("break id {0} not found")]
    BreakNotFound(u32),

    /// A `set` command naming no known configuration value.
    #[error("unknown config name: {0}")]
    UnknownConfig(String),

    /// A malformed payload.
    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A value fetch ran out of time waiting for a change.
///
/// This is the one routine failure of [`Player::get`] and
/// [`Player::get_next`]: the active value is synchronous and its
/// successor has not arrived yet. Callers retry, checking
/// [`Control::is_shutdown`] in between.
///
/// [`Player::get`]: crate::Player::get
/// [`Player::get_next`]: crate::Player::get_next
/// [`Control::is_shutdown`]: crate::Control::is_shutdown
#[derive(Debug, Error)]
#[error("timed out waiting for a change on channel {channel}")]
pub struct FetchTimeout {
    /// The channel that starved.
    pub channel: String,
}
