//! Error types for wire encoding and decoding.

use thiserror::Error;

/// Errors that can occur while decoding wire data.
#[derive(Debug, Error)]
pub enum WireError {
    /// Not enough bytes left for the field being read.
    #[error("truncated data: need {needed} more bytes, have {have}")]
    Truncated {
        /// Bytes the field requires.
        needed: usize,
        /// Bytes remaining.
        have: usize,
    },

    /// A frame's channel-name length does not fit inside its total length.
    #[error("channel length {channel_len} does not fit frame length {frame_len}")]
    BadChannelLength {
        /// Declared channel-name length.
        channel_len: usize,
        /// Declared total frame length.
        frame_len: usize,
    },

    /// Unknown control command code.
    #[error("unknown command code: {0}")]
    UnknownCommand(u32),

    /// Invalid break type byte.
    #[error("invalid break type: {0}")]
    BadBreakKind(u8),

    /// A nibble that is not one of the nine logic values.
    #[error("invalid logic value nibble: {0:#x}")]
    BadLogicValue(u8),

    /// A string field that is not valid UTF-8.
    #[error("invalid string payload: {0}")]
    BadString(#[from] std::string::FromUtf8Error),
}

/// Result alias for wire operations.
pub type WireResult<T> = Result<T, WireError>;
