//! Channel-tagged transport messages.

use bytes::BufMut;

use crate::{codec, WireError, WireResult};

/// Base frame overhead: the length word plus the channel-length word.
pub const FRAME_HEADER_LEN: usize = 8;

/// Smallest frame the receive side accepts.
pub const MIN_FRAME_LEN: usize = 16;

/// Largest frame either side accepts.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// The reserved command channel.
pub const CTRL_CHANNEL: &str = "ctrl";

/// One transport unit: a payload addressed to a named channel.
///
/// The payload buffer is owned by the message; moving a `Message` moves
/// the buffer with it. A zero-length payload is an empty buffer, which is
/// distinct from "no payload" nowhere in this protocol — every frame has
/// a (possibly empty) payload region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    channel: String,
    payload: Vec<u8>,
}

impl Message {
    /// Create a message for a channel.
    pub fn new(channel: impl Into<String>, payload: Vec<u8>) -> Message {
        Message {
            channel: channel.into(),
            payload,
        }
    }

    /// The channel this message is addressed to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total frame size on the wire: payload + header + channel name.
    pub fn frame_len(&self) -> usize {
        self.payload.len() + FRAME_HEADER_LEN + self.channel.len()
    }

    /// Encode the full frame. The result is exactly [`frame_len`] bytes
    /// and starts with that length as a big-endian u32.
    ///
    /// [`frame_len`]: Message::frame_len
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.frame_len());
        buf.put_u32(self.frame_len() as u32);
        buf.put_u32(self.channel.len() as u32);
        buf.put_slice(self.channel.as_bytes());
        buf.put_slice(&self.payload);
        buf
    }

    /// Decode a full frame (including the leading length word).
    ///
    /// The payload length is whatever the total length leaves after the
    /// header and channel name. Header consistency is checked here; the
    /// [16, 1 MiB] total-length policy is the connection layer's job.
    pub fn decode(frame: &[u8]) -> WireResult<Message> {
        let mut buf = frame;
        let frame_len = codec::get_u32(&mut buf)? as usize;
        let channel_len = codec::get_u32(&mut buf)? as usize;
        let payload_len = frame_len
            .checked_sub(FRAME_HEADER_LEN + channel_len)
            .ok_or(WireError::BadChannelLength {
                channel_len,
                frame_len,
            })?;
        if buf.len() < channel_len + payload_len {
            return Err(WireError::Truncated {
                needed: channel_len + payload_len,
                have: buf.len(),
            });
        }
        let channel = String::from_utf8(buf[..channel_len].to_vec())?;
        let payload = buf[channel_len..channel_len + payload_len].to_vec();
        Ok(Message { channel, payload })
    }
}
