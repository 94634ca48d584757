//! Commands on the reserved `"ctrl"` channel.
//!
//! Every ctrl payload starts with a 4-byte command code. The peer drives
//! the bridge with `tick`/`addBreak`/`remBreak`/`set`/`shutdown`; the
//! bridge answers with `tock`/`ackBreak`/`hitBreak` and echoes `shutdown`
//! when it drains.

use std::fmt;

use bytes::BufMut;
use cosim_common::SimTime;

use crate::{codec, Message, WireError, WireResult, CTRL_CHANNEL};

/// Command codes, first payload word of every ctrl message.
pub mod code {
    pub const TICK: u32 = 0;
    pub const TOCK: u32 = 1;
    pub const EXIT: u32 = 2;
    pub const SHUTDOWN: u32 = 3;
    pub const SET: u32 = 4;
    pub const ADD_BREAK: u32 = 5;
    pub const REM_BREAK: u32 = 6;
    pub const ACK_BREAK: u32 = 7;
    pub const HIT_BREAK: u32 = 8;
}

/// The one configuration name the `set` command recognizes.
pub const CFG_LOGLEVEL: &str = "loglevel";

/// What a breakpoint does when its threshold is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BreakKind {
    /// Block the simulator while active.
    Hold = 0,
    /// Report and keep running.
    Stop = 1,
    /// Report and begin shutdown.
    Finish = 2,
}

impl BreakKind {
    /// The wire byte.
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decode the wire byte.
    pub fn from_u8(byte: u8) -> WireResult<BreakKind> {
        match byte {
            0 => Ok(BreakKind::Hold),
            1 => Ok(BreakKind::Stop),
            2 => Ok(BreakKind::Finish),
            other => Err(WireError::BadBreakKind(other)),
        }
    }
}

impl fmt::Display for BreakKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BreakKind::Hold => "hold",
            BreakKind::Stop => "stop",
            BreakKind::Finish => "finish",
        };
        f.write_str(name)
    }
}

/// A decoded ctrl-channel command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtrlMessage {
    /// Keep-alive request (peer → bridge).
    Tick,
    /// Keep-alive answer carrying the current simulated time.
    Tock {
        now: SimTime,
    },
    /// Hard-exit request; accepted on the wire but not acted upon.
    Exit,
    /// Close the connection after outstanding messages flush.
    Shutdown,
    /// Set a named configuration value; `args` is the name-specific rest
    /// of the payload.
    Set {
        name: String,
        args: Vec<u8>,
    },
    /// Schedule a breakpoint.
    AddBreak {
        id: u32,
        thresh: SimTime,
        /// Whether `thresh` counts clock cycles.
        cycles: bool,
        kind: BreakKind,
        /// Whether `thresh` is relative to the current time.
        relative: bool,
    },
    /// Remove a breakpoint.
    RemBreak {
        id: u32,
    },
    /// A breakpoint was acknowledged at its resolved absolute threshold.
    AckBreak {
        id: u32,
        thresh: SimTime,
    },
    /// A breakpoint's threshold was reached.
    HitBreak {
        id: u32,
        now: SimTime,
    },
}

impl CtrlMessage {
    /// Decode a ctrl payload.
    pub fn decode(payload: &[u8]) -> WireResult<CtrlMessage> {
        let mut buf = payload;
        let command = codec::get_u32(&mut buf)?;
        match command {
            code::TICK => Ok(CtrlMessage::Tick),
            code::TOCK => {
                let (now, _) = codec::get_sim_time(&mut buf)?;
                Ok(CtrlMessage::Tock { now })
            }
            code::EXIT => Ok(CtrlMessage::Exit),
            code::SHUTDOWN => Ok(CtrlMessage::Shutdown),
            code::SET => {
                let name = codec::get_lp_string(&mut buf)?;
                Ok(CtrlMessage::Set {
                    name,
                    args: buf.to_vec(),
                })
            }
            code::ADD_BREAK => {
                let id = codec::get_u32(&mut buf)?;
                let (thresh, cycles) = codec::get_sim_time(&mut buf)?;
                let kind = BreakKind::from_u8(codec::get_u8(&mut buf)?)?;
                let relative = codec::get_u8(&mut buf)? != 0;
                Ok(CtrlMessage::AddBreak {
                    id,
                    thresh,
                    cycles,
                    kind,
                    relative,
                })
            }
            code::REM_BREAK => {
                let id = codec::get_u32(&mut buf)?;
                Ok(CtrlMessage::RemBreak { id })
            }
            code::ACK_BREAK => {
                let id = codec::get_u32(&mut buf)?;
                let (thresh, _) = codec::get_sim_time(&mut buf)?;
                Ok(CtrlMessage::AckBreak { id, thresh })
            }
            code::HIT_BREAK => {
                let id = codec::get_u32(&mut buf)?;
                let (now, _) = codec::get_sim_time(&mut buf)?;
                Ok(CtrlMessage::HitBreak { id, now })
            }
            other => Err(WireError::UnknownCommand(other)),
        }
    }

    /// Encode as a ctrl payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            CtrlMessage::Tick => buf.put_u32(code::TICK),
            CtrlMessage::Tock { now } => {
                buf.put_u32(code::TOCK);
                codec::put_sim_time(&mut buf, *now, false);
            }
            CtrlMessage::Exit => buf.put_u32(code::EXIT),
            CtrlMessage::Shutdown => buf.put_u32(code::SHUTDOWN),
            CtrlMessage::Set { name, args } => {
                buf.put_u32(code::SET);
                codec::put_lp_string(&mut buf, name);
                buf.put_slice(args);
            }
            CtrlMessage::AddBreak {
                id,
                thresh,
                cycles,
                kind,
                relative,
            } => {
                buf.put_u32(code::ADD_BREAK);
                buf.put_u32(*id);
                codec::put_sim_time(&mut buf, *thresh, *cycles);
                buf.put_u8(kind.as_u8());
                buf.put_u8(*relative as u8);
            }
            CtrlMessage::RemBreak { id } => {
                buf.put_u32(code::REM_BREAK);
                buf.put_u32(*id);
            }
            CtrlMessage::AckBreak { id, thresh } => {
                buf.put_u32(code::ACK_BREAK);
                buf.put_u32(*id);
                codec::put_sim_time(&mut buf, *thresh, false);
            }
            CtrlMessage::HitBreak { id, now } => {
                buf.put_u32(code::HIT_BREAK);
                buf.put_u32(*id);
                codec::put_sim_time(&mut buf, *now, false);
            }
        }
        buf
    }

    /// Wrap the encoded payload in a `"ctrl"` message.
    pub fn to_message(&self) -> Message {
        Message::new(CTRL_CHANNEL, self.encode())
    }
}

/// Decode the `loglevel` arguments: a length-prefixed scope string and a
/// 4-byte level code.
pub fn decode_loglevel(args: &[u8]) -> WireResult<(String, u32)> {
    let mut buf = args;
    let scope = codec::get_lp_string(&mut buf)?;
    let level = codec::get_u32(&mut buf)?;
    Ok((scope, level))
}

/// Encode `loglevel` arguments for a `set` command.
pub fn encode_loglevel(scope: &str, level: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    codec::put_lp_string(&mut buf, scope);
    buf.put_u32(level);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_layout() {
        let raw = CtrlMessage::Tick.encode();
        assert_eq!(raw, vec![0, 0, 0, 0]);
        assert_eq!(CtrlMessage::decode(&raw).unwrap(), CtrlMessage::Tick);
        // the ctrl frame around it is exactly the minimum frame size
        assert_eq!(CtrlMessage::Tick.to_message().frame_len(), 16);
    }

    #[test]
    fn test_tock_layout() {
        let tock = CtrlMessage::Tock {
            now: SimTime::from_ps(0x0a0b),
        };
        let raw = tock.encode();
        assert_eq!(raw.len(), 13);
        assert_eq!(&raw[..4], &[0, 0, 0, 1]);
        assert_eq!(&raw[10..12], &[0x0a, 0x0b]);
        assert_eq!(raw[12], 0);
        assert_eq!(CtrlMessage::decode(&raw).unwrap(), tock);
    }

    #[test]
    fn test_add_break_layout() {
        let add = CtrlMessage::AddBreak {
            id: 3,
            thresh: SimTime::from_ns(1),
            cycles: false,
            kind: BreakKind::Finish,
            relative: true,
        };
        let raw = add.encode();
        assert_eq!(raw.len(), 19);
        assert_eq!(&raw[..4], &[0, 0, 0, 5]);
        assert_eq!(&raw[4..8], &[0, 0, 0, 3]);
        // 9-byte time at [8..17), then kind and relative flag
        assert_eq!(raw[17], 2);
        assert_eq!(raw[18], 1);
        assert_eq!(CtrlMessage::decode(&raw).unwrap(), add);
    }

    #[test]
    fn test_break_reply_layouts() {
        for msg in [
            CtrlMessage::AckBreak {
                id: 9,
                thresh: SimTime::from_us(2),
            },
            CtrlMessage::HitBreak {
                id: 9,
                now: SimTime::from_us(2),
            },
        ] {
            let raw = msg.encode();
            assert_eq!(raw.len(), 17);
            assert_eq!(CtrlMessage::decode(&raw).unwrap(), msg);
        }
    }

    #[test]
    fn test_set_loglevel_roundtrip() {
        let set = CtrlMessage::Set {
            name: CFG_LOGLEVEL.to_string(),
            args: encode_loglevel("connection", 10),
        };
        let decoded = CtrlMessage::decode(&set.encode()).unwrap();
        match decoded {
            CtrlMessage::Set { name, args } => {
                assert_eq!(name, CFG_LOGLEVEL);
                assert_eq!(decode_loglevel(&args).unwrap(), ("connection".to_string(), 10));
            }
            other => panic!("unexpected decode: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_command() {
        let raw = 42u32.to_be_bytes();
        assert!(matches!(
            CtrlMessage::decode(&raw),
            Err(WireError::UnknownCommand(42))
        ));
    }

    #[test]
    fn test_bad_break_kind() {
        let mut raw = CtrlMessage::AddBreak {
            id: 1,
            thresh: SimTime::ZERO,
            cycles: false,
            kind: BreakKind::Hold,
            relative: false,
        }
        .encode();
        raw[17] = 7;
        assert!(matches!(
            CtrlMessage::decode(&raw),
            Err(WireError::BadBreakKind(7))
        ));
    }

    #[test]
    fn test_truncated_payload() {
        assert!(matches!(
            CtrlMessage::decode(&[0, 0]),
            Err(WireError::Truncated { .. })
        ));
        // tock without its time field
        assert!(CtrlMessage::decode(&[0, 0, 0, 1]).is_err());
    }
}
