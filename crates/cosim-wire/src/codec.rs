//! Checked big-endian field access.
//!
//! Thin wrappers around `bytes::{Buf, BufMut}` that length-check before
//! reading so malformed frames fail with [`WireError::Truncated`] instead
//! of panicking, plus the two composite fields the protocol uses
//! everywhere: the 9-byte simulated-time value and length-prefixed
//! strings.

use bytes::{Buf, BufMut};
use cosim_common::SimTime;

use crate::{WireError, WireResult};

/// Wire size of a simulated-time value: 8-byte count + 1-byte cycles flag.
pub const SIM_TIME_WIRE_LEN: usize = 9;

fn need(buf: &impl Buf, needed: usize) -> WireResult<()> {
    let have = buf.remaining();
    if have < needed {
        return Err(WireError::Truncated { needed, have });
    }
    Ok(())
}

/// Read one byte.
pub fn get_u8(buf: &mut impl Buf) -> WireResult<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

/// Read a big-endian u16.
pub fn get_u16(buf: &mut impl Buf) -> WireResult<u16> {
    need(buf, 2)?;
    Ok(buf.get_u16())
}

/// Read a big-endian u32.
pub fn get_u32(buf: &mut impl Buf) -> WireResult<u32> {
    need(buf, 4)?;
    Ok(buf.get_u32())
}

/// Read a big-endian u64.
pub fn get_u64(buf: &mut impl Buf) -> WireResult<u64> {
    need(buf, 8)?;
    Ok(buf.get_u64())
}

/// Write a simulated-time value: the 64-bit count then the cycles flag.
pub fn put_sim_time(buf: &mut impl BufMut, time: SimTime, cycles: bool) {
    buf.put_u64(time.as_ps());
    buf.put_u8(cycles as u8);
}

/// Read a simulated-time value written by [`put_sim_time`].
pub fn get_sim_time(buf: &mut impl Buf) -> WireResult<(SimTime, bool)> {
    need(buf, SIM_TIME_WIRE_LEN)?;
    let time = SimTime::from_ps(buf.get_u64());
    let cycles = buf.get_u8() != 0;
    Ok((time, cycles))
}

/// Write a 4-byte-length-prefixed UTF-8 string.
pub fn put_lp_string(buf: &mut impl BufMut, s: &str) {
    buf.put_u32(s.len() as u32);
    buf.put_slice(s.as_bytes());
}

/// Read a 4-byte-length-prefixed string. A single trailing NUL inside the
/// counted bytes is tolerated and stripped (some peers terminate their
/// strings).
pub fn get_lp_string(buf: &mut impl Buf) -> WireResult<String> {
    let len = get_u32(buf)? as usize;
    need(buf, len)?;
    let mut raw = vec![0u8; len];
    buf.copy_to_slice(&mut raw);
    if raw.last() == Some(&0) {
        raw.pop();
    }
    Ok(String::from_utf8(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_reads() {
        let mut buf: &[u8] = &[0x12, 0x34, 0x56, 0x78];
        assert_eq!(get_u32(&mut buf).unwrap(), 0x1234_5678);
        assert!(matches!(
            get_u8(&mut buf),
            Err(WireError::Truncated { needed: 1, have: 0 })
        ));
    }

    #[test]
    fn test_sim_time_roundtrip() {
        let mut buf = Vec::new();
        put_sim_time(&mut buf, SimTime::from_ns(7), true);
        assert_eq!(buf.len(), SIM_TIME_WIRE_LEN);

        let mut read: &[u8] = &buf;
        let (time, cycles) = get_sim_time(&mut read).unwrap();
        assert_eq!(time, SimTime::from_ns(7));
        assert!(cycles);
        assert!(read.is_empty());
    }

    #[test]
    fn test_sim_time_truncated() {
        let mut short: &[u8] = &[0u8; 8];
        assert!(get_sim_time(&mut short).is_err());
    }

    #[test]
    fn test_lp_string_roundtrip() {
        let mut buf = Vec::new();
        put_lp_string(&mut buf, "loglevel");
        let mut read: &[u8] = &buf;
        assert_eq!(get_lp_string(&mut read).unwrap(), "loglevel");
    }

    #[test]
    fn test_lp_string_trailing_nul() {
        let mut buf = Vec::new();
        buf.put_u32(5);
        buf.put_slice(b"chan\0");
        let mut read: &[u8] = &buf;
        assert_eq!(get_lp_string(&mut read).unwrap(), "chan");
    }

    #[test]
    fn test_lp_string_bad_utf8() {
        let mut buf = Vec::new();
        buf.put_u32(2);
        buf.put_slice(&[0xff, 0xfe]);
        let mut read: &[u8] = &buf;
        assert!(matches!(
            get_lp_string(&mut read),
            Err(WireError::BadString(_))
        ));
    }
}
