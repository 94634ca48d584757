//! Timestamped signal transitions.

use std::fmt;

use bytes::BufMut;
use cosim_common::{fmt_time, SimTime};

use crate::{codec, Bits, WireResult};

/// One value change on a channel: the new bit vector, the simulated time
/// it takes effect, and whether the consumer must treat it as a
/// synchronization boundary.
///
/// A synchronous change is only valid until its successor's time; an
/// asynchronous one holds until superseded.
#[derive(Debug, Clone)]
pub struct Change {
    /// Activation time.
    pub time: SimTime,
    /// Whether `time` counts simulator clock cycles instead of picoseconds.
    pub cycles: bool,
    /// The new value.
    pub value: Bits,
    /// Whether a consumer must wait for the next change at `time`.
    pub sync: bool,
}

impl Change {
    /// Create a change event.
    pub fn new(time: SimTime, cycles: bool, value: Bits, sync: bool) -> Change {
        Change {
            time,
            cycles,
            value,
            sync,
        }
    }

    /// Encoded size: time + sync flag + bit vector.
    pub fn wire_len(&self) -> usize {
        self.value.wire_len() + codec::SIM_TIME_WIRE_LEN + 1
    }

    /// Encode as a channel payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.wire_len());
        codec::put_sim_time(&mut buf, self.time, self.cycles);
        buf.put_u8(self.sync as u8);
        self.value.encode_into(&mut buf);
        buf
    }

    /// Decode a channel payload.
    pub fn decode(raw: &[u8]) -> WireResult<Change> {
        let mut buf = raw;
        let (time, cycles) = codec::get_sim_time(&mut buf)?;
        let sync = codec::get_u8(&mut buf)? != 0;
        let value = Bits::decode(buf)?;
        Ok(Change {
            time,
            cycles,
            value,
            sync,
        })
    }
}

impl PartialEq for Change {
    /// Value, time and sync flag; the cycles flag is a unit annotation and
    /// does not participate in equality.
    fn eq(&self, other: &Change) -> bool {
        self.value == other.value && self.time == other.time && self.sync == other.sync
    }
}

impl Eq for Change {}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, fmt_time(self.time, self.cycles))?;
        if !self.sync {
            write!(f, "a")?;
        }
        Ok(())
    }
}
