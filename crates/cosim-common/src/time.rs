//! Simulated time and frequency.
//!
//! Simulated time advances in picoseconds. Some channels carry times
//! counted in simulator clock cycles instead; those travel as the same
//! 64-bit quantity with a cycles flag next to them, so `SimTime` itself is
//! unit-blind and the flag lives wherever the value does (see
//! `fmt_time` for rendering both forms).

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// Picoseconds per second.
pub const PS_PER_SEC: u64 = 1_000_000_000_000;

/// A frequency in Hertz.
pub type SimFreq = u64;

/// Frequency unit constants.
pub const KHZ: SimFreq = 1_000;
/// 10^6 Hz.
pub const MHZ: SimFreq = 1_000_000;
/// 10^9 Hz.
pub const GHZ: SimFreq = 1_000_000_000;

/// A point in (or span of) simulated time, in picoseconds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimTime(u64);

/// One picosecond.
pub const PSEC: SimTime = SimTime(1);
/// One nanosecond.
pub const NSEC: SimTime = SimTime(1_000);
/// One microsecond.
pub const USEC: SimTime = SimTime(1_000_000);
/// One millisecond.
pub const MSEC: SimTime = SimTime(1_000_000_000);

impl SimTime {
    /// Time zero.
    pub const ZERO: SimTime = SimTime(0);

    /// Construct from raw picoseconds (or a raw cycle count).
    pub const fn from_ps(ps: u64) -> SimTime {
        SimTime(ps)
    }

    /// Construct from nanoseconds.
    pub const fn from_ns(ns: u64) -> SimTime {
        SimTime(ns * 1_000)
    }

    /// Construct from microseconds.
    pub const fn from_us(us: u64) -> SimTime {
        SimTime(us * 1_000_000)
    }

    /// Construct from milliseconds.
    pub const fn from_ms(ms: u64) -> SimTime {
        SimTime(ms * 1_000_000_000)
    }

    /// The raw picosecond (or cycle) count.
    pub const fn as_ps(self) -> u64 {
        self.0
    }

    /// Saturating difference.
    pub fn saturating_sub(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_sub(other.0))
    }

    /// Saturating sum.
    pub fn saturating_add(self, other: SimTime) -> SimTime {
        SimTime(self.0.saturating_add(other.0))
    }
}

impl Add for SimTime {
    type Output = SimTime;

    fn add(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimTime {
    fn add_assign(&mut self, rhs: SimTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: SimTime) -> SimTime {
        SimTime(self.0 - rhs.0)
    }
}

impl fmt::Display for SimTime {
    /// Render as second/milli/micro/nano/pico digit groups: the most
    /// significant nonzero group unpadded, every following group
    /// zero-padded to three digits, e.g. `1s000m023u000n000p`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return write!(f, "0p");
        }
        let mut rest = self.0;
        let mut scale = PS_PER_SEC;
        let mut active = false;
        for unit in ["s", "m", "u", "n", "p"] {
            let val = rest / scale;
            if active {
                write!(f, "{:03}{}", val, unit)?;
            } else if val != 0 {
                active = true;
                write!(f, "{}{}", val, unit)?;
            }
            rest %= scale;
            scale /= 1000;
        }
        Ok(())
    }
}

/// Render a time that may be cycle-counted: `123c` for cycles, the
/// picosecond breakdown otherwise.
pub fn fmt_time(time: SimTime, cycles: bool) -> String {
    if cycles {
        format!("{}c", time.as_ps())
    } else {
        time.to_string()
    }
}

/// Period of a frequency, `10^12 / f` picoseconds.
pub const fn freq_to_period(freq: SimFreq) -> SimTime {
    SimTime(PS_PER_SEC / freq)
}

/// Frequency of a period, `10^12 / p` Hertz.
pub const fn period_to_freq(period: SimTime) -> SimFreq {
    PS_PER_SEC / period.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_constructors() {
        assert_eq!(SimTime::from_ns(3), SimTime::from_ps(3_000));
        assert_eq!(SimTime::from_us(1), USEC);
        assert_eq!(SimTime::from_ms(2), SimTime::from_ps(2_000_000_000));
    }

    #[test]
    fn test_freq_period_roundtrip() {
        assert_eq!(freq_to_period(MHZ), USEC);
        assert_eq!(period_to_freq(NSEC), GHZ);
        assert_eq!(period_to_freq(freq_to_period(KHZ)), KHZ);
    }

    #[test]
    fn test_display_groups() {
        assert_eq!(SimTime::ZERO.to_string(), "0p");
        assert_eq!(SimTime::from_ps(1_500).to_string(), "1n500p");
        assert_eq!(
            (SimTime::from_ms(1_000) + SimTime::from_us(23)).to_string(),
            "1s000m023u000n000p"
        );
        assert_eq!(SimTime::from_ps(42).to_string(), "42p");
    }

    #[test]
    fn test_fmt_time_cycles() {
        assert_eq!(fmt_time(SimTime::from_ps(17), true), "17c");
        assert_eq!(fmt_time(SimTime::from_ps(17), false), "17p");
    }

    #[test]
    fn test_saturating_ops() {
        assert_eq!(SimTime::ZERO.saturating_sub(NSEC), SimTime::ZERO);
        assert_eq!(
            SimTime::from_ps(u64::MAX).saturating_add(PSEC),
            SimTime::from_ps(u64::MAX)
        );
    }
}
