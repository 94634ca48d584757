//! The write side of one channel.
//!
//! A simulator adapter creates one `Recorder` per output channel and
//! reports the signal's raw value every time it looks at it. The
//! recorder suppresses duplicates, so only actual transitions leave the
//! process as change events.

use std::sync::Arc;

use tracing::debug;

use cosim_common::logging::{self, Severity};
use cosim_common::{fmt_time, SimTime};
use cosim_wire::{Bits, Change, Message};

use crate::control::Control;

/// Per-channel recording state.
pub struct Recorder {
    control: Arc<Control>,
    channel: String,
    /// The last value sent out.
    last: Bits,
    /// When it was recorded.
    at: SimTime,
    /// Whether this channel carries cycle-counted times.
    clocked: bool,
}

impl Recorder {
    /// Create a recorder on a channel with the value the signal resets
    /// to. The reset value counts as already recorded: the first `put`
    /// only emits a change if the signal differs from it.
    pub fn new(
        control: &Arc<Control>,
        channel: impl Into<String>,
        reset: Bits,
        clocked: bool,
    ) -> Recorder {
        Recorder {
            control: Arc::clone(control),
            channel: channel.into(),
            last: reset,
            at: SimTime::ZERO,
            clocked,
        }
    }

    /// The channel this recorder writes.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The last recorded time.
    pub fn recorded_at(&self) -> SimTime {
        self.at
    }

    /// Report an observed value. Returns whether a change event was
    /// emitted: an observation equal to the last recorded value is
    /// suppressed unless `force` is set.
    pub fn put(&mut self, now: SimTime, value: Bits, sync: bool, force: bool) -> bool {
        self.at = now;
        if !force && value == self.last {
            return false;
        }
        if logging::enabled(&self.channel, Severity::Debug) {
            debug!(
                channel = %self.channel,
                from = %self.last,
                to = %value,
                sync,
                at = %fmt_time(now, self.clocked),
                "recording change"
            );
        }
        let change = Change::new(now, self.clocked, value, sync);
        let msg = Message::new(&self.channel, change.encode());
        self.last = change.value;
        self.control.push(msg);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::BridgeConfig;

    fn start_control() -> (Arc<Control>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = BridgeConfig {
            socket_path: dir.path().join("ctl.sock"),
            profile_interval: None,
            ..BridgeConfig::default()
        };
        (Control::start(config), dir)
    }

    #[test]
    fn test_duplicate_suppressed() {
        let (control, _dir) = start_control();
        let mut recorder = Recorder::new(&control, "q0", "0".parse().unwrap(), false);

        // equal to the reset value: nothing to report
        assert!(!recorder.put(SimTime::from_ns(1), "0".parse().unwrap(), true, false));
        // a transition reports
        assert!(recorder.put(SimTime::from_ns(2), "1".parse().unwrap(), true, false));
        // repeating it does not
        assert!(!recorder.put(SimTime::from_ns(3), "1".parse().unwrap(), true, false));
    }

    #[test]
    fn test_force_emits_duplicate() {
        let (control, _dir) = start_control();
        let mut recorder = Recorder::new(&control, "q1", "0".parse().unwrap(), false);
        assert!(recorder.put(SimTime::from_ns(1), "0".parse().unwrap(), false, true));
        // force does not disturb the suppression state afterwards
        assert!(!recorder.put(SimTime::from_ns(2), "0".parse().unwrap(), false, false));
    }

    #[test]
    fn test_time_advances_even_when_suppressed() {
        let (control, _dir) = start_control();
        let mut recorder = Recorder::new(&control, "q2", "Z".parse().unwrap(), false);
        recorder.put(SimTime::from_ns(5), "Z".parse().unwrap(), false, false);
        assert_eq!(recorder.recorded_at(), SimTime::from_ns(5));
    }
}
