//! The read side of one channel's value stream.
//!
//! A simulator adapter creates one `Player` per input channel and asks it
//! inside the clock callback what the signal's value is at the current
//! simulated time. The player replays the change events the peer sent,
//! rolling its notion of "current value" forward as queried time passes
//! change timestamps.
//!
//! A *synchronous* change is a synchronization boundary: it is only valid
//! until its successor's time, so once queried time reaches it and no
//! successor is buffered the fetch waits — and eventually fails with
//! [`FetchTimeout`], which the caller treats as "try again", not as a
//! simulation failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, trace, warn};

use cosim_common::logging::{self, Severity};
use cosim_common::SimTime;
use cosim_wire::{Bits, Change, Message};

use crate::control::Control;
use crate::error::FetchTimeout;
use crate::queue::MessageQueue;

/// The result of a [`Player::get`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedValue {
    /// The active value.
    pub value: Bits,
    /// Whether the value is a synchronization boundary.
    pub sync: bool,
    /// The time this value stays valid until; `None` means indefinitely
    /// (asynchronous value, valid until superseded).
    pub until: Option<SimTime>,
}

/// Per-channel playback state.
pub struct Player {
    channel: String,
    queue: Arc<MessageQueue>,
    /// The last value considered active.
    current: Change,
    /// The most recently received, not yet applied value.
    next: Change,
    /// Whether `next` is newer than `current`.
    ahead: bool,
    /// A fetched-but-unconsumed value for [`Player::get_next`].
    fresh: bool,
    /// Whether this channel carries cycle-counted times.
    clocked: bool,
}

impl Player {
    /// Create a player on a channel with a reset value that is active at
    /// time zero.
    pub fn new(
        control: &Control,
        channel: impl Into<String>,
        reset: Bits,
        sync: bool,
        clocked: bool,
    ) -> Player {
        let channel = channel.into();
        let queue = control.queue(&channel);
        let reset = Change::new(SimTime::ZERO, clocked, reset, sync);
        Player {
            channel,
            queue,
            current: reset.clone(),
            next: reset,
            ahead: false,
            fresh: false,
            clocked,
        }
    }

    /// The channel this player reads.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// The value active at time `now`.
    ///
    /// Rolls forward through every buffered change with a timestamp at or
    /// before `now`. While the just-adopted value is synchronous the roll
    /// blocks up to `timeout` for its successor (a zero timeout waits
    /// indefinitely); if none arrives the call fails with
    /// [`FetchTimeout`] and the caller retries.
    pub fn get(&mut self, now: SimTime, timeout: Duration) -> Result<PlayedValue, FetchTimeout> {
        if logging::enabled(&self.channel, Severity::Trace) {
            trace!(
                channel = %self.channel,
                now = %now,
                current = %self.current,
                next = %self.next,
                "player get"
            );
        }
        let mut adopted = false;
        while self.next.time <= now {
            self.current = self.next.clone();
            if self.ahead {
                adopted = true;
            }
            self.ahead = false;
            self.pull(self.current.sync, timeout, now);
            if self.ahead {
                // a successor exists, so the adopted value is bounded
                self.current.sync = true;
            } else if self.current.sync {
                return Err(FetchTimeout {
                    channel: self.channel.clone(),
                });
            } else {
                break;
            }
        }
        if adopted && logging::enabled(&self.channel, Severity::Debug) {
            debug!(channel = %self.channel, value = %self.current, "player on new value");
        }
        let until = self.current.sync.then(|| self.next.time);
        Ok(PlayedValue {
            value: self.current.value.clone(),
            sync: self.current.sync,
            until,
        })
    }

    /// Edge-triggered fetch: the next change, if it has taken effect.
    ///
    /// If no change is cached one fetch is attempted (waiting only when
    /// the current value is synchronous). A cached change is returned —
    /// and consumed — once `now` has reached its timestamp; otherwise the
    /// call reports no new value.
    pub fn get_next(&mut self, now: SimTime, timeout: Duration) -> Result<Option<Bits>, FetchTimeout> {
        if !self.fresh {
            self.pull(self.current.sync, timeout, now);
            if self.ahead {
                self.current = self.next.clone();
                self.ahead = false;
                self.fresh = true;
            } else if self.current.sync {
                return Err(FetchTimeout {
                    channel: self.channel.clone(),
                });
            }
        }
        if self.fresh && now >= self.current.time {
            self.fresh = false;
            Ok(Some(self.current.value.clone()))
        } else {
            Ok(None)
        }
    }

    /// Try to move one change from the channel queue into `next`.
    fn pull(&mut self, block: bool, timeout: Duration, now: SimTime) {
        let mut available = !self.queue.is_empty();
        if !available && block {
            available = self.queue.wait(timeout);
        }
        if available {
            if let Some(msg) = self.queue.try_pop() {
                self.take_message(&msg, now);
            }
        }
    }

    fn take_message(&mut self, msg: &Message, now: SimTime) {
        let change = match Change::decode(msg.payload()) {
            Ok(change) => change,
            Err(err) => {
                error!(channel = %self.channel, "undecodable change event: {err}");
                return;
            }
        };
        if change.cycles != self.clocked {
            error!(
                channel = %self.channel,
                "received change of wrong time type: {}",
                if change.cycles { "cycled" } else { "timed" }
            );
        }
        if !self.clocked && change.time < now {
            warn!(
                channel = %self.channel,
                "new value is in the past: {} < {}", change.time, now
            );
        }
        if logging::enabled(&self.channel, Severity::Debug) {
            debug!(channel = %self.channel, next = %change, "new next value");
        }
        self.next = change;
        self.ahead = true;
    }
}
