//! Simulated-time breakpoints.
//!
//! A break moves through three states: *pending* (scheduled, peer not yet
//! told where it will land), *acknowledged* (threshold resolved to an
//! absolute time and reported), *hit* (threshold reached and reported).
//! Only explicit removal ever deletes one. The scan that drives the
//! transitions lives in [`Control::check_break`]; it runs under the same
//! lock as [`add`]/[`remove`], so a removed break can never be
//! acknowledged or hit afterwards.
//!
//! [`Control::check_break`]: crate::Control::check_break
//! [`add`]: BreakSet::add
//! [`remove`]: BreakSet::remove

use parking_lot::{Condvar, Mutex};

use cosim_common::SimTime;
use cosim_wire::BreakKind;

use crate::error::BridgeError;

/// One scheduled breakpoint.
#[derive(Debug, Clone)]
pub struct Break {
    /// Peer-assigned identifier.
    pub id: u32,
    /// Threshold time. For a relative break this is the offset until the
    /// break is acknowledged, and the resolved absolute time afterwards.
    pub thresh: SimTime,
    /// What reaching the threshold does.
    pub kind: BreakKind,
    /// Whether `thresh` was given relative to the current time.
    pub relative: bool,
    /// Acknowledgement has been sent; `thresh` is final.
    pub acked: bool,
    /// Hit notification has been sent.
    pub hit: bool,
}

impl Break {
    /// A new, pending break.
    pub fn new(id: u32, kind: BreakKind, thresh: SimTime, relative: bool) -> Break {
        Break {
            id,
            thresh,
            kind,
            relative,
            acked: false,
            hit: false,
        }
    }
}

/// The break list plus the condition hold-waiters sleep on.
pub(crate) struct BreakSet {
    pub(crate) list: Mutex<Vec<Break>>,
    pub(crate) cond: Condvar,
}

impl BreakSet {
    pub(crate) fn new() -> BreakSet {
        BreakSet {
            list: Mutex::new(Vec::new()),
            cond: Condvar::new(),
        }
    }

    /// Schedule a break and wake hold-waiters so they re-evaluate.
    pub(crate) fn add(&self, brk: Break) {
        self.list.lock().push(brk);
        self.cond.notify_all();
    }

    /// Remove a break by id, waking hold-waiters. Removing an unknown id
    /// is an error: it means the peer and the bridge disagree about what
    /// is scheduled.
    pub(crate) fn remove(&self, id: u32) -> Result<(), BridgeError> {
        let mut list = self.list.lock();
        let at = list
            .iter()
            .position(|brk| brk.id == id)
            .ok_or(BridgeError::BreakNotFound(id))?;
        list.remove(at);
        self.cond.notify_all();
        Ok(())
    }

    /// Snapshot of all scheduled breaks.
    pub(crate) fn snapshot(&self) -> Vec<Break> {
        self.list.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove() {
        let set = BreakSet::new();
        set.add(Break::new(1, BreakKind::Stop, SimTime::from_ns(1), false));
        set.add(Break::new(2, BreakKind::Hold, SimTime::ZERO, true));
        assert_eq!(set.snapshot().len(), 2);

        set.remove(1).unwrap();
        let left = set.snapshot();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, 2);
    }

    #[test]
    fn test_remove_unknown_id() {
        let set = BreakSet::new();
        assert!(matches!(
            set.remove(9),
            Err(BridgeError::BreakNotFound(9))
        ));
    }

    #[test]
    fn test_new_break_is_pending() {
        let brk = Break::new(1, BreakKind::Finish, SimTime::from_us(3), true);
        assert!(!brk.acked);
        assert!(!brk.hit);
        assert!(brk.relative);
    }
}
