//! Thread-safe message mailbox.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use cosim_wire::Message;

/// An unbounded FIFO of [`Message`]s, safe for any number of concurrent
/// producers and consumers. Ordering is strict FIFO per queue.
#[derive(Default)]
pub struct MessageQueue {
    inner: Mutex<VecDeque<Message>>,
    avail: Condvar,
}

impl MessageQueue {
    /// Create an empty queue.
    pub fn new() -> MessageQueue {
        MessageQueue::default()
    }

    /// Append a message and wake one waiter.
    pub fn push(&self, msg: Message) {
        let mut queue = self.inner.lock();
        queue.push_back(msg);
        self.avail.notify_one();
    }

    /// Remove and return the front message, blocking until one exists.
    pub fn pop(&self) -> Message {
        let mut queue = self.inner.lock();
        loop {
            if let Some(msg) = queue.pop_front() {
                return msg;
            }
            self.avail.wait(&mut queue);
        }
    }

    /// Remove and return the front message if one is present.
    pub fn try_pop(&self) -> Option<Message> {
        self.inner.lock().pop_front()
    }

    /// Block until a message is available or the timeout elapses; a zero
    /// timeout waits indefinitely. Returns whether a message is available
    /// now (another consumer may still win the race for it).
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut queue = self.inner.lock();
        if timeout.is_zero() {
            while queue.is_empty() {
                self.avail.wait(&mut queue);
            }
            return true;
        }
        let deadline = Instant::now() + timeout;
        while queue.is_empty() {
            if self.avail.wait_until(&mut queue, deadline).timed_out() {
                break;
            }
        }
        !queue.is_empty()
    }

    /// Non-blocking emptiness check.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Number of queued messages.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
