//! # Message Queue
//!
//! Fixed-capacity FIFO of [`Message`]s, one per core.
//!
//! Producers are both dispatch loops and any interrupt handler; the
//! consumer is the owning core's loop. Every access runs inside a critical
//! section, so a post from an ISR can never interleave with a dequeue on
//! the same or the other core. Cortex-M0+ has no compare-and-swap, which
//! rules out a lock-free multi-producer ring on this target.
//!
//! Queues never allocate and live for the whole program. Posting and
//! clearing are crate-internal: outside code posts through the kernel,
//! which stamps the enqueue time.

use core::cell::RefCell;
use core::hint;

use heapless::Deque;

use crate::message::Message;
use crate::sync::{self, Mutex};

/// A bounded multi-producer FIFO of messages.
pub struct MessageQueue<const N: usize> {
    inner: Mutex<RefCell<Deque<Message, N>>>,
}

impl<const N: usize> MessageQueue<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Maximum number of queued messages.
    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Append a copy of `msg`. Returns `false` without waiting if the queue
    /// is full. Safe to call from interrupt context.
    pub(crate) fn try_post(&self, msg: &Message) -> bool {
        sync::critical_section(|cs| self.inner.borrow_ref_mut(cs).push_back(*msg).is_ok())
    }

    /// Append a copy of `msg`, spinning until there is room.
    ///
    /// Interrupts are re-enabled between attempts so the consumer can drain.
    /// A queue that never drains deadlocks the caller; capacity is sized so
    /// that this cannot happen.
    pub(crate) fn post_blocking(&self, msg: &Message) {
        while !self.try_post(msg) {
            hint::spin_loop();
        }
    }

    /// Remove the oldest message, if any.
    pub fn try_get(&self) -> Option<Message> {
        sync::critical_section(|cs| self.inner.borrow_ref_mut(cs).pop_front())
    }

    /// Remove the oldest message, spinning until one arrives.
    pub fn get_blocking(&self) -> Message {
        loop {
            if let Some(msg) = self.try_get() {
                return msg;
            }
            hint::spin_loop();
        }
    }

    /// Copy of the oldest message without removing it.
    pub fn peek(&self) -> Option<Message> {
        sync::critical_section(|cs| self.inner.borrow_ref(cs).front().copied())
    }

    /// Number of queued messages.
    pub fn level(&self) -> usize {
        sync::critical_section(|cs| self.inner.borrow_ref(cs).len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.level() == 0
    }

    /// Free entries remaining.
    #[inline]
    pub fn headroom(&self) -> usize {
        N - self.level()
    }

    /// Drop everything queued.
    pub(crate) fn clear(&self) {
        sync::critical_section(|cs| self.inner.borrow_ref_mut(cs).clear());
    }
}

impl<const N: usize> Default for MessageQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MsgData, MsgId};

    fn numbered(n: u16) -> Message {
        Message::with_data(MsgId(n), MsgData::Status(n as i32))
    }

    #[test]
    fn test_fifo_order() {
        let q: MessageQueue<8> = MessageQueue::new();
        for n in 0..8 {
            assert!(q.try_post(&numbered(n)));
        }
        for n in 0..8 {
            let msg = q.try_get().unwrap();
            assert_eq!(msg.id, MsgId(n));
            assert!(matches!(msg.data, MsgData::Status(v) if v == n as i32));
        }
        assert!(q.try_get().is_none());
    }

    #[test]
    fn test_capacity_limit() {
        let q: MessageQueue<4> = MessageQueue::new();
        for n in 0..4 {
            assert!(q.try_post(&numbered(n)));
        }
        assert!(!q.try_post(&numbered(99)));
        assert_eq!(q.level(), 4);
        assert_eq!(q.headroom(), 0);

        // Making room lets the next post through
        assert_eq!(q.try_get().unwrap().id, MsgId(0));
        assert!(q.try_post(&numbered(99)));
        let ids: Vec<u16> = core::iter::from_fn(|| q.try_get()).map(|m| m.id.0).collect();
        assert_eq!(ids, [1, 2, 3, 99]);
    }

    #[test]
    fn test_duplicate_ids_coexist() {
        let q: MessageQueue<4> = MessageQueue::new();
        let msg = Message::new(MsgId(5));
        assert!(q.try_post(&msg));
        assert!(q.try_post(&msg));
        assert_eq!(q.level(), 2);
    }

    #[test]
    fn test_peek_does_not_remove() {
        let q: MessageQueue<4> = MessageQueue::new();
        assert!(q.peek().is_none());
        q.post_blocking(&numbered(3));
        q.post_blocking(&numbered(4));
        assert_eq!(q.peek().unwrap().id, MsgId(3));
        assert_eq!(q.level(), 2);
        assert_eq!(q.get_blocking().id, MsgId(3));
    }

    #[test]
    fn test_clear() {
        let q: MessageQueue<4> = MessageQueue::new();
        q.post_blocking(&numbered(1));
        q.clear();
        assert!(q.is_empty());
        assert_eq!(q.capacity(), 4);
    }

    #[test]
    fn test_blocking_get_waits_for_producer() {
        let q: MessageQueue<4> = MessageQueue::new();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(10));
                q.post_blocking(&numbered(7));
            });
            assert_eq!(q.get_blocking().id, MsgId(7));
        });
    }
}
