//! # Scheduled-Message Table
//!
//! A fixed table of slots, each holding a countdown and the message to
//! post when it reaches zero. The periodic tick (interrupt context)
//! decrements every active slot; callers on either core schedule, cancel
//! and query. All access happens inside a critical section.
//!
//! ## Slot life
//!
//! ```text
//!   ┌──────┐   schedule()    ┌────────┐   remaining hits 0   ┌──────┐
//!   │ Free │ ──────────────► │ Active │ ───────────────────► │ Free │
//!   └──────┘                 └────────┘   (message returned  └──────┘
//!       ▲                         │        for posting)
//!       └──────── cancel(id) ─────┘
//! ```
//!
//! Cancellation is best effort. If the tick has already expired a slot
//! its message is on its way to the queue and `cancel` finds nothing.

use core::cell::RefCell;

use heapless::Vec;

use crate::arch::CoreId;
use crate::error::{CmtError, CmtResult};
use crate::message::{Message, MsgId};
use crate::sync::{self, Mutex};

#[derive(Debug, Clone, Copy)]
struct Slot {
    remaining: u32,
    core: CoreId,
    requested: u32,
    msg: Message,
}

/// Read-only view of an active slot for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMessage {
    pub id: MsgId,
    pub core: CoreId,
    pub remaining_ms: u32,
    pub requested_ms: u32,
}

/// Messages whose countdown expired on one tick, in slot order.
pub type Expired<const N: usize> = Vec<(CoreId, Message), N>;

/// Fixed-size table of deferred messages.
pub struct ScheduledMessages<const N: usize> {
    slots: Mutex<RefCell<[Option<Slot>; N]>>,
}

impl<const N: usize> ScheduledMessages<N> {
    pub const fn new() -> Self {
        Self {
            slots: Mutex::new(RefCell::new([None; N])),
        }
    }

    /// Store a copy of `msg` to be posted to `core` after `delay_ms` ticks.
    ///
    /// A delay of zero is delivered on the next tick. The table allows any
    /// number of slots with the same id; callers that want at most one use
    /// [`exists`](Self::exists) first.
    ///
    /// # Returns
    /// - `Ok(())` — the message is pending
    /// - `Err(CmtError::NoFreeSlot)` — every slot is active
    pub fn try_schedule(&self, core: CoreId, delay_ms: u32, msg: &Message) -> CmtResult<()> {
        sync::critical_section(|cs| {
            let mut slots = self.slots.borrow_ref_mut(cs);
            let free = slots
                .iter_mut()
                .find(|slot| slot.is_none())
                .ok_or(CmtError::NoFreeSlot)?;
            *free = Some(Slot {
                remaining: delay_ms.max(1),
                core,
                requested: delay_ms,
                msg: *msg,
            });
            Ok(())
        })
    }

    /// Free every active slot holding a message with `id`.
    ///
    /// # Returns
    /// The number of slots cancelled (zero if none matched).
    pub fn cancel(&self, id: MsgId) -> usize {
        sync::critical_section(|cs| {
            let mut cancelled = 0;
            for slot in self.slots.borrow_ref_mut(cs).iter_mut() {
                if matches!(slot, Some(s) if s.msg.id == id) {
                    *slot = None;
                    cancelled += 1;
                }
            }
            cancelled
        })
    }

    /// True if any active slot holds a message with `id`.
    pub fn exists(&self, id: MsgId) -> bool {
        sync::critical_section(|cs| {
            self.slots
                .borrow_ref(cs)
                .iter()
                .flatten()
                .any(|slot| slot.msg.id == id)
        })
    }

    /// Number of active slots.
    pub fn pending_count(&self) -> usize {
        sync::critical_section(|cs| self.slots.borrow_ref(cs).iter().flatten().count())
    }

    /// Active slots in table order.
    pub fn pending(&self) -> Vec<PendingMessage, N> {
        sync::critical_section(|cs| {
            self.slots
                .borrow_ref(cs)
                .iter()
                .flatten()
                .map(|slot| PendingMessage {
                    id: slot.msg.id,
                    core: slot.core,
                    remaining_ms: slot.remaining,
                    requested_ms: slot.requested,
                })
                .collect()
        })
    }

    /// Ids of the active slots in table order.
    pub fn pending_ids(&self) -> Vec<MsgId, N> {
        self.pending().iter().map(|p| p.id).collect()
    }

    /// Advance every active slot by one millisecond.
    ///
    /// Slots that reach zero are freed and their messages returned for the
    /// caller to post once the table lock is released. O(N), no allocation.
    pub fn tick(&self) -> Expired<N> {
        sync::critical_section(|cs| {
            let mut expired = Expired::new();
            for slot in self.slots.borrow_ref_mut(cs).iter_mut() {
                if let Some(active) = slot {
                    active.remaining -= 1;
                    if active.remaining == 0 {
                        // Cannot overflow: at most one entry per slot.
                        let _ = expired.push((active.core, active.msg));
                        *slot = None;
                    }
                }
            }
            expired
        })
    }

    /// Free every slot.
    pub fn clear(&self) {
        sync::critical_section(|cs| {
            self.slots.borrow_ref_mut(cs).iter_mut().for_each(|slot| *slot = None)
        });
    }
}

impl<const N: usize> Default for ScheduledMessages<N> {
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
    use crate::message::MsgData;

    fn run_ticks<const N: usize>(table: &ScheduledMessages<N>, ticks: u32) -> usize {
        (0..ticks).map(|_| table.tick().len()).sum()
    }

    #[test]
    fn test_delivery_after_exact_delay() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        table.try_schedule(CoreId::Core1, 500, &Message::new(MsgId(99))).unwrap();

        assert_eq!(run_ticks(&table, 499), 0);
        assert!(table.exists(MsgId(99)));

        let expired = table.tick();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, CoreId::Core1);
        assert_eq!(expired[0].1.id, MsgId(99));

        // Exactly once
        assert_eq!(run_ticks(&table, 1000), 0);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_payload_is_copied() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        let mut msg = Message::with_data(MsgId(7), MsgData::TsMs(1));
        table.try_schedule(CoreId::Core0, 1, &msg).unwrap();
        msg.data = MsgData::TsMs(2);

        let expired = table.tick();
        assert!(matches!(expired[0].1.data, MsgData::TsMs(1)));
    }

    #[test]
    fn test_zero_delay_fires_next_tick() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        table.try_schedule(CoreId::Core0, 0, &Message::new(MsgId(1))).unwrap();
        assert_eq!(table.pending()[0].remaining_ms, 1);
        assert_eq!(table.pending()[0].requested_ms, 0);
        assert_eq!(table.tick().len(), 1);
    }

    #[test]
    fn test_cancel_before_expiry() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        table.try_schedule(CoreId::Core0, 10, &Message::new(MsgId(3))).unwrap();
        assert_eq!(run_ticks(&table, 9), 0);
        assert_eq!(table.cancel(MsgId(3)), 1);
        assert!(!table.exists(MsgId(3)));
        assert_eq!(run_ticks(&table, 20), 0);
    }

    #[test]
    fn test_cancel_after_delivery_is_noop() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        table.try_schedule(CoreId::Core0, 2, &Message::new(MsgId(3))).unwrap();
        assert_eq!(run_ticks(&table, 2), 1);
        assert_eq!(table.cancel(MsgId(3)), 0);
        assert_eq!(table.cancel(MsgId(3)), 0);
        assert_eq!(table.pending_count(), 0);
    }

    #[test]
    fn test_cancel_frees_every_match() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        table.try_schedule(CoreId::Core0, 5, &Message::new(MsgId(8))).unwrap();
        table.try_schedule(CoreId::Core1, 7, &Message::new(MsgId(9))).unwrap();
        table.try_schedule(CoreId::Core1, 9, &Message::new(MsgId(8))).unwrap();

        assert_eq!(table.cancel(MsgId(8)), 2);
        assert_eq!(table.pending_ids().as_slice(), &[MsgId(9)]);
        assert_eq!(table.cancel(MsgId(1234)), 0);
    }

    #[test]
    fn test_exhaustion_reports_error() {
        let table: ScheduledMessages<2> = ScheduledMessages::new();
        let msg = Message::new(MsgId(1));
        assert!(table.try_schedule(CoreId::Core0, 5, &msg).is_ok());
        assert!(table.try_schedule(CoreId::Core0, 5, &msg).is_ok());
        assert_eq!(
            table.try_schedule(CoreId::Core0, 5, &msg),
            Err(CmtError::NoFreeSlot)
        );

        // A freed slot is reused
        table.tick();
        table.tick();
        table.tick();
        table.tick();
        assert_eq!(table.tick().len(), 2);
        assert!(table.try_schedule(CoreId::Core0, 5, &msg).is_ok());
    }

    #[test]
    fn test_expiry_in_slot_order() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        table.try_schedule(CoreId::Core0, 3, &Message::new(MsgId(10))).unwrap();
        table.try_schedule(CoreId::Core1, 3, &Message::new(MsgId(11))).unwrap();
        table.try_schedule(CoreId::Core0, 1, &Message::new(MsgId(12))).unwrap();

        let first = table.tick();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].1.id, MsgId(12));

        table.tick();
        let last = table.tick();
        let ids: std::vec::Vec<MsgId> = last.iter().map(|(_, m)| m.id).collect();
        assert_eq!(ids, [MsgId(10), MsgId(11)]);
    }

    #[test]
    fn test_clear() {
        let table: ScheduledMessages<4> = ScheduledMessages::new();
        table.try_schedule(CoreId::Core0, 3, &Message::new(MsgId(10))).unwrap();
        table.clear();
        assert_eq!(table.pending_count(), 0);
    }
}
