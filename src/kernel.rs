//! # Kernel
//!
//! The cooperative multitasking context shared by both cores: one message
//! queue per core, the scheduled-message table, the per-second process
//! status of each loop, and a few run-state flags.
//!
//! A single [`Kernel`] is built once (it is `const`-constructible, so the
//! firmware places it in a `static`) and handed by reference to both
//! dispatch loops and to the timer interrupt. Nothing in here is a
//! file-scope global, so every piece can be exercised on the host with a
//! mock [`Port`].
//!
//! ## Start-up sequence
//!
//! ```text
//! reset (core 0)
//!   └─► Kernel::init()               ← empty queues and slot table
//!         ├─► arch: start tick alarm ← Kernel::tick() every ~1 ms
//!         ├─► launch core 1 ──────────► MessageLoop::run()  (UI)
//!         └─► MessageLoop::run()  (back-end, no return)
//! ```

use log::{debug, info, trace, warn};
use portable_atomic::{AtomicBool, Ordering};

use crate::arch::{CoreId, CoreMask, Port};
use crate::config::{CORE_COUNT, QUEUE_DEPTH, QUEUE_WARN_HEADROOM, SCHEDULED_MESSAGES_MAX};
use crate::error::{CmtError, CmtResult};
use crate::message::{Message, MsgId, SleepFn};
use crate::queue::MessageQueue;
use crate::sched::{PendingMessage, ScheduledMessages};
use crate::status::{ProcStatus, ProcStatusSec};

/// Queue type used for each core.
pub type CoreQueue = MessageQueue<QUEUE_DEPTH>;

/// A nearly full queue, as reported by [`Kernel::queue_pressure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePressure {
    pub core: CoreId,
    pub level: usize,
    /// Id of the oldest queued message.
    pub head: MsgId,
    /// How long that message has been waiting.
    pub head_age_ms: u32,
}

/// The message kernel shared by both cores and the tick interrupt.
pub struct Kernel<P: Port> {
    port: P,
    queues: [CoreQueue; CORE_COUNT],
    scheduled: ScheduledMessages<SCHEDULED_MESSAGES_MAX>,
    status: [ProcStatusSec; CORE_COUNT],
    loop_running: [AtomicBool; CORE_COUNT],
    debug_mode: AtomicBool,
    initialized: AtomicBool,
}

impl<P: Port> Kernel<P> {
    pub const fn new(port: P) -> Self {
        Self {
            port,
            queues: [MessageQueue::new(), MessageQueue::new()],
            scheduled: ScheduledMessages::new(),
            status: [ProcStatusSec::new(), ProcStatusSec::new()],
            loop_running: [AtomicBool::new(false), AtomicBool::new(false)],
            debug_mode: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        }
    }

    /// Initialise the kernel: empty both queues and free every slot.
    ///
    /// # Returns
    /// - `Ok(())` on the first call
    /// - `Err(CmtError::AlreadyInitialized)` on any later call
    pub fn try_init(&self) -> CmtResult<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(CmtError::AlreadyInitialized);
        }
        self.queues.iter().for_each(MessageQueue::clear);
        self.scheduled.clear();
        info!(
            "CMT - initialised ({} slots, queue depth {})",
            SCHEDULED_MESSAGES_MAX, QUEUE_DEPTH
        );
        Ok(())
    }

    /// As [`try_init`](Self::try_init); a second initialisation halts.
    pub fn init(&self) {
        if let Err(e) = self.try_init() {
            panic!("CMT - {}", e);
        }
    }

    /// The platform port.
    #[inline]
    pub fn port(&self) -> &P {
        &self.port
    }

    pub fn set_debug_mode(&self, on: bool) {
        self.debug_mode.store(on, Ordering::Relaxed);
    }

    pub fn debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    // -----------------------------------------------------------------------
    // Queues
    // -----------------------------------------------------------------------

    #[inline]
    pub fn queue(&self, core: CoreId) -> &CoreQueue {
        &self.queues[core.index()]
    }

    /// Copy `msg`, stamp it with the current millisecond time, and queue it
    /// for `core`, spinning while the queue is full.
    ///
    /// Only for start-up code and the tick interrupt; queue depth is sized
    /// so this never waits in practice.
    pub fn post_blocking(&self, core: CoreId, msg: &Message) {
        let stamped = self.stamp(msg);
        self.check_level(core);
        self.queue(core).post_blocking(&stamped);
    }

    /// Copy, stamp and queue `msg` for `core` without waiting.
    ///
    /// # Returns
    /// `false` if the queue was full and the message was dropped.
    pub fn try_post(&self, core: CoreId, msg: &Message) -> bool {
        let stamped = self.stamp(msg);
        self.check_level(core);
        self.queue(core).try_post(&stamped)
    }

    /// Post to core 0 then core 1, waiting for room on each.
    pub fn post_to_both_blocking(&self, msg: &Message) {
        for core in CoreId::ALL {
            self.post_blocking(core, msg);
        }
    }

    /// Post to core 0 then core 1 without waiting.
    ///
    /// # Returns
    /// The cores whose queue accepted the message.
    pub fn try_post_to_both(&self, msg: &Message) -> CoreMask {
        CoreId::ALL
            .into_iter()
            .filter(|&core| self.try_post(core, msg))
            .fold(CoreMask::empty(), |mask, core| mask | CoreMask::of(core))
    }

    /// Dequeue the oldest message for `core`, if any.
    #[inline]
    pub fn try_get(&self, core: CoreId) -> Option<Message> {
        self.queue(core).try_get()
    }

    /// Dequeue the oldest message for `core`, spinning until one arrives.
    /// Never call this from a dispatch loop.
    pub fn get_blocking(&self, core: CoreId) -> Message {
        self.queue(core).get_blocking()
    }

    fn stamp(&self, msg: &Message) -> Message {
        let mut stamped = *msg;
        stamped.t = self.port.now_ms();
        stamped
    }

    /// The state of `core`'s queue if debug mode is on and fewer than
    /// `QUEUE_WARN_HEADROOM` entries are free; `None` otherwise.
    pub fn queue_pressure(&self, core: CoreId) -> Option<QueuePressure> {
        if !self.debug_mode() {
            return None;
        }
        let queue = self.queue(core);
        if queue.headroom() >= QUEUE_WARN_HEADROOM {
            return None;
        }
        let head = queue.peek()?;
        Some(QueuePressure {
            core,
            level: queue.level(),
            head: head.id,
            head_age_ms: head.age_ms(self.port.now_ms()),
        })
    }

    /// Warn when a queue is about to fill, naming the head message and how
    /// long it has been waiting.
    fn check_level(&self, core: CoreId) {
        if let Some(p) = self.queue_pressure(core) {
            warn!(
                "!!! Q{} level {} - Head Msg:{} TIQ:{}ms !!!",
                p.core.index(),
                p.level,
                p.head,
                p.head_age_ms
            );
        }
    }

    // -----------------------------------------------------------------------
    // Scheduled messages
    // -----------------------------------------------------------------------

    /// Post a copy of `msg` to `core` after `delay_ms` milliseconds.
    ///
    /// Running out of slots halts the firmware.
    pub fn schedule(&self, core: CoreId, delay_ms: u32, msg: &Message) {
        if self.try_schedule(core, delay_ms, msg).is_err() {
            panic!("CMT - No scheduled message slot available for {}", msg.id);
        }
    }

    /// As [`schedule`](Self::schedule) but reports slot exhaustion.
    pub fn try_schedule(&self, core: CoreId, delay_ms: u32, msg: &Message) -> CmtResult<()> {
        trace!("CMT - schedule {} on CORE-{} in {}ms", msg.id, core.index(), delay_ms);
        self.scheduled.try_schedule(core, delay_ms, msg)
    }

    /// Schedule `msg` for the core the caller is running on.
    pub fn schedule_here(&self, delay_ms: u32, msg: &Message) {
        self.schedule(self.port.core(), delay_ms, msg);
    }

    /// Cancel every pending scheduled message with `id`.
    ///
    /// Best effort: a message whose time has already come may still be
    /// delivered. Returns the number of slots freed.
    pub fn cancel(&self, id: MsgId) -> usize {
        let cancelled = self.scheduled.cancel(id);
        if cancelled > 0 {
            debug!("CMT - cancelled {} x{}", id, cancelled);
        }
        cancelled
    }

    /// True if a message with `id` is waiting to be posted.
    pub fn scheduled_exists(&self, id: MsgId) -> bool {
        self.scheduled.exists(id)
    }

    /// Number of scheduled messages waiting.
    pub fn scheduled_count(&self) -> usize {
        self.scheduled.pending_count()
    }

    /// Ids of the scheduled messages waiting, in slot order.
    pub fn scheduled_ids(&self) -> heapless::Vec<MsgId, SCHEDULED_MESSAGES_MAX> {
        self.scheduled.pending_ids()
    }

    /// Detail of every scheduled message waiting.
    pub fn scheduled(&self) -> heapless::Vec<PendingMessage, SCHEDULED_MESSAGES_MAX> {
        self.scheduled.pending()
    }

    /// Call `func(user_data)` from the calling core's loop after `ms`
    /// milliseconds. Requires the generic sleep handler in that core's
    /// handler table.
    pub fn sleep_ms(&self, ms: u32, func: SleepFn, user_data: usize) {
        self.schedule_here(ms, &Message::sleep(func, user_data));
    }

    /// Like [`sleep_ms`](Self::sleep_ms) once the calling core's loop is
    /// running; before that, block for `ms` and call `func` directly.
    pub fn sleep_or_wait(&self, ms: u32, func: SleepFn, user_data: usize) {
        if self.loop_running(self.port.core()) {
            self.sleep_ms(ms, func, user_data);
        } else {
            self.port.busy_wait_ms(ms);
            func(user_data);
        }
    }

    /// Periodic timer callback, nominally every millisecond, in interrupt
    /// context. Counts every scheduled message down by one and posts the
    /// ones that expire.
    ///
    /// # Returns
    /// `true` to keep the timer repeating (always).
    pub fn tick(&self) -> bool {
        for (core, msg) in self.scheduled.tick() {
            self.post_blocking(core, &msg);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Loop state and diagnostics
    // -----------------------------------------------------------------------

    pub(crate) fn mark_loop_running(&self, core: CoreId) {
        self.loop_running[core.index()].store(true, Ordering::SeqCst);
    }

    pub fn loop_running(&self, core: CoreId) -> bool {
        self.loop_running[core.index()].load(Ordering::SeqCst)
    }

    /// True once both cores have entered their dispatch loops.
    pub fn loops_running(&self) -> bool {
        CoreId::ALL.into_iter().all(|core| self.loop_running(core))
    }

    pub(crate) fn status(&self, core: CoreId) -> &ProcStatusSec {
        &self.status[core.index()]
    }

    /// The last full second of process status for `core`. Safe to call
    /// from either core; never blocks the loop being read.
    pub fn proc_status_sec(&self, core: CoreId) -> ProcStatus {
        self.status(core).read()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
