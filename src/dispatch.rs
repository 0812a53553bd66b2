//! # Message Dispatch Loop
//!
//! The endless, non-blocking loop each core runs after start-up. There is
//! no OS underneath and nothing preempts a handler except interrupts, so
//! the loop is a tight busy-poll with its own time accounting.
//!
//! ## Algorithm
//!
//! Every iteration:
//! 1. **Timestamp**: read the microsecond clock
//! 2. **Rotate**: if a second has passed, publish the live process status
//!    into the core's per-second snapshot and reset it
//! 3. **Retrieve**: non-blocking dequeue from this core's queue
//!    a. *Message*: call every handler-table entry whose id matches, in
//!       table order, then account the active time
//!    b. *Empty*: run the next idle function chosen by the idle policy,
//!       then account the idle time
//! 4. Repeat. The loop never exits.
//!
//! ## State machine
//!
//! ```text
//!        ┌───────────┐   message dequeued   ┌─────────────┐
//!   ───► │ Idle-scan │ ───────────────────► │ Dispatching │
//!        └───────────┘ ◄─────────────────── └─────────────┘
//!          │     ▲        handlers returned
//!          └─────┘
//!       queue empty:
//!      one idle function
//! ```
//!
//! Handler and idle tables are `'static` slices fixed at build time; the
//! loop never mutates them.

use log::{info, trace};

use crate::arch::{CoreId, Port};
use crate::kernel::Kernel;
use crate::message::{Message, MsgData, MsgId};
use crate::status::ProcStatusAccum;

// ---------------------------------------------------------------------------
// Handler and idle tables
// ---------------------------------------------------------------------------

/// A message handler. Runs to completion on the loop's core.
pub type HandlerFn = fn(msg: &Message);

/// A low-priority function run when the queue is empty. Must return quickly.
pub type IdleFn = fn();

/// Binds a message id to a handler in a loop's handler table.
///
/// A table may hold several entries for the same id; all of them run.
#[derive(Debug, Clone, Copy)]
pub struct HandlerEntry {
    pub id: MsgId,
    pub handler: HandlerFn,
}

impl HandlerEntry {
    pub const fn new(id: MsgId, handler: HandlerFn) -> Self {
        Self { id, handler }
    }
}

/// Generic sleep handler: runs the continuation carried by a `CMT_SLEEP`
/// message.
pub fn handle_sleep(msg: &Message) {
    if let MsgData::Sleep(sleep) = msg.data {
        sleep.call();
    }
}

/// Entry for [`handle_sleep`]. Put it in both cores' handler tables so a
/// sleep scheduled on either core is serviced.
pub const SLEEP_HANDLER_ENTRY: HandlerEntry = HandlerEntry::new(MsgId::CMT_SLEEP, handle_sleep);

/// Everything a core's loop needs, fixed at build time.
#[derive(Debug, Clone, Copy)]
pub struct LoopContext {
    pub core: CoreId,
    pub handlers: &'static [HandlerEntry],
    pub idle_functions: &'static [IdleFn],
}

// ---------------------------------------------------------------------------
// Idle policy
// ---------------------------------------------------------------------------

/// Chooses what to run on an empty-queue iteration.
pub trait IdlePolicy {
    /// The function to run this iteration, if any.
    fn next(&mut self) -> Option<IdleFn>;
}

/// Runs one idle function per empty iteration, cycling through the list in
/// order so no single function monopolises idle time.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    functions: &'static [IdleFn],
    next: usize,
}

impl RoundRobin {
    pub const fn new(functions: &'static [IdleFn]) -> Self {
        Self { functions, next: 0 }
    }
}

impl IdlePolicy for RoundRobin {
    fn next(&mut self) -> Option<IdleFn> {
        let f = *self.functions.get(self.next)?;
        self.next = (self.next + 1) % self.functions.len();
        Some(f)
    }
}

// ---------------------------------------------------------------------------
// The loop
// ---------------------------------------------------------------------------

/// Outcome of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// A message was dequeued and `handlers` entries ran for it.
    Dispatched { id: MsgId, handlers: usize },
    /// The queue was empty.
    Idle,
}

/// One core's dispatch loop.
pub struct MessageLoop<'k, P: Port, I: IdlePolicy = RoundRobin> {
    kernel: &'k Kernel<P>,
    core: CoreId,
    handlers: &'static [HandlerEntry],
    idle: I,
    psa: ProcStatusAccum,
}

impl<'k, P: Port> MessageLoop<'k, P, RoundRobin> {
    /// Loop for `context.core` with round-robin idle scheduling.
    pub fn new(kernel: &'k Kernel<P>, context: &LoopContext) -> Self {
        Self::with_policy(
            kernel,
            context.core,
            context.handlers,
            RoundRobin::new(context.idle_functions),
        )
    }
}

impl<'k, P: Port, I: IdlePolicy> MessageLoop<'k, P, I> {
    pub fn with_policy(
        kernel: &'k Kernel<P>,
        core: CoreId,
        handlers: &'static [HandlerEntry],
        idle: I,
    ) -> Self {
        Self {
            kernel,
            core,
            handlers,
            idle,
            psa: ProcStatusAccum::new(kernel.port().now_us()),
        }
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Live counters for the current window.
    pub fn accum(&self) -> &ProcStatusAccum {
        &self.psa
    }

    /// Mark this core's loop as running and start the first status window.
    /// [`run`](Self::run) calls this; it is public so the loop can be
    /// stepped with [`poll_once`](Self::poll_once).
    pub fn enter(&mut self) {
        self.psa.reset(self.kernel.port().now_us());
        self.kernel.mark_loop_running(self.core);
        info!("CORE-{} message loop started", self.core.index());
    }

    /// Enter the endless dispatch loop. Does not return.
    pub fn run(mut self) -> ! {
        self.enter();
        loop {
            self.poll_once();
        }
    }

    /// Run a single iteration of the loop.
    pub fn poll_once(&mut self) -> Poll {
        let port = self.kernel.port();
        let t_start = port.now_us();

        if self.psa.window_elapsed(t_start) {
            self.kernel.status(self.core).publish(
                &self.psa,
                port.interrupt_status(),
                port.core_temp_c(),
                t_start,
            );
            self.psa.reset(t_start);
        }

        match self.kernel.try_get(self.core) {
            Some(msg) => {
                let t_dispatch = port.now_us();
                self.psa.t_msg_retrieve += t_dispatch.wrapping_sub(t_start);
                self.psa.retrieved = self.psa.retrieved.wrapping_add(1);

                let mut handled = 0;
                for entry in self.handlers.iter().filter(|entry| entry.id == msg.id) {
                    (entry.handler)(&msg);
                    handled += 1;
                }
                if handled == 0 {
                    trace!("CORE-{}: no handler for {}", self.core.index(), msg.id);
                }

                self.psa.t_active += port.now_us().wrapping_sub(t_dispatch);
                Poll::Dispatched { id: msg.id, handlers: handled }
            }
            None => {
                let t_idle = port.now_us();
                self.psa.t_msg_retrieve += t_idle.wrapping_sub(t_start);
                self.psa.idle = self.psa.idle.wrapping_add(1);

                if let Some(idle_fn) = self.idle.next() {
                    idle_fn();
                }

                self.psa.t_idle += port.now_us().wrapping_sub(t_idle);
                Poll::Idle
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
