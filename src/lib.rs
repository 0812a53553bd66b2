//! # Scores — Cooperative Multitasking Message Kernel
//!
//! The message-passing core of a dual-core RP2040 scoreboard controller.
//! Each core runs one endless, non-blocking dispatch loop; all work is
//! done by handlers reacting to small fixed-size messages.
//!
//! ## Overview
//!
//! - **Two loops, two queues**: core 0 runs the back-end (inputs, panel
//!   timing), core 1 runs the UI. Either core, and any interrupt, may post
//!   to either queue
//! - **Scheduled messages**: a fixed slot table counted down by a ~1 ms
//!   timer tick; expired messages are posted to their target core
//! - **Sleep without blocking**: a sleep is a scheduled message that calls
//!   a continuation when it comes due on the caller's loop
//! - **Process status**: each loop accounts its active, idle and retrieve
//!   time and publishes a checksummed per-second snapshot that the other
//!   core can read without locking
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │          Handlers · Idle functions (firmware)           │
//! ├────────────────────────────────────────────────────────┤
//! │             Dispatch Loop (dispatch.rs)                 │
//! │        MessageLoop · RoundRobin · HandlerEntry          │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   post · get · schedule · cancel · sleep_ms · tick      │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Queues      │  Scheduled Table   │  Process Status   │
//! │  queue.rs    │  sched.rs          │  status.rs        │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │       Messages (message.rs) · Sync (sync.rs)            │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/rp2040.rs)                   │
//! │   TIMER counter · Alarm 0 tick · SIO CPUID · ADC temp   │
//! ├────────────────────────────────────────────────────────┤
//! │        RP2040: 2 × Cortex-M0+ (Thumb, no CAS)           │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: queues, slots and snapshots are fixed-size and live in a
//!   single `static` [`kernel::Kernel`]
//! - **Copy semantics**: messages are copied into queues and slots; callers
//!   may reuse their message immediately
//! - **Critical sections**: `critical-section` (interrupts masked plus a
//!   hardware spinlock on the RP2040) guard every queue and slot access
//! - **Lock-free reads**: process status is read with a checksum retry
//!   instead of a lock

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod sync;
pub mod arch;
pub mod message;
pub mod queue;
pub mod sched;
pub mod status;
pub mod kernel;
pub mod dispatch;

pub use arch::{CoreId, CoreMask, Port};
pub use dispatch::{HandlerEntry, IdleFn, LoopContext, MessageLoop, SLEEP_HANDLER_ENTRY};
pub use error::{CmtError, CmtResult};
pub use kernel::Kernel;
pub use message::{Message, MsgData, MsgId};
