//! # Messages
//!
//! Defines the unit of communication between producers (interrupt
//! handlers, message handlers, idle functions) and a core's dispatch loop.
//!
//! A [`Message`] is a small `Copy` record: an identifier, a tagged payload
//! and the millisecond timestamp stamped when it was queued. Messages are
//! copied into a queue on post and copied out on dequeue; nothing is shared.
//!
//! ## Lifecycle
//!
//! ```text
//!   poster builds Message ──► post(core) ──► copy in queue (t stamped)
//!                                                 │
//!                                      dispatch loop dequeues copy
//!                                                 │
//!                                 every matching handler gets &Message
//!                                                 │
//!                                             dropped
//! ```
//!
//! ## Identifier space
//!
//! Ids are partitioned by convention only: common ids below `0x0100`,
//! back-end (core 0) ids in `0x0100..0x0200`, UI (core 1) ids from `0x0200`.
//! The kernel itself routes on the raw number.

use core::fmt;

// ---------------------------------------------------------------------------
// Message identifiers
// ---------------------------------------------------------------------------

/// Message identifier. Opaque to the kernel; duplicates may coexist in a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MsgId(pub u16);

/// Conventional range an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgRange {
    Common,
    Backend,
    Ui,
}

impl MsgId {
    // Common messages (used by both cores)
    pub const COMMON_NOOP: MsgId = MsgId(0x0000);
    pub const CONFIG_CHANGED: MsgId = MsgId(0x0001);
    pub const CMT_SLEEP: MsgId = MsgId(0x0002);
    pub const DEBUG_CHANGED: MsgId = MsgId(0x0003);
    pub const INPUT_SW_PRESS: MsgId = MsgId(0x0004);
    pub const INPUT_SW_RELEASE: MsgId = MsgId(0x0005);
    pub const RC_ACTION: MsgId = MsgId(0x0006);
    pub const RC_LONGPRESS: MsgId = MsgId(0x0007);
    pub const RC_VALUE_ENTERED: MsgId = MsgId(0x0008);
    pub const PANEL_BLINK_FAST_TGL: MsgId = MsgId(0x0009);
    pub const PANEL_BLINK_SLOW_TGL: MsgId = MsgId(0x000A);
    pub const PANEL_REPEAT_21MS: MsgId = MsgId(0x000B);
    pub const SWITCH_ACTION: MsgId = MsgId(0x000C);
    pub const SWITCH_LONGPRESS: MsgId = MsgId(0x000D);

    // Back-end messages
    pub const BACKEND_NOOP: MsgId = MsgId(0x0100);
    pub const BE_TEST: MsgId = MsgId(0x0101);
    pub const INPUT_SW_DEBOUNCE: MsgId = MsgId(0x0102);
    pub const IR_FRAME_RCVD: MsgId = MsgId(0x0103);
    pub const STDIO_CHAR_READY: MsgId = MsgId(0x0104);
    pub const B1SW_LONGPRESS_DELAY: MsgId = MsgId(0x0105);
    pub const B2SW_LONGPRESS_DELAY: MsgId = MsgId(0x0106);
    pub const UI_INITIALIZED: MsgId = MsgId(0x0107);

    // Front-end/UI messages
    pub const UI_NOOP: MsgId = MsgId(0x0200);
    pub const BE_INITIALIZED: MsgId = MsgId(0x0201);
    pub const CMD_INIT_TERMINAL: MsgId = MsgId(0x0202);
    pub const DISPLAY_MESSAGE: MsgId = MsgId(0x0203);
    pub const PANEL_TOD_UPDATE: MsgId = MsgId(0x0204);
    pub const SHELL_START: MsgId = MsgId(0x0205);
    pub const WIFI_CONN_STATUS_UPDATE: MsgId = MsgId(0x0206);

    /// Conventional range of this id.
    pub const fn range(self) -> MsgRange {
        if self.0 >= Self::UI_NOOP.0 {
            MsgRange::Ui
        } else if self.0 >= Self::BACKEND_NOOP.0 {
            MsgRange::Backend
        } else {
            MsgRange::Common
        }
    }
}

/// Formats as `0x101 (BE+1)`, the layout the `.ps` diagnostics use.
impl fmt::Display for MsgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#05X}", self.0)?;
        match self.range() {
            MsgRange::Common => Ok(()),
            MsgRange::Backend => write!(f, " (BE+{})", self.0 - Self::BACKEND_NOOP.0),
            MsgRange::Ui => write!(f, " (UI+{})", self.0 - Self::UI_NOOP.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload types
// ---------------------------------------------------------------------------

/// Deferred continuation invoked by the generic sleep handler.
pub type SleepFn = fn(user_data: usize);

/// Payload of a sleep message: what to call and with which opaque datum.
#[derive(Debug, Clone, Copy)]
pub struct SleepData {
    pub func: SleepFn,
    pub user_data: usize,
}

impl SleepData {
    #[inline]
    pub fn call(&self) {
        (self.func)(self.user_data)
    }
}

/// Which IR receiver produced a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrSource {
    None = 0,
    A = 1,
    B = 2,
}

/// A decoded NEC-style IR frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrFrame {
    pub data: u16,
    pub addr: u16,
    pub source: IrSource,
    pub repeat: bool,
    pub ts_ms: u32,
}

/// Virtual remote button code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcCode(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcAction {
    pub code: RcCode,
    pub repeat: bool,
    pub ts_ms: u32,
}

/// A number entered on the remote, `value / divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcValueEntry {
    pub code: RcCode,
    pub value: i32,
    pub divisor: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchBank {
    Bank1 = 1,
    Bank2 = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchId {
    None = 0,
    Left = 1,
    Right = 2,
    Up = 3,
    Down = 4,
    Home = 5,
    Enter = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchAction {
    pub bank: SwitchBank,
    pub switch_id: SwitchId,
    pub pressed: bool,
    pub repeat: bool,
}

/// Message payload. The variant in use is determined by the message id.
#[derive(Debug, Clone, Copy)]
pub enum MsgData {
    None,
    Char(char),
    Bool(bool),
    Debug(bool),
    Sleep(SleepData),
    IrFrame(IrFrame),
    RcAction(RcAction),
    RcEntry(RcValueEntry),
    Status(i32),
    Str(&'static str),
    SwitchAction(SwitchAction),
    TsMs(u32),
    TsUs(u64),
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A message as queued and dispatched.
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub id: MsgId,
    pub data: MsgData,
    /// Millisecond time the message was queued. Set by the kernel on post.
    pub t: u32,
}

impl Message {
    /// A message with no payload.
    pub const fn new(id: MsgId) -> Self {
        Self::with_data(id, MsgData::None)
    }

    pub const fn with_data(id: MsgId, data: MsgData) -> Self {
        Self { id, data, t: 0 }
    }

    /// A `CMT_SLEEP` message carrying a continuation.
    pub const fn sleep(func: SleepFn, user_data: usize) -> Self {
        Self::with_data(MsgId::CMT_SLEEP, MsgData::Sleep(SleepData { func, user_data }))
    }

    /// Age of the message in milliseconds relative to `now_ms`.
    #[inline]
    pub fn age_ms(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.t)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_id_ranges() {
        assert_eq!(MsgId::CMT_SLEEP.range(), MsgRange::Common);
        assert_eq!(MsgId::SWITCH_LONGPRESS.range(), MsgRange::Common);
        assert_eq!(MsgId::BACKEND_NOOP.range(), MsgRange::Backend);
        assert_eq!(MsgId::UI_INITIALIZED.range(), MsgRange::Backend);
        assert_eq!(MsgId::UI_NOOP.range(), MsgRange::Ui);
        assert_eq!(MsgId(0xFFFF).range(), MsgRange::Ui);
    }

    #[test]
    fn test_id_display_labels() {
        assert_eq!(format!("{}", MsgId::CMT_SLEEP), "0x002");
        assert_eq!(format!("{}", MsgId::BE_TEST), "0x101 (BE+1)");
        assert_eq!(format!("{}", MsgId::SHELL_START), "0x205 (UI+5)");
    }

    #[test]
    fn test_new_message_is_unstamped() {
        let msg = Message::with_data(MsgId(42), MsgData::Status(7));
        assert_eq!(msg.id, MsgId(42));
        assert_eq!(msg.t, 0);
        assert!(matches!(msg.data, MsgData::Status(7)));
    }

    #[test]
    fn test_sleep_message_calls_continuation() {
        static SEEN: AtomicUsize = AtomicUsize::new(0);
        fn record(user_data: usize) {
            SEEN.store(user_data, Ordering::SeqCst);
        }

        let msg = Message::sleep(record, 1234);
        assert_eq!(msg.id, MsgId::CMT_SLEEP);
        match msg.data {
            MsgData::Sleep(sleep) => sleep.call(),
            other => panic!("unexpected payload {:?}", other),
        }
        assert_eq!(SEEN.load(Ordering::SeqCst), 1234);
    }

    #[test]
    fn test_age_wraps() {
        let mut msg = Message::new(MsgId::COMMON_NOOP);
        msg.t = u32::MAX - 4;
        assert_eq!(msg.age_ms(5), 10);
    }
}
