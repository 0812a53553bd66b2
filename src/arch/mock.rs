//! Host-side port used by the unit tests.
//!
//! The clock only moves when a test (or `busy_wait_ms`) advances it, which
//! makes loop accounting and timestamps deterministic.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

use super::{CoreId, Port};

pub struct MockPort {
    now_us: AtomicU64,
    core: AtomicUsize,
    temp_bits: AtomicU32,
    interrupts: AtomicU32,
    waited_ms: AtomicU32,
}

impl MockPort {
    pub const fn new() -> Self {
        Self {
            now_us: AtomicU64::new(0),
            core: AtomicUsize::new(0),
            // 25.0 C
            temp_bits: AtomicU32::new(0x41C8_0000),
            interrupts: AtomicU32::new(0),
            waited_ms: AtomicU32::new(0),
        }
    }

    pub fn advance_us(&self, us: u64) {
        self.now_us.fetch_add(us, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance_us(ms * 1_000);
    }

    pub fn set_core(&self, core: CoreId) {
        self.core.store(core.index(), Ordering::SeqCst);
    }

    pub fn set_interrupts(&self, mask: u32) {
        self.interrupts.store(mask, Ordering::SeqCst);
    }

    pub fn set_temp_c(&self, temp: f32) {
        self.temp_bits.store(temp.to_bits(), Ordering::SeqCst);
    }

    /// Total milliseconds spent in `busy_wait_ms`.
    pub fn waited_ms(&self) -> u32 {
        self.waited_ms.load(Ordering::SeqCst)
    }
}

impl Port for MockPort {
    fn now_us(&self) -> u64 {
        self.now_us.load(Ordering::SeqCst)
    }

    fn core(&self) -> CoreId {
        CoreId::from_index(self.core.load(Ordering::SeqCst)).unwrap_or(CoreId::Core0)
    }

    fn interrupt_status(&self) -> u32 {
        self.interrupts.load(Ordering::SeqCst)
    }

    fn core_temp_c(&self) -> f32 {
        f32::from_bits(self.temp_bits.load(Ordering::SeqCst))
    }

    fn busy_wait_ms(&self, ms: u32) {
        self.waited_ms.fetch_add(ms, Ordering::SeqCst);
        self.advance_ms(ms as u64);
    }
}
