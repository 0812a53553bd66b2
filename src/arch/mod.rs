//! # Architecture Abstraction Layer
//!
//! Provides the hardware boundary for the message kernel. The kernel only
//! needs a clock, the identity of the calling core, and a few diagnostic
//! readings; everything else about the board stays in the port.
//!
//! Currently implements the RP2040 port; host unit tests use a mock port.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod rp2040;

#[cfg(test)]
pub(crate) mod mock;

/// One of the two execution cores.
///
/// By convention core 0 runs the back-end (inputs, panel timing) and
/// core 1 runs the UI (display, terminal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoreId {
    Core0 = 0,
    Core1 = 1,
}

impl CoreId {
    pub const BACKEND: CoreId = CoreId::Core0;
    pub const UI: CoreId = CoreId::Core1;

    /// Both cores, in index order.
    pub const ALL: [CoreId; 2] = [CoreId::Core0, CoreId::Core1];

    /// Array index for per-core state.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn from_index(index: usize) -> Option<CoreId> {
        match index {
            0 => Some(CoreId::Core0),
            1 => Some(CoreId::Core1),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// A set of cores, as returned by the post-to-both calls.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CoreMask: u8 {
        const CORE0 = 0x01;
        const CORE1 = 0x02;
    }
}

impl CoreMask {
    #[inline]
    pub const fn of(core: CoreId) -> CoreMask {
        match core {
            CoreId::Core0 => CoreMask::CORE0,
            CoreId::Core1 => CoreMask::CORE1,
        }
    }
}

/// Services the kernel needs from the platform.
///
/// Implementations must be callable from either core and from interrupt
/// context; none of these may block except `busy_wait_ms`.
pub trait Port: Sync {
    /// Monotonic microsecond clock.
    fn now_us(&self) -> u64;

    /// Millisecond clock used for message timestamps. Wraps after ~49 days.
    #[inline]
    fn now_ms(&self) -> u32 {
        (self.now_us() / 1_000) as u32
    }

    /// The core the caller is executing on.
    fn core(&self) -> CoreId;

    /// Snapshot of the enabled-interrupt mask of the calling core.
    fn interrupt_status(&self) -> u32;

    /// On-die temperature in degrees Celsius.
    fn core_temp_c(&self) -> f32;

    /// Truly block the caller for `ms` milliseconds. Only used before the
    /// dispatch loops are running.
    fn busy_wait_ms(&self, ms: u32);
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_index_round_trip() {
        for core in CoreId::ALL {
            assert_eq!(CoreId::from_index(core.index()), Some(core));
        }
        assert_eq!(CoreId::from_index(2), None);
        assert_eq!(CoreId::BACKEND, CoreId::Core0);
        assert_eq!(CoreId::UI, CoreId::Core1);
    }

    #[test]
    fn test_core_mask_bits() {
        assert_eq!(CoreMask::of(CoreId::Core0).bits(), 0x01);
        assert_eq!(CoreMask::of(CoreId::Core1).bits(), 0x02);
        assert_eq!(CoreMask::of(CoreId::Core0) | CoreMask::of(CoreId::Core1), CoreMask::all());
    }
}
