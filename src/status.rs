//! # Process Status Accumulator
//!
//! Each dispatch loop accumulates how it spends its time (handling
//! messages, running idle functions, retrieving messages) in a private
//! [`ProcStatusAccum`]. Once a second the loop publishes those counters
//! into its core's shared [`ProcStatusSec`] and starts over.
//!
//! ## Consistency protocol
//!
//! The diagnostic reader usually runs on the *other* core, so it must not
//! lock against the writer. Instead the writer keeps a checksum:
//!
//! ```text
//!   writer (owning loop)            reader (any core)
//!   ───────────────────             ─────────────────
//!   cs      ← -1                    loop {
//!   fields  ← new values              fields ← load
//!   cs      ← Σ fields                cs     ← load
//!                                     if cs == Σ fields { return }
//!                                   }
//! ```
//!
//! Payload first, checksum last on both sides. A reader that overlaps a
//! publish sees either the `-1` marker or a sum that does not match the
//! fields it read, and retries. The writer publishes once per second, so
//! the reader converges after at most a couple of passes.

use core::fmt;

use portable_atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::config::ONE_SECOND_US;

// ---------------------------------------------------------------------------
// Live accumulator (owned by one loop)
// ---------------------------------------------------------------------------

/// Counters accumulated by a loop during the current one-second window.
/// Times are in microseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcStatusAccum {
    /// Start of the current window.
    pub ts_psa: u64,
    pub t_active: u64,
    pub t_idle: u64,
    pub t_msg_retrieve: u64,
    /// Messages retrieved and dispatched.
    pub retrieved: u32,
    /// Empty-queue iterations.
    pub idle: u32,
}

impl ProcStatusAccum {
    pub const fn new(now_us: u64) -> Self {
        Self {
            ts_psa: now_us,
            t_active: 0,
            t_idle: 0,
            t_msg_retrieve: 0,
            retrieved: 0,
            idle: 0,
        }
    }

    /// True once a full second has elapsed since the window started.
    #[inline]
    pub fn window_elapsed(&self, now_us: u64) -> bool {
        now_us.wrapping_sub(self.ts_psa) >= ONE_SECOND_US
    }

    /// Zero the counters and start a new window at `now_us`.
    pub fn reset(&mut self, now_us: u64) {
        *self = Self::new(now_us);
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// A consistent copy of one core's last full second.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcStatus {
    pub cs: i64,
    /// Time the snapshot was taken (µs).
    pub ts_psa: u64,
    pub t_active: u64,
    pub t_idle: u64,
    pub t_msg_retrieve: u64,
    pub retrieved: u32,
    pub idle: u32,
    pub interrupt_status: u32,
    pub core_temp: f32,
}

impl ProcStatus {
    /// Sum of the checksummed fields.
    pub fn checksum(&self) -> i64 {
        checksum(
            self.idle,
            self.retrieved,
            self.t_active,
            self.t_idle,
            self.t_msg_retrieve,
            self.interrupt_status,
        )
    }

    /// Milliseconds of the second not accounted to any loop activity
    /// (interrupts, accounting overhead). Negative if the window ran long.
    pub fn unaccounted_ms(&self) -> i64 {
        let accounted = self.t_active + self.t_idle + self.t_msg_retrieve;
        (ONE_SECOND_US as i64 - accounted as i64) / 1_000
    }
}

/// `.ps` layout: `Temp:25.0 Retrieved:3 Idle:812 Active-us:... Intr:0x...`
impl fmt::Display for ProcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Temp:{:.1} Retrieved:{} Idle:{} Active-us:{} Idle-us:{} Retrieve-us:{} ?-ms:{} Intr:0x{:08x}",
            self.core_temp,
            self.retrieved,
            self.idle,
            self.t_active,
            self.t_idle,
            self.t_msg_retrieve,
            self.unaccounted_ms(),
            self.interrupt_status,
        )
    }
}

#[inline]
fn checksum(idle: u32, retrieved: u32, t_active: u64, t_idle: u64, t_retrieve: u64, intr: u32) -> i64 {
    (idle as i64)
        .wrapping_add(retrieved as i64)
        .wrapping_add(t_active as i64)
        .wrapping_add(t_idle as i64)
        .wrapping_add(t_retrieve as i64)
        .wrapping_add(intr as i64)
}

// ---------------------------------------------------------------------------
// Shared per-second cell
// ---------------------------------------------------------------------------

/// Marker stored in the checksum while a publish is in progress.
const CS_WRITING: i64 = -1;

/// The per-second snapshot of one core, written by that core's loop and
/// read lock-free from anywhere.
pub struct ProcStatusSec {
    cs: AtomicI64,
    ts_psa: AtomicU64,
    t_active: AtomicU64,
    t_idle: AtomicU64,
    t_msg_retrieve: AtomicU64,
    retrieved: AtomicU32,
    idle: AtomicU32,
    interrupt_status: AtomicU32,
    core_temp: AtomicU32,
}

impl ProcStatusSec {
    pub const fn new() -> Self {
        Self {
            cs: AtomicI64::new(0),
            ts_psa: AtomicU64::new(0),
            t_active: AtomicU64::new(0),
            t_idle: AtomicU64::new(0),
            t_msg_retrieve: AtomicU64::new(0),
            retrieved: AtomicU32::new(0),
            idle: AtomicU32::new(0),
            interrupt_status: AtomicU32::new(0),
            core_temp: AtomicU32::new(0),
        }
    }

    /// Publish a finished window. Must only be called by the owning loop.
    pub fn publish(&self, live: &ProcStatusAccum, interrupt_status: u32, core_temp: f32, now_us: u64) {
        self.cs.store(CS_WRITING, Ordering::SeqCst);
        self.idle.store(live.idle, Ordering::SeqCst);
        self.retrieved.store(live.retrieved, Ordering::SeqCst);
        self.t_active.store(live.t_active, Ordering::SeqCst);
        self.t_idle.store(live.t_idle, Ordering::SeqCst);
        self.t_msg_retrieve.store(live.t_msg_retrieve, Ordering::SeqCst);
        self.interrupt_status.store(interrupt_status, Ordering::SeqCst);
        self.core_temp.store(core_temp.to_bits(), Ordering::SeqCst);
        self.ts_psa.store(now_us, Ordering::SeqCst);
        let cs = checksum(
            live.idle,
            live.retrieved,
            live.t_active,
            live.t_idle,
            live.t_msg_retrieve,
            interrupt_status,
        );
        self.cs.store(cs, Ordering::SeqCst);
    }

    /// Read a consistent snapshot, retrying while a publish overlaps.
    pub fn read(&self) -> ProcStatus {
        loop {
            let snapshot = ProcStatus {
                core_temp: f32::from_bits(self.core_temp.load(Ordering::SeqCst)),
                idle: self.idle.load(Ordering::SeqCst),
                retrieved: self.retrieved.load(Ordering::SeqCst),
                t_active: self.t_active.load(Ordering::SeqCst),
                t_idle: self.t_idle.load(Ordering::SeqCst),
                t_msg_retrieve: self.t_msg_retrieve.load(Ordering::SeqCst),
                interrupt_status: self.interrupt_status.load(Ordering::SeqCst),
                ts_psa: self.ts_psa.load(Ordering::SeqCst),
                cs: self.cs.load(Ordering::SeqCst),
            };
            if snapshot.cs == snapshot.checksum() {
                return snapshot;
            }
            core::hint::spin_loop();
        }
    }
}

impl Default for ProcStatusSec {
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
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_initial_snapshot_is_consistent() {
        let sec = ProcStatusSec::new();
        let ps = sec.read();
        assert_eq!(ps, ProcStatus::default());
    }

    #[test]
    fn test_publish_then_read() {
        let sec = ProcStatusSec::new();
        let live = ProcStatusAccum {
            ts_psa: 0,
            t_active: 1_500,
            t_idle: 990_000,
            t_msg_retrieve: 4_000,
            retrieved: 12,
            idle: 81_000,
        };
        sec.publish(&live, 0x0000_8020, 27.5, 1_000_000);

        let ps = sec.read();
        assert_eq!(ps.retrieved, 12);
        assert_eq!(ps.idle, 81_000);
        assert_eq!(ps.t_active, 1_500);
        assert_eq!(ps.interrupt_status, 0x0000_8020);
        assert_eq!(ps.core_temp, 27.5);
        assert_eq!(ps.ts_psa, 1_000_000);
        assert_eq!(ps.cs, ps.checksum());
        assert_eq!(ps.unaccounted_ms(), 4);
    }

    #[test]
    fn test_window_and_reset() {
        let mut live = ProcStatusAccum::new(100);
        live.idle = 5;
        assert!(!live.window_elapsed(100 + ONE_SECOND_US - 1));
        assert!(live.window_elapsed(100 + ONE_SECOND_US));
        live.reset(2_000_000);
        assert_eq!(live, ProcStatusAccum::new(2_000_000));
    }

    #[test]
    fn test_display_layout() {
        let ps = ProcStatus {
            retrieved: 3,
            idle: 10,
            t_active: 100,
            t_idle: 200,
            t_msg_retrieve: 300,
            interrupt_status: 0x1f,
            core_temp: 24.96,
            ..ProcStatus::default()
        };
        assert_eq!(
            format!("{}", ps),
            "Temp:25.0 Retrieved:3 Idle:10 Active-us:100 Idle-us:200 Retrieve-us:300 ?-ms:999 Intr:0x0000001f"
        );
    }

    /// A reader racing a writer only ever returns whole generations.
    #[test]
    fn test_concurrent_reader_sees_consistent_snapshots() {
        let sec = ProcStatusSec::new();
        let done = AtomicBool::new(false);

        std::thread::scope(|s| {
            s.spawn(|| {
                for gen in 1..20_000u32 {
                    let live = ProcStatusAccum {
                        ts_psa: 0,
                        idle: gen,
                        retrieved: gen * 2,
                        t_active: gen as u64 * 3,
                        t_idle: gen as u64 * 4,
                        t_msg_retrieve: gen as u64 * 5,
                    };
                    sec.publish(&live, gen * 6, 0.0, gen as u64);
                }
                done.store(true, Ordering::SeqCst);
            });

            let mut reads = 0u32;
            while !done.load(Ordering::SeqCst) || reads < 100 {
                let ps = sec.read();
                let gen = ps.idle;
                assert_eq!(ps.cs, ps.checksum());
                assert_eq!(ps.retrieved, gen * 2);
                assert_eq!(ps.t_active, gen as u64 * 3);
                assert_eq!(ps.t_idle, gen as u64 * 4);
                assert_eq!(ps.t_msg_retrieve, gen as u64 * 5);
                assert_eq!(ps.interrupt_status, gen * 6);
                reads += 1;
            }
        });
    }
}
