//! # Scores Kernel Configuration
//!
//! Compile-time constants governing the message kernel.
//! All limits are fixed at compile time; nothing is allocated.

/// Number of slots in the scheduled-message table. Each pending
/// scheduled message or sleep continuation holds one slot until it
/// fires or is cancelled. Running out of slots is a sizing bug and
/// halts the firmware.
pub const SCHEDULED_MESSAGES_MAX: usize = 16;

/// Depth of each core's message queue. Producers are bounded so a
/// blocking post never waits in practice.
pub const QUEUE_DEPTH: usize = 32;

/// A near-full warning is emitted (debug mode only) when fewer than this
/// many free entries remain in a queue at post time.
pub const QUEUE_WARN_HEADROOM: usize = 2;

/// Number of execution cores, each running one dispatch loop.
pub const CORE_COUNT: usize = 2;

/// Nominal period of the scheduled-message tick in microseconds.
pub const TICK_PERIOD_US: u32 = 1_000;

/// Measured per-call overhead of the tick callback in microseconds.
/// The hardware alarm is re-armed at `TICK_PERIOD_US - TICK_OVERHEAD_US`
/// so that scheduled delays track wall time.
pub const TICK_OVERHEAD_US: u32 = 20;

/// Window over which each loop accumulates process status before
/// rotating it into the per-second snapshot.
pub const ONE_SECOND_US: u64 = 1_000_000;

/// External crystal frequency on the Pico board.
pub const XTAL_FREQ_HZ: u32 = 12_000_000;

/// Core 1 stack size in words.
pub const CORE1_STACK_WORDS: usize = 4096;

/// The alarm period actually programmed into the hardware timer.
pub const fn tick_alarm_us() -> u32 {
    TICK_PERIOD_US - TICK_OVERHEAD_US
}
