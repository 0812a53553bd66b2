//! # Synchronization Primitives
//!
//! Interrupt- and core-safe critical section abstractions.
//! All shared kernel state (queues, the scheduled-message table) must be
//! accessed within a critical section to prevent data races between the
//! two dispatch loops and interrupt handlers.
//!
//! On the RP2040 the `critical-section` implementation is supplied by
//! `rp2040-hal`: it masks interrupts on the calling core and then takes
//! hardware spinlock 31, so a critical section excludes both the local
//! interrupt context and the other core. Host test builds use the `std`
//! implementation.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section.
///
/// Interrupts are disabled and the cross-core lock is held on entry,
/// both are restored on exit. Nested calls are allowed.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
///
/// # Performance
/// Keep critical sections as short as possible to minimize interrupt
/// latency and the time the other core spins on the lock.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    critical_section::with(f)
}
