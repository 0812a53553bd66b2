//! # RP2040 Port
//!
//! Dual Cortex-M0+ at 125 MHz. Provides:
//! - The microsecond clock, read straight from the 64-bit TIMER counter so
//!   either core can read it without owning the `Timer` driver
//! - The repeating ~1 ms tick on TIMER alarm 0 (`TIMER_IRQ_0`), serviced by
//!   whichever core unmasks the interrupt (core 0)
//! - Core identity from the SIO `CPUID` register
//! - NVIC enabled-interrupt snapshot and on-die temperature for the
//!   per-second process status
//!
//! Cross-core locking comes from the `critical-section` implementation in
//! `rp2040-hal` (interrupt mask plus hardware spinlock 31).

use core::cell::RefCell;

use cortex_m::peripheral::NVIC;
use fugit::MicrosDurationU32;
use log::{info, warn};
use portable_atomic::{AtomicBool, AtomicU32, Ordering};
use rp2040_hal as hal;

use embedded_hal::adc::OneShot;
use hal::adc::{Adc, TempSense};
use hal::pac::{self, interrupt};
use hal::timer::{Alarm, Alarm0};

use super::{CoreId, Port};
use crate::config::tick_alarm_us;
use crate::error::{CmtError, CmtResult};
use crate::kernel::Kernel;
use crate::sync::{self, Mutex};

/// ADC reference voltage.
const ADC_VREF: f32 = 3.3;
/// 12-bit conversion.
const ADC_STEPS: f32 = 4096.0;

// ---------------------------------------------------------------------------
// Port
// ---------------------------------------------------------------------------

/// Temperature sensor, once handed over by the firmware.
struct TempProbe {
    adc: Adc,
    sensor: TempSense,
}

pub struct Rp2040Port {
    probe: Mutex<RefCell<Option<TempProbe>>>,
    /// Last good reading, as `f32` bits.
    last_temp: AtomicU32,
}

impl Rp2040Port {
    pub const fn new() -> Self {
        Self {
            probe: Mutex::new(RefCell::new(None)),
            last_temp: AtomicU32::new(0),
        }
    }

    /// Hand the ADC and its temperature channel to the port. Until this is
    /// called the reported temperature is 0.0.
    pub fn attach_temp_sensor(&self, adc: Adc, sensor: TempSense) {
        sync::critical_section(|cs| {
            self.probe.borrow_ref_mut(cs).replace(TempProbe { adc, sensor });
        });
    }
}

impl Default for Rp2040Port {
    fn default() -> Self {
        Self::new()
    }
}

/// RP2040 datasheet 4.9.5: T = 27 - (V - 0.706) / 0.001721
fn raw_to_celsius(raw: u16) -> f32 {
    let volts = raw as f32 * ADC_VREF / ADC_STEPS;
    27.0 - (volts - 0.706) / 0.001721
}

impl Port for Rp2040Port {
    fn now_us(&self) -> u64 {
        // SAFETY: read-only access to the free-running raw counter registers
        let timer = unsafe { &*pac::TIMER::ptr() };
        loop {
            let hi = timer.timerawh().read().bits();
            let lo = timer.timerawl().read().bits();
            if timer.timerawh().read().bits() == hi {
                return ((hi as u64) << 32) | lo as u64;
            }
        }
    }

    fn core(&self) -> CoreId {
        match hal::Sio::core() {
            hal::sio::CoreId::Core0 => CoreId::Core0,
            hal::sio::CoreId::Core1 => CoreId::Core1,
        }
    }

    fn interrupt_status(&self) -> u32 {
        // SAFETY: ISER is banked per core and reading it has no side effects
        unsafe { (*NVIC::PTR).iser[0].read() }
    }

    fn core_temp_c(&self) -> f32 {
        let reading = sync::critical_section(|cs| {
            let mut probe = self.probe.borrow_ref_mut(cs);
            let probe = probe.as_mut()?;
            let raw: u16 = probe.adc.read(&mut probe.sensor).ok()?;
            Some(raw_to_celsius(raw))
        });
        match reading {
            Some(temp) => {
                self.last_temp.store(temp.to_bits(), Ordering::Relaxed);
                temp
            }
            None => f32::from_bits(self.last_temp.load(Ordering::Relaxed)),
        }
    }

    fn busy_wait_ms(&self, ms: u32) {
        let until = self.now_us() + ms as u64 * 1_000;
        while self.now_us() < until {
            cortex_m::asm::nop();
        }
    }
}

// ---------------------------------------------------------------------------
// Periodic tick
// ---------------------------------------------------------------------------

static TICK_ALARM: Mutex<RefCell<Option<Alarm0>>> = Mutex::new(RefCell::new(None));
static TICK_KERNEL: Mutex<RefCell<Option<&'static Kernel<Rp2040Port>>>> = Mutex::new(RefCell::new(None));
static TICK_STARTED: AtomicBool = AtomicBool::new(false);

fn arm(alarm: &mut Alarm0) {
    if alarm.schedule(MicrosDurationU32::micros(tick_alarm_us())).is_err() {
        warn!("CMT - tick alarm could not be armed");
    }
}

/// Start the repeating kernel tick on alarm 0 and unmask `TIMER_IRQ_0` on
/// the calling core.
///
/// # Returns
/// `Err(CmtError::AlreadyInitialized)` if the tick is already running.
pub fn start_tick(mut alarm: Alarm0, kernel: &'static Kernel<Rp2040Port>) -> CmtResult<()> {
    if TICK_STARTED.swap(true, Ordering::SeqCst) {
        return Err(CmtError::AlreadyInitialized);
    }

    alarm.clear_interrupt();
    arm(&mut alarm);
    alarm.enable_interrupt();

    sync::critical_section(|cs| {
        TICK_KERNEL.borrow_ref_mut(cs).replace(kernel);
        TICK_ALARM.borrow_ref_mut(cs).replace(alarm);
    });

    // SAFETY: the handler only touches state installed above
    unsafe { NVIC::unmask(pac::Interrupt::TIMER_IRQ_0) };
    info!("CMT - tick started, period {}us", tick_alarm_us());
    Ok(())
}

#[interrupt]
fn TIMER_IRQ_0() {
    let kernel = sync::critical_section(|cs| {
        if let Some(alarm) = TICK_ALARM.borrow_ref_mut(cs).as_mut() {
            alarm.clear_interrupt();
        }
        *TICK_KERNEL.borrow_ref(cs)
    });

    let repeat = kernel.map_or(false, Kernel::tick);

    if repeat {
        sync::critical_section(|cs| {
            if let Some(alarm) = TICK_ALARM.borrow_ref_mut(cs).as_mut() {
                arm(alarm);
            }
        });
    }
}
