//! # Scores Controller Firmware
//!
//! Boots the RP2040, starts the message kernel, and runs one dispatch loop
//! per core:
//!
//! | Core | Loop     | Handlers                                          |
//! |------|----------|---------------------------------------------------|
//! | 0    | Back-end | sleep, `UI_INITIALIZED`, `BE_TEST` delay self-test |
//! | 1    | UI       | sleep, `BE_INITIALIZED`, process-status report     |
//!
//! ## Start-up
//!
//! 1. Clocks, GPIO, ADC temperature sensor, kernel init
//! 2. Boot blink on the LED. The loops are not running yet, so each
//!    `sleep_or_wait` step truly waits
//! 3. Tick alarm started, core 1 launched into the UI loop
//! 4. Core 0 posts `BE_INITIALIZED` to the UI and enters the back-end loop
//! 5. The UI answers with `UI_INITIALIZED`; the back-end then starts the
//!    heartbeat (a chain of sleep continuations) and the 60 s self-test

#![cfg_attr(all(target_arch = "arm", target_os = "none"), no_std, no_main)]

#[cfg(all(target_arch = "arm", target_os = "none"))]
mod firmware {
    use core::cell::RefCell;

    use cortex_m_rt::entry;
    use embedded_hal::digital::v2::OutputPin;
    use log::info;
    use panic_halt as _;
    use portable_atomic::{AtomicBool, Ordering};
    use rp2040_hal as hal;

    use hal::gpio::bank0::Gpio25;
    use hal::gpio::{FunctionSioOutput, Pin, PullDown};
    use hal::multicore::{Multicore, Stack};
    use hal::pac;

    use scores::arch::rp2040::{self, Rp2040Port};
    use scores::config::{CORE1_STACK_WORDS, XTAL_FREQ_HZ};
    use scores::sync::{self, Mutex};
    use scores::{
        CoreId, HandlerEntry, IdleFn, Kernel, LoopContext, Message, MessageLoop, MsgData, MsgId,
        Port, SLEEP_HANDLER_ENTRY,
    };

    /// Second-stage bootloader for the Pico's W25Q080 flash.
    #[link_section = ".boot2"]
    #[used]
    pub static BOOT2_FIRMWARE: [u8; 256] = rp2040_boot2::BOOT_LOADER_W25Q080;

    static KERNEL: Kernel<Rp2040Port> = Kernel::new(Rp2040Port::new());

    static mut CORE1_STACK: Stack<CORE1_STACK_WORDS> = Stack::new();

    // -----------------------------------------------------------------------
    // Status LED
    // -----------------------------------------------------------------------

    type LedPin = Pin<Gpio25, FunctionSioOutput, PullDown>;

    static LED: Mutex<RefCell<Option<LedPin>>> = Mutex::new(RefCell::new(None));

    fn set_led(on: bool) {
        sync::critical_section(|cs| {
            if let Some(led) = LED.borrow_ref_mut(cs).as_mut() {
                let _ = if on { led.set_high() } else { led.set_low() };
            }
        });
    }

    const BOOT_BLINK_MS: u32 = 100;
    const BOOT_BLINKS: usize = 3;

    /// Blink `remaining / 2` more times. Called before the loops start, so
    /// each step busy-waits.
    fn boot_blink(remaining: usize) {
        set_led(remaining % 2 == 1);
        if remaining > 0 {
            KERNEL.sleep_or_wait(BOOT_BLINK_MS, boot_blink, remaining - 1);
        }
    }

    /// On/off times of the heartbeat in ms. Even steps light the LED.
    const HEARTBEAT_MS: [u32; 4] = [80, 120, 80, 1_720];

    fn heartbeat(step: usize) {
        set_led(step % 2 == 0);
        let next = (step + 1) % HEARTBEAT_MS.len();
        KERNEL.sleep_ms(HEARTBEAT_MS[step], heartbeat, next);
    }

    // -----------------------------------------------------------------------
    // Back-end (core 0)
    // -----------------------------------------------------------------------

    const BE_TEST_PERIOD_MS: u32 = 60_000;

    fn schedule_be_test() {
        let now = KERNEL.port().now_us();
        KERNEL.schedule(
            CoreId::BACKEND,
            BE_TEST_PERIOD_MS,
            &Message::with_data(MsgId::BE_TEST, MsgData::TsUs(now)),
        );
    }

    /// Measure how late the last scheduled test message arrived and go
    /// again.
    fn handle_be_test(msg: &Message) {
        if let MsgData::TsUs(scheduled_at) = msg.data {
            let elapsed = KERNEL.port().now_us().wrapping_sub(scheduled_at);
            let error_us = elapsed as i64 - BE_TEST_PERIOD_MS as i64 * 1_000;
            info!(
                "BE test: {}ms delay took {}us (error {}us)",
                BE_TEST_PERIOD_MS, elapsed, error_us
            );
        }
        schedule_be_test();
    }

    fn handle_ui_initialized(_msg: &Message) {
        info!("BE: UI initialised");
        heartbeat(0);
        if !KERNEL.scheduled_exists(MsgId::BE_TEST) {
            schedule_be_test();
        }
    }

    static LOOPS_ANNOUNCED: AtomicBool = AtomicBool::new(false);

    fn idle_announce_loops() {
        if KERNEL.loops_running() && !LOOPS_ANNOUNCED.swap(true, Ordering::Relaxed) {
            info!(
                "BE: both loops running, {} scheduled message(s) pending",
                KERNEL.scheduled_count()
            );
        }
    }

    static BE_HANDLERS: [HandlerEntry; 3] = [
        SLEEP_HANDLER_ENTRY,
        HandlerEntry::new(MsgId::UI_INITIALIZED, handle_ui_initialized),
        HandlerEntry::new(MsgId::BE_TEST, handle_be_test),
    ];

    static BE_IDLE: [IdleFn; 1] = [idle_announce_loops];

    static BE_CONTEXT: LoopContext = LoopContext {
        core: CoreId::BACKEND,
        handlers: &BE_HANDLERS,
        idle_functions: &BE_IDLE,
    };

    // -----------------------------------------------------------------------
    // UI (core 1)
    // -----------------------------------------------------------------------

    /// Periodic process-status report, UI range.
    const UI_PS_REPORT: MsgId = MsgId(0x0207);
    const PS_REPORT_PERIOD_MS: u32 = 10_000;

    fn handle_be_initialized(_msg: &Message) {
        info!("UI: back-end initialised");
        KERNEL.post_blocking(CoreId::BACKEND, &Message::new(MsgId::UI_INITIALIZED));
        KERNEL.schedule_here(PS_REPORT_PERIOD_MS, &Message::new(UI_PS_REPORT));
    }

    fn handle_ps_report(_msg: &Message) {
        for core in CoreId::ALL {
            info!("Core {}: {}", core.index(), KERNEL.proc_status_sec(core));
        }
        KERNEL.schedule_here(PS_REPORT_PERIOD_MS, &Message::new(UI_PS_REPORT));
    }

    static UI_HANDLERS: [HandlerEntry; 3] = [
        SLEEP_HANDLER_ENTRY,
        HandlerEntry::new(MsgId::BE_INITIALIZED, handle_be_initialized),
        HandlerEntry::new(UI_PS_REPORT, handle_ps_report),
    ];

    static UI_CONTEXT: LoopContext = LoopContext {
        core: CoreId::UI,
        handlers: &UI_HANDLERS,
        idle_functions: &[],
    };

    // -----------------------------------------------------------------------
    // Entry point
    // -----------------------------------------------------------------------

    /// Firmware entry point. Brings up the board and both loops. Does not
    /// return.
    #[entry]
    fn main() -> ! {
        let mut pac = pac::Peripherals::take().unwrap();
        let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);
        let clocks = hal::clocks::init_clocks_and_plls(
            XTAL_FREQ_HZ,
            pac.XOSC,
            pac.CLOCKS,
            pac.PLL_SYS,
            pac.PLL_USB,
            &mut pac.RESETS,
            &mut watchdog,
        )
        .ok()
        .unwrap();

        let mut timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
        let mut sio = hal::Sio::new(pac.SIO);
        let pins = hal::gpio::Pins::new(
            pac.IO_BANK0,
            pac.PADS_BANK0,
            sio.gpio_bank0,
            &mut pac.RESETS,
        );
        let led: LedPin = pins.gpio25.into_push_pull_output();
        sync::critical_section(|cs| {
            LED.borrow_ref_mut(cs).replace(led);
        });

        let mut adc = hal::Adc::new(pac.ADC, &mut pac.RESETS);
        if let Some(sensor) = adc.take_temp_sensor() {
            KERNEL.port().attach_temp_sensor(adc, sensor);
        }

        KERNEL.init();
        boot_blink(BOOT_BLINKS * 2);

        let alarm = timer.alarm_0().expect("alarm 0 already taken");
        rp2040::start_tick(alarm, &KERNEL).expect("tick already running");

        let mut mc = Multicore::new(&mut pac.PSM, &mut pac.PPB, &mut sio.fifo);
        let cores = mc.cores();
        let core1 = &mut cores[1];
        core1
            .spawn(unsafe { &mut CORE1_STACK.mem }, || {
                MessageLoop::new(&KERNEL, &UI_CONTEXT).run()
            })
            .expect("Failed to launch core 1");

        KERNEL.post_blocking(CoreId::UI, &Message::new(MsgId::BE_INITIALIZED));
        MessageLoop::new(&KERNEL, &BE_CONTEXT).run()
    }
}

/// The firmware only runs on the RP2040; host builds exist for the tests.
#[cfg(not(all(target_arch = "arm", target_os = "none")))]
fn main() {}
