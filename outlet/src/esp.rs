use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{anyhow, Context};
use esp_idf_hal::gpio::{AnyInputPin, AnyOutputPin, PinDriver, Pull};
use esp_idf_svc::log::EspLogger;
use log::{info, warn};

use outlet_common::{
    Clock, OutletController, OutletPins, RestartReason, RuntimeConfig, SystemClock, SystemControl,
};

use crate::zigbee::ZigbeeRadio;

const WATCHDOG_TIMEOUT_SEC: u32 = 30;
const WATCHDOG_FEED_MS: u64 = 1_000;

/// Sleeps in slices short enough to keep the task watchdog fed.
#[derive(Default)]
struct WatchdogClock {
    inner: SystemClock,
}

impl Clock for WatchdogClock {
    fn now_ms(&self) -> u64 {
        self.inner.now_ms()
    }

    fn sleep_ms(&mut self, duration_ms: u64) {
        let mut remaining = duration_ms;
        loop {
            feed_watchdog();
            if remaining == 0 {
                break;
            }
            let slice = remaining.min(WATCHDOG_FEED_MS);
            self.inner.sleep_ms(slice);
            remaining -= slice;
        }
    }
}

struct EspSystem;

impl SystemControl for EspSystem {
    fn restart(&mut self, reason: RestartReason) {
        warn!("restarting ({})", reason.as_str());
        unsafe { esp_idf_sys::esp_restart() };
    }
}

pub fn run() -> anyhow::Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let runtime = RuntimeConfig::default();
    info!(
        "power outlet firmware starting, console at {} baud",
        runtime.serial_baud
    );

    let rail = unsafe { PinDriver::output(AnyOutputPin::new(runtime.pins.rail_pin)) }
        .context("failed to configure rail pin")?;
    let indicator = unsafe { PinDriver::output(AnyOutputPin::new(runtime.pins.indicator_pin)) }
        .context("failed to configure indicator pin")?;
    let mut reset_button =
        unsafe { PinDriver::input(AnyInputPin::new(runtime.pins.reset_button_pin)) }
            .context("failed to configure reset button pin")?;
    reset_button
        .set_pull(Pull::Up)
        .context("failed to enable reset button pull-up")?;

    init_watchdog(WATCHDOG_TIMEOUT_SEC)?;
    add_current_task_to_watchdog()?;

    let radio = ZigbeeRadio::new(runtime.network.channel_mask);
    let pins = OutletPins {
        rail,
        indicator,
        reset_button,
    };
    let mut controller =
        OutletController::new(runtime, radio, EspSystem, WatchdogClock::default(), pins);
    let reason = controller.run();
    Err(anyhow!(
        "controller stopped after restart request ({})",
        reason.as_str()
    ))
}

/// `ESP_ERR_INVALID_STATE`: already initialized, or task already subscribed.
fn watchdog_ok(rc: esp_idf_sys::esp_err_t) -> bool {
    rc == esp_idf_sys::ESP_OK || rc == esp_idf_sys::ESP_ERR_INVALID_STATE
}

fn init_watchdog(timeout_sec: u32) -> anyhow::Result<()> {
    let config = esp_idf_sys::esp_task_wdt_config_t {
        timeout_ms: timeout_sec.saturating_mul(1000),
        idle_core_mask: 0,
        trigger_panic: true,
    };
    let rc = unsafe { esp_idf_sys::esp_task_wdt_init(&config) };
    if watchdog_ok(rc) {
        return Ok(());
    }
    Err(anyhow!("task watchdog init failed: esp_err_t={rc}"))
}

fn add_current_task_to_watchdog() -> anyhow::Result<()> {
    let rc = unsafe { esp_idf_sys::esp_task_wdt_add(core::ptr::null_mut()) };
    if watchdog_ok(rc) {
        return Ok(());
    }
    Err(anyhow!("outlet task not subscribed to watchdog: esp_err_t={rc}"))
}

fn feed_watchdog() {
    static FEED_FAILURE_LOGGED: AtomicBool = AtomicBool::new(false);

    let rc = unsafe { esp_idf_sys::esp_task_wdt_reset() };
    if rc != esp_idf_sys::ESP_OK && !FEED_FAILURE_LOGGED.swap(true, Ordering::Relaxed) {
        warn!("task watchdog feed rejected: esp_err_t={rc}");
    }
}
