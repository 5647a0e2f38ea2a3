//! Desktop simulator: the real controller loop driven by simulated pins, a
//! simulated button and a radio that joins after a configurable delay.

use std::{cell::Cell, convert::Infallible, path::Path, rc::Rc};

use anyhow::Context;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use tracing::{debug, info, warn};

use outlet_common::{
    Clock, DeviceRole, EndpointIdentity, MeshRadio, NetworkKey, OutletController, OutletMode,
    OutletPins, RadioError, RestartReason, RuntimeConfig, SwitchPhase, SystemClock,
    SystemControl,
};

const DEFAULT_JOIN_MS: u64 = 2_500;
const REJOIN_MS: u64 = 300;
const DEFAULT_MAX_BOOTS: u32 = 3;

type HostController = OutletController<SimRadio, SimSystem, SystemClock, SimPin, SimPin, SimButton>;

#[derive(Debug, Clone)]
struct SimSettings {
    join_after_ms: u64,
    fail_start: bool,
    press_at_ms: Option<u64>,
    press_hold_ms: u64,
    max_boots: u32,
}

impl SimSettings {
    fn from_env() -> Self {
        Self {
            join_after_ms: env_parse("OUTLET_SIM_JOIN_MS").unwrap_or(DEFAULT_JOIN_MS),
            fail_start: env_parse::<u8>("OUTLET_SIM_FAIL_START").is_some_and(|flag| flag != 0),
            press_at_ms: env_parse("OUTLET_SIM_PRESS_AT_MS"),
            press_hold_ms: env_parse("OUTLET_SIM_PRESS_HOLD_MS").unwrap_or(0),
            max_boots: env_parse("OUTLET_SIM_MAX_BOOTS")
                .unwrap_or(DEFAULT_MAX_BOOTS)
                .max(1),
        }
    }
}

/// Network membership survives simulated reboots the way it survives in the
/// radio's NVRAM, until a factory reset clears it.
type Membership = Rc<Cell<bool>>;

struct SimRadio {
    clock: SystemClock,
    settings: SimSettings,
    membership: Membership,
    started_at_ms: Option<u64>,
    key: Option<NetworkKey>,
    joining_to_distributed: bool,
}

impl SimRadio {
    fn new(settings: SimSettings, membership: Membership) -> Self {
        Self {
            clock: SystemClock,
            settings,
            membership,
            started_at_ms: None,
            key: None,
            joining_to_distributed: false,
        }
    }

    fn join_delay_ms(&self) -> u64 {
        if self.membership.get() {
            REJOIN_MS
        } else {
            self.settings.join_after_ms
        }
    }
}

impl MeshRadio for SimRadio {
    fn set_distributed_network_key(&mut self, key: &NetworkKey) {
        self.key = Some(*key);
    }

    fn enable_joining_to_distributed(&mut self, enabled: bool) {
        self.joining_to_distributed = enabled;
    }

    fn register_endpoint(&mut self, endpoint: &EndpointIdentity) {
        info!(
            endpoint = endpoint.endpoint,
            device_id = endpoint.device_type.device_id(),
            model = %endpoint.model,
            "registered simulated light endpoint"
        );
    }

    fn start(&mut self, role: DeviceRole) -> Result<(), RadioError> {
        if self.settings.fail_start {
            return Err(RadioError::Start(-1));
        }
        info!(
            role = role.as_str(),
            distributed = self.joining_to_distributed,
            key_set = self.key.is_some(),
            rejoin = self.membership.get(),
            "simulated radio started"
        );
        self.started_at_ms = Some(self.clock.now_ms());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let Some(started_at_ms) = self.started_at_ms else {
            return false;
        };
        let connected = self.clock.now_ms().saturating_sub(started_at_ms) >= self.join_delay_ms();
        if connected && !self.membership.get() {
            info!("simulated radio joined a network");
            self.membership.set(true);
        }
        connected
    }

    fn factory_reset(&mut self) {
        self.membership.set(false);
        self.started_at_ms = None;
        warn!("simulated radio forgot its network");
    }
}

struct SimSystem;

impl SystemControl for SimSystem {
    fn restart(&mut self, reason: RestartReason) {
        warn!(reason = reason.as_str(), "restart requested");
    }
}

struct SimPin {
    name: &'static str,
    high: bool,
}

impl SimPin {
    fn new(name: &'static str) -> Self {
        Self { name, high: false }
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.high {
            debug!(pin = self.name, level = "low", "gpio edge");
        }
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if !self.high {
            debug!(pin = self.name, level = "high", "gpio edge");
        }
        self.high = true;
        Ok(())
    }
}

/// Active-low button held down during a fixed window of process uptime.
struct SimButton {
    clock: SystemClock,
    window: Option<(u64, u64)>,
}

impl SimButton {
    fn new(settings: &SimSettings) -> Self {
        let window = settings
            .press_at_ms
            .filter(|_| settings.press_hold_ms > 0)
            .map(|start| (start, start.saturating_add(settings.press_hold_ms)));
        Self {
            clock: SystemClock,
            window,
        }
    }

    fn pressed(&self) -> bool {
        let now_ms = self.clock.now_ms();
        self.window
            .is_some_and(|(start, end)| now_ms >= start && now_ms < end)
    }
}

impl ErrorType for SimButton {
    type Error = Infallible;
}

impl InputPin for SimButton {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.pressed())
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(self.pressed())
    }
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let runtime = load_runtime_config()?;
    let settings = SimSettings::from_env();
    let membership = Membership::default();

    info!(
        rail_pin = runtime.pins.rail_pin,
        indicator_pin = runtime.pins.indicator_pin,
        reset_button_pin = runtime.pins.reset_button_pin,
        switch_interval_ms = runtime.timing.switch_interval_ms,
        serial_baud = runtime.serial_baud,
        "starting outlet simulator"
    );

    for boot in 1..=settings.max_boots {
        info!(boot, "simulated power-on");
        let pins = OutletPins {
            rail: SimPin::new("rail"),
            indicator: SimPin::new("indicator"),
            reset_button: SimButton::new(&settings),
        };
        let radio = SimRadio::new(settings.clone(), membership.clone());
        let mut controller =
            OutletController::new(runtime.clone(), radio, SimSystem, SystemClock, pins);
        let reason = run_with_status(&mut controller);
        info!(boot, reason = reason.as_str(), "simulated device rebooting");
    }

    warn!(
        max_boots = settings.max_boots,
        "simulator stopped after reaching its reboot limit"
    );
    Ok(())
}

fn load_runtime_config() -> anyhow::Result<RuntimeConfig> {
    let mut runtime = match std::env::var("OUTLET_CONFIG") {
        Ok(path) => read_runtime_config(Path::new(&path))?,
        Err(_) => RuntimeConfig::default(),
    };

    if let Ok(hex) = std::env::var("OUTLET_NETWORK_KEY") {
        runtime.network.distributed_key =
            NetworkKey::from_hex(&hex).context("OUTLET_NETWORK_KEY is not a valid network key")?;
    }
    runtime.sanitize();
    Ok(runtime)
}

fn read_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    let payload = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    RuntimeConfig::from_json(&payload)
        .with_context(|| format!("failed to parse {}", path.display()))
}

/// Same loop as `OutletController::run`, plus a status snapshot whenever the
/// mode or switching phase changes.
fn run_with_status(controller: &mut HostController) -> RestartReason {
    let mut last = observed_state(controller);
    log_status(controller);

    let mut outcome = controller.setup();
    loop {
        let current = observed_state(controller);
        if current != last {
            log_status(controller);
            last = current;
        }
        if let Some(reason) = outcome {
            return reason;
        }
        controller.sleep_until_next_tick();
        outcome = controller.step();
    }
}

fn observed_state(controller: &HostController) -> (OutletMode, Option<SwitchPhase>) {
    let engine = controller.engine();
    (engine.mode(), engine.phase())
}

fn log_status(controller: &HostController) {
    match serde_json::to_string(&controller.status()) {
        Ok(json) => info!(status = %json, "outlet status"),
        Err(err) => warn!("failed to encode outlet status: {err}"),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.trim().parse().ok())
}
