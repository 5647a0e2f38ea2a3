//! Blocking outlet controller: owns the pins, radio and clock, and executes
//! what the [`OutletEngine`] asks for.

use embedded_hal::digital::{InputPin, OutputPin, PinState};
use log::{log, warn};

use crate::{
    config::RuntimeConfig,
    outlet::{OutletAction, OutletEngine, OutletInputs},
    ports::{Clock, MeshRadio, SystemControl},
    types::{Level, OutletStatus, RestartReason},
};

pub struct OutletPins<Rail, Led, Btn> {
    pub rail: Rail,
    pub indicator: Led,
    /// Active-low, pulled up.
    pub reset_button: Btn,
}

pub struct OutletController<R, S, C, Rail, Led, Btn> {
    runtime: RuntimeConfig,
    engine: OutletEngine,
    radio: R,
    system: S,
    clock: C,
    pins: OutletPins<Rail, Led, Btn>,
}

impl<R, S, C, Rail, Led, Btn> OutletController<R, S, C, Rail, Led, Btn>
where
    R: MeshRadio,
    S: SystemControl,
    C: Clock,
    Rail: OutputPin,
    Led: OutputPin,
    Btn: InputPin,
{
    pub fn new(
        mut runtime: RuntimeConfig,
        radio: R,
        system: S,
        clock: C,
        pins: OutletPins<Rail, Led, Btn>,
    ) -> Self {
        runtime.sanitize();
        let engine = OutletEngine::new(runtime.timing.clone());
        Self {
            runtime,
            engine,
            radio,
            system,
            clock,
            pins,
        }
    }

    pub fn engine(&self) -> &OutletEngine {
        &self.engine
    }

    pub fn radio(&self) -> &R {
        &self.radio
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn status(&self) -> OutletStatus {
        self.engine
            .status(self.clock.now_ms(), self.radio.is_connected())
    }

    /// Runs setup then the control loop. Returns only when a restart was
    /// requested and the platform's `restart` came back.
    pub fn run(&mut self) -> RestartReason {
        if let Some(reason) = self.setup() {
            return reason;
        }
        loop {
            if let Some(reason) = self.step() {
                return reason;
            }
            self.sleep_until_next_tick();
        }
    }

    /// Drives outputs off, configures the radio and starts it.
    pub fn setup(&mut self) -> Option<RestartReason> {
        let now_ms = self.clock.now_ms();
        let actions = self.engine.power_on(now_ms);
        if let Some(reason) = self.execute(actions) {
            return Some(reason);
        }

        let network = &self.runtime.network;
        self.radio
            .enable_joining_to_distributed(network.join_distributed);
        self.radio
            .set_distributed_network_key(&network.distributed_key);
        self.radio.register_endpoint(&self.runtime.endpoint);

        let actions = match self.radio.start(network.role) {
            Ok(()) => self.engine.begin_join(self.clock.now_ms()),
            Err(err) => {
                warn!("radio start error: {err}");
                self.engine.radio_start_failed()
            }
        };
        self.execute(actions)
    }

    /// One engine tick with freshly sampled inputs.
    pub fn step(&mut self) -> Option<RestartReason> {
        let inputs = OutletInputs {
            network_connected: self.radio.is_connected(),
            reset_pressed: self.read_reset_button(),
        };
        let now_ms = self.clock.now_ms();
        let actions = self.engine.tick(now_ms, inputs);
        self.execute(actions)
    }

    pub fn sleep_until_next_tick(&mut self) {
        let wait_ms = self.engine.next_wake_in_ms(self.clock.now_ms());
        self.clock.sleep_ms(wait_ms);
    }

    fn execute(&mut self, actions: Vec<OutletAction>) -> Option<RestartReason> {
        for action in actions {
            match action {
                OutletAction::SetRail(level) => {
                    if let Err(err) = self.pins.rail.set_state(pin_state(level)) {
                        warn!("failed to drive rail {}: {err:?}", level.as_str());
                    }
                }
                OutletAction::SetIndicator(level) => {
                    if let Err(err) = self.pins.indicator.set_state(pin_state(level)) {
                        warn!("failed to drive indicator {}: {err:?}", level.as_str());
                    }
                }
                OutletAction::Log(line) => log!(line.level(), "{}", line.as_str()),
                OutletAction::FactoryReset => self.radio.factory_reset(),
                OutletAction::Delay(ms) => self.clock.sleep_ms(ms),
                OutletAction::Restart(reason) => {
                    self.system.restart(reason);
                    return Some(reason);
                }
            }
        }
        None
    }

    fn read_reset_button(&mut self) -> bool {
        match self.pins.reset_button.is_low() {
            Ok(pressed) => pressed,
            Err(err) => {
                warn!("failed to read reset button: {err:?}");
                false
            }
        }
    }
}

fn pin_state(level: Level) -> PinState {
    PinState::from(level.is_high())
}
