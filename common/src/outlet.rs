use crate::{
    blink::Blinker,
    config::OutletTiming,
    reset::{GestureEvent, ResetGesture},
    types::{
        Level, OutletMode, OutletStatus, ResetGestureState, RestartReason, StatusLine,
        SwitchPhase,
    },
};

#[derive(Debug, Clone, PartialEq)]
pub enum OutletAction {
    SetRail(Level),
    SetIndicator(Level),
    Log(StatusLine),
    FactoryReset,
    Delay(u64),
    Restart(RestartReason),
}

/// Readings sampled by the device layer before each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutletInputs {
    pub network_connected: bool,
    pub reset_pressed: bool,
}

#[derive(Debug, Clone, Copy)]
enum EngineState {
    Starting,
    Joining { blinker: Blinker },
    Switching { phase: SwitchPhase, since_ms: u64 },
    CheckingReset,
    Restarting,
}

#[derive(Debug, Clone)]
pub struct OutletEngine {
    pub timing: OutletTiming,
    state: EngineState,
    gesture: ResetGesture,

    rail: Level,
    indicator: Level,

    boot_ms: u64,
    completed_cycles: u64,
}

impl OutletEngine {
    pub fn new(mut timing: OutletTiming) -> Self {
        timing.sanitize();
        let gesture = ResetGesture::new(&timing);
        Self {
            timing,
            state: EngineState::Starting,
            gesture,
            rail: Level::Low,
            indicator: Level::Low,
            boot_ms: 0,
            completed_cycles: 0,
        }
    }

    pub fn mode(&self) -> OutletMode {
        match self.state {
            EngineState::Starting => OutletMode::Starting,
            EngineState::Joining { .. } => OutletMode::Joining,
            EngineState::Switching { .. } => OutletMode::Switching,
            EngineState::CheckingReset => OutletMode::CheckingReset,
            EngineState::Restarting => OutletMode::Restarting,
        }
    }

    pub fn phase(&self) -> Option<SwitchPhase> {
        match self.state {
            EngineState::Switching { phase, .. } => Some(phase),
            _ => None,
        }
    }

    pub fn gesture_state(&self) -> ResetGestureState {
        self.gesture.state()
    }

    pub fn rail_level(&self) -> Level {
        self.rail
    }

    pub fn indicator_level(&self) -> Level {
        self.indicator
    }

    /// Number of full rail-low/rail-high cycles completed since boot.
    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles
    }

    /// Drives both outputs to their inactive level.
    pub fn power_on(&mut self, now_ms: u64) -> Vec<OutletAction> {
        self.boot_ms = now_ms;
        self.state = EngineState::Starting;

        let mut actions = vec![OutletAction::Log(StatusLine::Initialized)];
        self.set_rail(Level::Low, &mut actions);
        self.set_indicator(Level::Low, &mut actions);
        actions.push(OutletAction::Log(StatusLine::InitialStateOff));
        actions
    }

    pub fn radio_start_failed(&mut self) -> Vec<OutletAction> {
        self.state = EngineState::Restarting;
        vec![
            OutletAction::Log(StatusLine::RadioStartFailed),
            OutletAction::Log(StatusLine::Rebooting),
            OutletAction::Restart(RestartReason::RadioStartFailed),
        ]
    }

    pub fn begin_join(&mut self, now_ms: u64) -> Vec<OutletAction> {
        let mut actions = vec![OutletAction::Log(StatusLine::Connecting)];
        self.set_indicator(Level::High, &mut actions);
        self.state = EngineState::Joining {
            blinker: Blinker::new(self.timing.join_blink_ms, now_ms, Level::High),
        };
        actions
    }

    pub fn tick(&mut self, now_ms: u64, inputs: OutletInputs) -> Vec<OutletAction> {
        let mut actions = Vec::new();

        match self.state {
            EngineState::Starting | EngineState::Restarting => {}
            EngineState::Joining { mut blinker } => {
                if inputs.network_connected {
                    self.enter_phase(SwitchPhase::RailLow, now_ms, &mut actions);
                } else {
                    if let Some(level) = blinker.poll(now_ms) {
                        self.set_indicator(level, &mut actions);
                    }
                    self.state = EngineState::Joining { blinker };
                }
            }
            EngineState::Switching { phase, since_ms } => {
                if now_ms.saturating_sub(since_ms) < self.timing.switch_interval_ms {
                    return actions;
                }
                match phase {
                    SwitchPhase::RailLow => {
                        self.enter_phase(SwitchPhase::RailHigh, now_ms, &mut actions);
                    }
                    SwitchPhase::RailHigh => {
                        self.completed_cycles = self.completed_cycles.saturating_add(1);
                        self.check_for_reset(now_ms, inputs.reset_pressed, &mut actions);
                    }
                }
            }
            EngineState::CheckingReset => {
                self.poll_gesture(now_ms, inputs.reset_pressed, &mut actions);
            }
        }

        actions
    }

    /// Milliseconds the device layer may sleep before the next tick.
    pub fn next_wake_in_ms(&self, now_ms: u64) -> u64 {
        match self.state {
            EngineState::Starting | EngineState::Restarting => 0,
            EngineState::Joining { blinker } => blinker.remaining_ms(now_ms),
            EngineState::Switching { since_ms, .. } => self
                .timing
                .switch_interval_ms
                .saturating_sub(now_ms.saturating_sub(since_ms)),
            EngineState::CheckingReset => self.gesture.next_wake_in_ms(now_ms),
        }
    }

    pub fn status(&self, now_ms: u64, network_connected: bool) -> OutletStatus {
        let phase_remaining_ms = match self.state {
            EngineState::Switching { .. } => self.next_wake_in_ms(now_ms),
            _ => 0,
        };
        OutletStatus {
            mode: self.mode().as_str(),
            phase: self.phase().map(SwitchPhase::as_str),
            rail_level: self.rail.as_str(),
            indicator_level: self.indicator.as_str(),
            reset_gesture: self.gesture.state().as_str(),
            network_connected,
            phase_remaining_ms,
            uptime_ms: now_ms.saturating_sub(self.boot_ms),
        }
    }

    fn check_for_reset(&mut self, now_ms: u64, pressed: bool, actions: &mut Vec<OutletAction>) {
        self.gesture.rearm();
        self.poll_gesture(now_ms, pressed, actions);
        if matches!(self.state, EngineState::Switching { .. }) && self.gesture.is_active() {
            self.state = EngineState::CheckingReset;
        }
    }

    fn poll_gesture(&mut self, now_ms: u64, pressed: bool, actions: &mut Vec<OutletAction>) {
        match self.gesture.poll(now_ms, pressed) {
            Some(GestureEvent::Blink(level)) => self.set_indicator(level, actions),
            Some(GestureEvent::Released) => {
                self.set_indicator(Level::Low, actions);
                self.gesture.rearm();
                self.enter_phase(SwitchPhase::RailLow, now_ms, actions);
            }
            Some(GestureEvent::Triggered) => self.factory_reset(actions),
            None if !self.gesture.is_active() => {
                self.enter_phase(SwitchPhase::RailLow, now_ms, actions);
            }
            None => {}
        }
    }

    fn factory_reset(&mut self, actions: &mut Vec<OutletAction>) {
        actions.push(OutletAction::Log(StatusLine::ResetHeld));
        self.set_indicator(Level::Low, actions);
        actions.push(OutletAction::Log(StatusLine::SystemReset));
        actions.push(OutletAction::Log(StatusLine::ResettingNetwork));
        actions.push(OutletAction::FactoryReset);
        actions.push(OutletAction::Log(StatusLine::ResetComplete));
        actions.push(OutletAction::Delay(self.timing.reset_settle_ms));
        actions.push(OutletAction::Restart(RestartReason::FactoryReset));
        self.state = EngineState::Restarting;
    }

    fn enter_phase(&mut self, phase: SwitchPhase, now_ms: u64, actions: &mut Vec<OutletAction>) {
        self.set_rail(phase.rail_level(), actions);
        self.set_indicator(phase.indicator_level(), actions);
        actions.push(OutletAction::Log(phase.status_line()));
        self.state = EngineState::Switching {
            phase,
            since_ms: now_ms,
        };
    }

    fn set_rail(&mut self, level: Level, actions: &mut Vec<OutletAction>) {
        self.rail = level;
        actions.push(OutletAction::SetRail(level));
    }

    fn set_indicator(&mut self, level: Level, actions: &mut Vec<OutletAction>) {
        self.indicator = level;
        actions.push(OutletAction::SetIndicator(level));
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const IDLE: OutletInputs = OutletInputs {
        network_connected: true,
        reset_pressed: false,
    };

    fn joined_engine() -> OutletEngine {
        let mut engine = OutletEngine::new(OutletTiming::default());
        engine.power_on(0);
        engine.begin_join(0);
        engine.tick(0, IDLE);
        engine
    }

    #[test]
    fn power_on_drives_outputs_low() {
        let mut engine = OutletEngine::new(OutletTiming::default());
        let actions = engine.power_on(0);

        assert_eq!(
            actions,
            vec![
                OutletAction::Log(StatusLine::Initialized),
                OutletAction::SetRail(Level::Low),
                OutletAction::SetIndicator(Level::Low),
                OutletAction::Log(StatusLine::InitialStateOff),
            ]
        );
        assert_eq!(engine.mode(), OutletMode::Starting);
    }

    #[test]
    fn radio_failure_restarts_without_joining() {
        let mut engine = OutletEngine::new(OutletTiming::default());
        engine.power_on(0);
        let actions = engine.radio_start_failed();

        assert_eq!(
            actions.last(),
            Some(&OutletAction::Restart(RestartReason::RadioStartFailed))
        );
        assert!(!actions.contains(&OutletAction::Log(StatusLine::Connecting)));
        assert_eq!(engine.mode(), OutletMode::Restarting);
        assert!(engine.tick(10_000, IDLE).is_empty());
    }

    #[test]
    fn join_blinks_until_connected() {
        let mut engine = OutletEngine::new(OutletTiming::default());
        engine.power_on(0);
        let start = engine.begin_join(0);
        assert_eq!(start.last(), Some(&OutletAction::SetIndicator(Level::High)));

        let searching = OutletInputs::default();
        let mut levels = Vec::new();
        let mut now = 0;
        for _ in 0..6 {
            now += engine.next_wake_in_ms(now);
            for action in engine.tick(now, searching) {
                if let OutletAction::SetIndicator(level) = action {
                    levels.push((now, level));
                }
            }
        }
        assert_eq!(
            levels,
            vec![
                (100, Level::Low),
                (200, Level::High),
                (300, Level::Low),
                (400, Level::High),
                (500, Level::Low),
                (600, Level::High),
            ]
        );
        assert_eq!(engine.mode(), OutletMode::Joining);

        let actions = engine.tick(650, IDLE);
        assert_eq!(engine.mode(), OutletMode::Switching);
        assert_eq!(engine.phase(), Some(SwitchPhase::RailLow));
        assert_eq!(
            actions,
            vec![
                OutletAction::SetRail(Level::Low),
                OutletAction::SetIndicator(Level::High),
                OutletAction::Log(StatusLine::PortOff),
            ]
        );
    }

    #[test]
    fn phases_alternate_on_interval_with_complementary_levels() {
        let mut engine = joined_engine();
        let mut now = 0;

        for _ in 0..8 {
            assert_eq!(engine.next_wake_in_ms(now), 10_000);
            assert!(engine.tick(now + 9_999, IDLE).is_empty());
            now += 10_000;

            let actions = engine.tick(now, IDLE);
            let rail = actions.iter().find_map(|a| match a {
                OutletAction::SetRail(level) => Some(*level),
                _ => None,
            });
            let indicator = actions.iter().find_map(|a| match a {
                OutletAction::SetIndicator(level) => Some(*level),
                _ => None,
            });

            let rail = rail.expect("every phase change drives the rail");
            assert_eq!(indicator, Some(rail.inverted()));
            assert_eq!(engine.rail_level().inverted(), engine.indicator_level());
        }
        assert_eq!(engine.completed_cycles(), 4);
    }

    #[test]
    fn phase_high_logs_port_on_label() {
        let mut engine = joined_engine();
        let actions = engine.tick(10_000, IDLE);

        assert_eq!(
            actions,
            vec![
                OutletAction::SetRail(Level::High),
                OutletAction::SetIndicator(Level::Low),
                OutletAction::Log(StatusLine::PortOn),
            ]
        );
    }

    #[test]
    fn reset_button_is_ignored_during_phases() {
        let mut engine = joined_engine();
        let pressed = OutletInputs {
            network_connected: true,
            reset_pressed: true,
        };

        let actions = engine.tick(10_000, pressed);
        assert_eq!(engine.phase(), Some(SwitchPhase::RailHigh));
        assert_eq!(engine.gesture_state(), ResetGestureState::Idle);
        assert_eq!(actions.len(), 3);
    }

    #[test]
    fn long_hold_after_cycle_factory_resets() {
        let mut engine = joined_engine();
        engine.tick(10_000, IDLE);

        let held = OutletInputs {
            network_connected: true,
            reset_pressed: true,
        };
        let mut now = 20_000;
        let mut all = engine.tick(now, held);
        assert_eq!(engine.mode(), OutletMode::CheckingReset);
        assert_eq!(engine.gesture_state(), ResetGestureState::PressedDebouncing);

        while engine.mode() == OutletMode::CheckingReset {
            now += engine.next_wake_in_ms(now);
            all.extend(engine.tick(now, held));
        }

        assert_eq!(engine.mode(), OutletMode::Restarting);
        assert_eq!(now, 23_110);
        assert!(!all.iter().any(|a| matches!(a, OutletAction::SetRail(_))));
        assert_eq!(
            all.iter()
                .filter(|a| **a == OutletAction::FactoryReset)
                .count(),
            1
        );

        let tail: Vec<_> = all.iter().rev().take(7).rev().cloned().collect();
        assert_eq!(
            tail,
            vec![
                OutletAction::SetIndicator(Level::Low),
                OutletAction::Log(StatusLine::SystemReset),
                OutletAction::Log(StatusLine::ResettingNetwork),
                OutletAction::FactoryReset,
                OutletAction::Log(StatusLine::ResetComplete),
                OutletAction::Delay(500),
                OutletAction::Restart(RestartReason::FactoryReset),
            ]
        );
    }

    #[test]
    fn short_hold_returns_to_switching_with_indicator_off_first() {
        let mut engine = joined_engine();
        engine.tick(10_000, IDLE);

        let held = OutletInputs {
            network_connected: true,
            reset_pressed: true,
        };
        let mut now = 20_000;
        let mut gesture_actions = engine.tick(now, held);
        while engine.mode() == OutletMode::CheckingReset {
            now += engine.next_wake_in_ms(now);
            let inputs = if now < 21_500 { held } else { IDLE };
            gesture_actions.extend(engine.tick(now, inputs));
        }

        assert_eq!(now, 21_500);
        assert!(!gesture_actions.contains(&OutletAction::FactoryReset));
        assert_eq!(engine.mode(), OutletMode::Switching);
        assert_eq!(engine.phase(), Some(SwitchPhase::RailLow));
        assert_eq!(engine.gesture_state(), ResetGestureState::Idle);

        let release = gesture_actions
            .iter()
            .position(|a| matches!(a, OutletAction::SetRail(_)))
            .expect("main loop resumes");
        assert_eq!(
            gesture_actions[release - 1],
            OutletAction::SetIndicator(Level::Low)
        );
        assert!(!gesture_actions[..release]
            .iter()
            .any(|a| matches!(a, OutletAction::SetRail(_))));
    }

    #[test]
    fn unpressed_button_resumes_cycle_immediately() {
        let mut engine = joined_engine();
        engine.tick(10_000, IDLE);

        let actions = engine.tick(20_000, IDLE);

        assert_eq!(engine.phase(), Some(SwitchPhase::RailLow));
        assert_eq!(actions[0], OutletAction::SetRail(Level::Low));
        assert_eq!(engine.next_wake_in_ms(20_000), 10_000);
    }

    #[test]
    fn status_reports_phase_and_uptime() {
        let mut engine = OutletEngine::new(OutletTiming::default());
        engine.power_on(1_000);
        engine.begin_join(1_000);
        engine.tick(1_200, IDLE);

        let status = engine.status(4_200, true);
        assert_eq!(status.mode, "SWITCHING");
        assert_eq!(status.phase, Some("RAIL_LOW"));
        assert_eq!(status.rail_level, "LOW");
        assert_eq!(status.indicator_level, "HIGH");
        assert_eq!(status.phase_remaining_ms, 7_000);
        assert_eq!(status.uptime_ms, 3_200);
    }
}
