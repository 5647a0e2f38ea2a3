//! Long-press factory reset gesture.
//!
//! Stepped from the main loop with the raw button reading (`pressed` is the
//! active-low pin read as low). The debounce delay trusts the first reading:
//! the level is not sampled again until the delay has elapsed. The hold
//! threshold is measured from the end of the debounce.

use crate::{blink::Blinker, config::OutletTiming, types::Level, types::ResetGestureState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureEvent {
    /// Indicator toggle while the button is held.
    Blink(Level),
    /// Button let go before the threshold.
    Released,
    /// Held past the threshold; the caller must factory reset.
    Triggered,
}

#[derive(Debug, Clone, Copy)]
enum GesturePhase {
    Idle,
    Debouncing { since_ms: u64 },
    Held { hold_start_ms: u64, blinker: Blinker },
    Triggered,
    Released,
}

#[derive(Debug, Clone)]
pub struct ResetGesture {
    debounce_ms: u64,
    hold_threshold_ms: u64,
    blink_interval_ms: u64,
    poll_interval_ms: u64,
    phase: GesturePhase,
}

impl ResetGesture {
    pub fn new(timing: &OutletTiming) -> Self {
        Self {
            debounce_ms: timing.debounce_ms,
            hold_threshold_ms: timing.reset_hold_ms,
            blink_interval_ms: timing.hold_blink_ms,
            poll_interval_ms: timing.hold_poll_ms,
            phase: GesturePhase::Idle,
        }
    }

    pub fn state(&self) -> ResetGestureState {
        match self.phase {
            GesturePhase::Idle => ResetGestureState::Idle,
            GesturePhase::Debouncing { .. } => ResetGestureState::PressedDebouncing,
            GesturePhase::Held { .. } => ResetGestureState::HeldBlinking,
            GesturePhase::Triggered => ResetGestureState::ResetTriggered,
            GesturePhase::Released => ResetGestureState::ReleasedIdle,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.phase,
            GesturePhase::Debouncing { .. } | GesturePhase::Held { .. }
        )
    }

    /// Returns to idle after a release. A triggered gesture stays terminal.
    pub fn rearm(&mut self) {
        if !matches!(self.phase, GesturePhase::Triggered) {
            self.phase = GesturePhase::Idle;
        }
    }

    pub fn poll(&mut self, now_ms: u64, pressed: bool) -> Option<GestureEvent> {
        match self.phase {
            GesturePhase::Idle | GesturePhase::Released => {
                if pressed {
                    self.phase = GesturePhase::Debouncing { since_ms: now_ms };
                }
                None
            }
            GesturePhase::Debouncing { since_ms } => {
                if now_ms.saturating_sub(since_ms) < self.debounce_ms {
                    return None;
                }
                self.phase = GesturePhase::Held {
                    hold_start_ms: now_ms,
                    blinker: Blinker::new(self.blink_interval_ms, now_ms, Level::Low),
                };
                self.poll_held(now_ms, pressed)
            }
            GesturePhase::Held { .. } => self.poll_held(now_ms, pressed),
            GesturePhase::Triggered => None,
        }
    }

    /// Milliseconds until the gesture next needs a poll.
    pub fn next_wake_in_ms(&self, now_ms: u64) -> u64 {
        match self.phase {
            GesturePhase::Debouncing { since_ms } => self
                .debounce_ms
                .saturating_sub(now_ms.saturating_sub(since_ms)),
            GesturePhase::Held { .. } => self.poll_interval_ms,
            GesturePhase::Idle | GesturePhase::Released | GesturePhase::Triggered => 0,
        }
    }

    fn poll_held(&mut self, now_ms: u64, pressed: bool) -> Option<GestureEvent> {
        let GesturePhase::Held {
            hold_start_ms,
            mut blinker,
        } = self.phase
        else {
            return None;
        };

        if !pressed {
            self.phase = GesturePhase::Released;
            return Some(GestureEvent::Released);
        }

        let blink = blinker.poll(now_ms);
        self.phase = GesturePhase::Held {
            hold_start_ms,
            blinker,
        };

        if now_ms.saturating_sub(hold_start_ms) > self.hold_threshold_ms {
            self.phase = GesturePhase::Triggered;
            return Some(GestureEvent::Triggered);
        }

        blink.map(GestureEvent::Blink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gesture() -> ResetGesture {
        ResetGesture::new(&OutletTiming::default())
    }

    /// Polls at the held-loop cadence from `start_ms` while `pressed(t)`
    /// holds, collecting every event until the gesture settles.
    fn drive(
        gesture: &mut ResetGesture,
        start_ms: u64,
        pressed: impl Fn(u64) -> bool,
    ) -> Vec<(u64, GestureEvent)> {
        let mut events = Vec::new();
        let mut now = start_ms;
        if let Some(event) = gesture.poll(now, pressed(now)) {
            events.push((now, event));
        }
        while gesture.is_active() {
            now += gesture.next_wake_in_ms(now);
            if let Some(event) = gesture.poll(now, pressed(now)) {
                events.push((now, event));
            }
        }
        events
    }

    #[test]
    fn idle_when_button_not_pressed() {
        let mut gesture = gesture();
        assert_eq!(gesture.poll(0, false), None);
        assert_eq!(gesture.state(), ResetGestureState::Idle);
    }

    #[test]
    fn press_enters_debounce_without_resampling() {
        let mut gesture = gesture();
        assert_eq!(gesture.poll(1_000, true), None);
        assert_eq!(gesture.state(), ResetGestureState::PressedDebouncing);

        // Released mid-debounce is not observed until the delay elapses.
        assert_eq!(gesture.poll(1_050, false), None);
        assert_eq!(gesture.state(), ResetGestureState::PressedDebouncing);
        assert_eq!(gesture.next_wake_in_ms(1_050), 50);

        assert_eq!(gesture.poll(1_100, false), Some(GestureEvent::Released));
        assert_eq!(gesture.state(), ResetGestureState::ReleasedIdle);
    }

    #[test]
    fn hold_of_3500ms_triggers_once() {
        let mut gesture = gesture();
        let events = drive(&mut gesture, 0, |t| t < 3_500);

        let triggers: Vec<_> = events
            .iter()
            .filter(|(_, event)| *event == GestureEvent::Triggered)
            .collect();
        assert_eq!(triggers.len(), 1);
        // Debounce ends at 100, threshold is strictly exceeded at 3_110.
        assert_eq!(triggers[0].0, 3_110);
        assert_eq!(gesture.state(), ResetGestureState::ResetTriggered);

        assert_eq!(gesture.poll(5_000, true), None);
        gesture.rearm();
        assert_eq!(gesture.state(), ResetGestureState::ResetTriggered);
    }

    #[test]
    fn hold_of_1500ms_releases_without_reset() {
        let mut gesture = gesture();
        let events = drive(&mut gesture, 0, |t| t < 1_500);

        assert!(!events.iter().any(|(_, e)| *e == GestureEvent::Triggered));
        assert_eq!(events.last(), Some(&(1_500, GestureEvent::Released)));
        assert_eq!(gesture.state(), ResetGestureState::ReleasedIdle);

        gesture.rearm();
        assert_eq!(gesture.state(), ResetGestureState::Idle);
    }

    #[test]
    fn hold_at_exact_threshold_does_not_trigger() {
        let mut gesture = gesture();
        // Held until 3_100 exactly: 3_000 ms after debounce, not beyond it.
        let events = drive(&mut gesture, 0, |t| t <= 3_100);

        assert!(!events.iter().any(|(_, e)| *e == GestureEvent::Triggered));
        assert_eq!(events.last(), Some(&(3_110, GestureEvent::Released)));
    }

    #[test]
    fn indicator_blinks_every_100ms_while_held() {
        let mut gesture = gesture();
        let events = drive(&mut gesture, 0, |t| t < 650);

        let blinks: Vec<_> = events
            .iter()
            .filter_map(|(t, e)| match e {
                GestureEvent::Blink(level) => Some((*t, *level)),
                _ => None,
            })
            .collect();

        assert_eq!(
            blinks,
            vec![
                (200, Level::High),
                (300, Level::Low),
                (400, Level::High),
                (500, Level::Low),
                (600, Level::High),
            ]
        );
    }
}
