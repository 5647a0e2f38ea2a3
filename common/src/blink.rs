use crate::types::Level;

/// Square-wave toggler polled from a monotonic millisecond clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blinker {
    interval_ms: u64,
    last_toggle_ms: u64,
    level: Level,
}

impl Blinker {
    pub fn new(interval_ms: u64, now_ms: u64, level: Level) -> Self {
        Self {
            interval_ms: interval_ms.max(1),
            last_toggle_ms: now_ms,
            level,
        }
    }

    pub fn level(&self) -> Level {
        self.level
    }

    /// Toggles once the interval has elapsed and returns the new level.
    pub fn poll(&mut self, now_ms: u64) -> Option<Level> {
        if now_ms.saturating_sub(self.last_toggle_ms) < self.interval_ms {
            return None;
        }
        self.level = self.level.inverted();
        self.last_toggle_ms = now_ms;
        Some(self.level)
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(self.last_toggle_ms);
        self.interval_ms.saturating_sub(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_on_each_elapsed_interval() {
        let mut blinker = Blinker::new(100, 0, Level::Low);

        assert_eq!(blinker.poll(50), None);
        assert_eq!(blinker.poll(100), Some(Level::High));
        assert_eq!(blinker.poll(150), None);
        assert_eq!(blinker.poll(200), Some(Level::Low));
        assert_eq!(blinker.level(), Level::Low);
    }

    #[test]
    fn late_poll_rebases_on_poll_time() {
        let mut blinker = Blinker::new(100, 0, Level::Low);

        assert_eq!(blinker.poll(130), Some(Level::High));
        assert_eq!(blinker.remaining_ms(130), 100);
        assert_eq!(blinker.poll(229), None);
        assert_eq!(blinker.poll(230), Some(Level::Low));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let mut blinker = Blinker::new(0, 10, Level::High);
        assert_eq!(blinker.poll(10), None);
        assert_eq!(blinker.poll(11), Some(Level::Low));
    }
}
