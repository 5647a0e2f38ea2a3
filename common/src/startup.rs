//! One-shot hand-off of the radio stack's start result from the stack's
//! callback thread to the thread blocked in `MeshRadio::start`.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::ports::{Clock, RadioError};

const PENDING: i32 = i32::MIN;
const STATUS_OK: i32 = 0;

#[derive(Debug)]
pub struct StartLatch {
    status: AtomicI32,
}

impl Default for StartLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl StartLatch {
    pub const fn new() -> Self {
        Self {
            status: AtomicI32::new(PENDING),
        }
    }

    /// Re-arms the latch before a new start attempt.
    pub fn clear(&self) {
        self.status.store(PENDING, Ordering::Release);
    }

    /// Records the first reported `esp_err_t`. Later reports are ignored and
    /// return `false`.
    pub fn report(&self, status: i32) -> bool {
        self.status
            .compare_exchange(PENDING, status, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn result(&self) -> Option<i32> {
        match self.status.load(Ordering::Acquire) {
            PENDING => None,
            status => Some(status),
        }
    }

    /// Blocks on `clock` until a result is reported or `timeout_ms` passes.
    pub fn wait<C: Clock>(
        &self,
        clock: &mut C,
        timeout_ms: u64,
        poll_ms: u64,
    ) -> Result<(), RadioError> {
        let started_ms = clock.now_ms();
        loop {
            match self.result() {
                Some(STATUS_OK) => return Ok(()),
                Some(status) => return Err(RadioError::Start(status)),
                None => {}
            }
            let waited_ms = clock.now_ms().saturating_sub(started_ms);
            if waited_ms >= timeout_ms {
                return Err(RadioError::StartTimeout { waited_ms });
            }
            clock.sleep_ms(poll_ms.max(1).min(timeout_ms - waited_ms));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ports::SystemClock;

    /// Simulated clock that delivers a stack report once `at_ms` is reached.
    struct ReportingClock<'a> {
        now_ms: u64,
        latch: &'a StartLatch,
        report: Option<(u64, i32)>,
    }

    impl Clock for ReportingClock<'_> {
        fn now_ms(&self) -> u64 {
            self.now_ms
        }

        fn sleep_ms(&mut self, duration_ms: u64) {
            self.now_ms += duration_ms;
            if let Some((at_ms, status)) = self.report {
                if self.now_ms >= at_ms {
                    self.latch.report(status);
                    self.report = None;
                }
            }
        }
    }

    fn clock(latch: &StartLatch, report: Option<(u64, i32)>) -> ReportingClock<'_> {
        ReportingClock {
            now_ms: 0,
            latch,
            report,
        }
    }

    #[test]
    fn successful_start_unblocks_waiter() {
        let latch = StartLatch::new();
        let mut clock = clock(&latch, Some((1_230, 0)));

        assert_eq!(latch.wait(&mut clock, 15_000, 50), Ok(()));
        assert_eq!(clock.now_ms, 1_250);
    }

    #[test]
    fn failed_start_is_reported_as_start_error() {
        let latch = StartLatch::new();
        let mut clock = clock(&latch, Some((400, -1)));

        assert_eq!(
            latch.wait(&mut clock, 15_000, 50),
            Err(RadioError::Start(-1))
        );
    }

    #[test]
    fn missing_report_times_out() {
        let latch = StartLatch::new();
        let mut clock = clock(&latch, None);

        assert_eq!(
            latch.wait(&mut clock, 1_000, 300),
            Err(RadioError::StartTimeout { waited_ms: 1_000 })
        );
        assert_eq!(clock.now_ms, 1_000);
    }

    #[test]
    fn only_first_report_counts_until_cleared() {
        let latch = StartLatch::new();
        assert!(latch.report(-1));
        assert!(!latch.report(0));
        assert_eq!(latch.result(), Some(-1));

        latch.clear();
        assert_eq!(latch.result(), None);
        assert!(latch.report(0));
        assert_eq!(latch.result(), Some(0));
    }

    #[test]
    fn report_from_another_thread_is_observed() {
        let latch = Arc::new(StartLatch::new());
        let reporter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                latch.report(0);
            })
        };

        assert_eq!(latch.wait(&mut SystemClock, 5_000, 5), Ok(()));
        reporter.join().expect("reporter thread panicked");
    }
}
