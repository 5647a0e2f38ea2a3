//! Seams between the outlet logic and the platform it runs on.

use std::{
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    config::{EndpointIdentity, NetworkKey},
    types::{DeviceRole, RestartReason},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RadioError {
    #[error("radio platform configuration failed: esp_err_t={0}")]
    Platform(i32),
    #[error("endpoint {endpoint} could not be registered: {reason}")]
    Endpoint { endpoint: u8, reason: &'static str },
    #[error("radio stack failed to start: esp_err_t={0}")]
    Start(i32),
    #[error("radio stack did not report a start result within {waited_ms} ms")]
    StartTimeout { waited_ms: u64 },
}

/// The vendor Zigbee stack, seen from the outlet.
pub trait MeshRadio {
    fn set_distributed_network_key(&mut self, key: &NetworkKey);

    fn enable_joining_to_distributed(&mut self, enabled: bool);

    /// Queues the endpoint for registration at `start`. Construction faults
    /// are reported by `start`.
    fn register_endpoint(&mut self, endpoint: &EndpointIdentity);

    /// Blocks until the stack reports that it is running.
    fn start(&mut self, role: DeviceRole) -> Result<(), RadioError>;

    fn is_connected(&self) -> bool;

    /// Leaves and forgets the current network, then returns. The settle delay
    /// and the restart belong to the caller.
    fn factory_reset(&mut self);
}

pub trait SystemControl {
    /// Reboots the device. Hardware implementations never return.
    fn restart(&mut self, reason: RestartReason);
}

pub trait Clock {
    fn now_ms(&self) -> u64;

    fn sleep_ms(&mut self, duration_ms: u64);
}

/// Monotonic wall clock backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        static START: OnceLock<Instant> = OnceLock::new();
        START
            .get_or_init(Instant::now)
            .elapsed()
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }

    fn sleep_ms(&mut self, duration_ms: u64) {
        if duration_ms > 0 {
            thread::sleep(Duration::from_millis(duration_ms));
        }
    }
}
