pub mod blink;
pub mod config;
pub mod controller;
pub mod outlet;
pub mod ports;
pub mod reset;
pub mod startup;
pub mod types;
pub mod zcl;

pub use blink::Blinker;
pub use config::{
    ConfigError, EndpointIdentity, NetworkConfig, NetworkKey, OutletTiming, PinConfig,
    RuntimeConfig,
};
pub use controller::{OutletController, OutletPins};
pub use outlet::{OutletAction, OutletEngine, OutletInputs};
pub use ports::{Clock, MeshRadio, RadioError, SystemClock, SystemControl};
pub use reset::{GestureEvent, ResetGesture};
pub use startup::StartLatch;
pub use types::{
    DeviceRole, Level, LightDeviceType, OutletMode, OutletStatus, ResetGestureState,
    RestartReason, StatusLine, SwitchPhase,
};
