use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn from_high(high: bool) -> Self {
        if high {
            Self::High
        } else {
            Self::Low
        }
    }

    pub fn is_high(self) -> bool {
        self == Self::High
    }

    pub fn inverted(self) -> Self {
        match self {
            Self::Low => Self::High,
            Self::High => Self::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::High => "HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeviceRole {
    Router,
    EndDevice,
}

impl DeviceRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Router => "ROUTER",
            Self::EndDevice => "END_DEVICE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LightDeviceType {
    OnOff,
    Dimmable,
}

impl LightDeviceType {
    /// Home Automation device identifier advertised in the simple descriptor.
    pub fn device_id(self) -> u16 {
        match self {
            Self::OnOff => 0x0100,
            Self::Dimmable => 0x0101,
        }
    }
}

/// The two halves of the switching square wave, named after the rail level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwitchPhase {
    RailLow,
    RailHigh,
}

impl SwitchPhase {
    pub fn rail_level(self) -> Level {
        match self {
            Self::RailLow => Level::Low,
            Self::RailHigh => Level::High,
        }
    }

    /// The indicator always mirrors the rail inverted while switching.
    pub fn indicator_level(self) -> Level {
        self.rail_level().inverted()
    }

    pub fn status_line(self) -> StatusLine {
        // Labels are kept exactly as the deployed firmware prints them.
        match self {
            Self::RailLow => StatusLine::PortOff,
            Self::RailHigh => StatusLine::PortOn,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::RailLow => Self::RailHigh,
            Self::RailHigh => Self::RailLow,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RailLow => "RAIL_LOW",
            Self::RailHigh => "RAIL_HIGH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutletMode {
    Starting,
    Joining,
    Switching,
    CheckingReset,
    Restarting,
}

impl OutletMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "STARTING",
            Self::Joining => "JOINING",
            Self::Switching => "SWITCHING",
            Self::CheckingReset => "CHECKING_RESET",
            Self::Restarting => "RESTARTING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetGestureState {
    Idle,
    PressedDebouncing,
    HeldBlinking,
    ResetTriggered,
    ReleasedIdle,
}

impl ResetGestureState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::PressedDebouncing => "PRESSED_DEBOUNCING",
            Self::HeldBlinking => "HELD_BLINKING",
            Self::ResetTriggered => "RESET_TRIGGERED",
            Self::ReleasedIdle => "RELEASED_IDLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestartReason {
    RadioStartFailed,
    FactoryReset,
}

impl RestartReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RadioStartFailed => "RADIO_START_FAILED",
            Self::FactoryReset => "FACTORY_RESET",
        }
    }
}

/// Fixed serial console lines, printed verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLine {
    Initialized,
    InitialStateOff,
    RadioStartFailed,
    Rebooting,
    Connecting,
    PortOff,
    PortOn,
    ResetHeld,
    SystemReset,
    ResettingNetwork,
    ResetComplete,
}

impl StatusLine {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "USB & LED Power Controller Initialized",
            Self::InitialStateOff => "Initial state: USB Port & LED OFF",
            Self::RadioStartFailed => "Zigbee failed to start!",
            Self::Rebooting => "Rebooting...",
            Self::Connecting => "Connecting Zigbee to network",
            Self::PortOff => "USB Port & LED OFF",
            Self::PortOn => "USB Port & LED ON",
            Self::ResetHeld => "Button held for 3+ seconds - performing full system reset",
            Self::SystemReset => "=== System Reset ===",
            Self::ResettingNetwork => "Resetting Zigbee network...",
            Self::ResetComplete => "System reset complete - device will restart",
        }
    }

    pub fn level(self) -> log::Level {
        match self {
            Self::RadioStartFailed => log::Level::Error,
            Self::Rebooting | Self::ResetHeld | Self::SystemReset => log::Level::Warn,
            _ => log::Level::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutletStatus {
    pub mode: &'static str,
    pub phase: Option<&'static str>,
    #[serde(rename = "railLevel")]
    pub rail_level: &'static str,
    #[serde(rename = "indicatorLevel")]
    pub indicator_level: &'static str,
    #[serde(rename = "resetGesture")]
    pub reset_gesture: &'static str,
    #[serde(rename = "networkConnected")]
    pub network_connected: bool,
    #[serde(rename = "phaseRemainingMs")]
    pub phase_remaining_ms: u64,
    #[serde(rename = "uptimeMs")]
    pub uptime_ms: u64,
}
