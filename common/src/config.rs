use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    types::{DeviceRole, LightDeviceType},
    zcl,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("network key must be 32 hex digits, got {0}")]
    KeyLength(usize),
    #[error("network key contains non-hex character `{0}`")]
    KeyDigit(char),
    #[error("invalid runtime config json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct OutletTiming {
    pub switch_interval_ms: u64,
    pub join_blink_ms: u64,
    pub hold_blink_ms: u64,
    pub debounce_ms: u64,
    pub reset_hold_ms: u64,
    pub reset_settle_ms: u64,
    pub hold_poll_ms: u64,
}

impl Default for OutletTiming {
    fn default() -> Self {
        Self {
            switch_interval_ms: 10_000,
            join_blink_ms: 100,
            hold_blink_ms: 100,
            debounce_ms: 100,
            reset_hold_ms: 3_000,
            reset_settle_ms: 500,
            hold_poll_ms: 10,
        }
    }
}

impl OutletTiming {
    pub fn sanitize(&mut self) {
        self.switch_interval_ms = self.switch_interval_ms.max(1);
        self.join_blink_ms = self.join_blink_ms.max(1);
        self.hold_blink_ms = self.hold_blink_ms.max(1);
        self.hold_poll_ms = self.hold_poll_ms.max(1);
        self.reset_hold_ms = self.reset_hold_ms.max(1);
    }
}

/// GPIO assignment for the XIAO ESP32-C6 carrier: D10 drives the MOSFET
/// gate, GPIO15 is the built-in LED and GPIO9 the BOOT button.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PinConfig {
    pub rail_pin: i32,
    pub indicator_pin: i32,
    pub reset_button_pin: i32,
}

impl Default for PinConfig {
    fn default() -> Self {
        Self {
            rail_pin: 18,
            indicator_pin: 15,
            reset_button_pin: 9,
        }
    }
}

impl PinConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.rail_pin < 0 {
            self.rail_pin = defaults.rail_pin;
        }
        if self.indicator_pin < 0 {
            self.indicator_pin = defaults.indicator_pin;
        }
        if self.reset_button_pin < 0 {
            self.reset_button_pin = defaults.reset_button_pin;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkKey(pub [u8; 16]);

impl NetworkKey {
    /// Distributed security key shared with the Hue bridge mesh.
    pub const HUE_DISTRIBUTED: Self = Self([
        0x81, 0x45, 0x86, 0x86, 0x5D, 0xC6, 0xC8, 0xB1, 0xC8, 0xCB, 0xC4, 0x2E, 0x5D, 0x65, 0xD3,
        0xB9,
    ]);

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn from_hex(input: &str) -> Result<Self, ConfigError> {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let mut digits = Vec::with_capacity(32);
        for ch in trimmed.chars() {
            if ch.is_whitespace() || ch == ':' || ch == '-' {
                continue;
            }
            let value = ch.to_digit(16).ok_or(ConfigError::KeyDigit(ch))?;
            digits.push(value as u8);
        }

        if digits.len() != 32 {
            return Err(ConfigError::KeyLength(digits.len()));
        }

        let mut key = [0_u8; 16];
        for (byte, pair) in key.iter_mut().zip(digits.chunks_exact(2)) {
            *byte = (pair[0] << 4) | pair[1];
        }
        Ok(Self(key))
    }
}

impl Default for NetworkKey {
    fn default() -> Self {
        Self::HUE_DISTRIBUTED
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NetworkConfig {
    pub distributed_key: NetworkKey,
    pub role: DeviceRole,
    pub join_distributed: bool,
    pub channel_mask: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            distributed_key: NetworkKey::default(),
            role: DeviceRole::Router,
            join_distributed: true,
            channel_mask: zcl::ALL_CHANNELS_MASK,
        }
    }
}

impl NetworkConfig {
    pub fn sanitize(&mut self) {
        if self.channel_mask & zcl::ALL_CHANNELS_MASK == 0 {
            self.channel_mask = zcl::ALL_CHANNELS_MASK;
        }
    }
}

/// On-network identity of the emulated light. Controllers pair against these
/// exact values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EndpointIdentity {
    pub endpoint: u8,
    pub device_type: LightDeviceType,
    pub manufacturer: String,
    pub model: String,
    pub sw_build: String,
    pub on_off_on_time: u16,
    pub global_scene_control: bool,
}

impl Default for EndpointIdentity {
    fn default() -> Self {
        Self {
            endpoint: 10,
            device_type: LightDeviceType::Dimmable,
            manufacturer: "nkey".to_string(),
            model: "powerOutlet".to_string(),
            sw_build: "0.0.1".to_string(),
            on_off_on_time: 0,
            global_scene_control: false,
        }
    }
}

impl EndpointIdentity {
    pub fn server_clusters(&self) -> &'static [u16] {
        match self.device_type {
            LightDeviceType::Dimmable => &zcl::DIMMABLE_LIGHT_SERVER_CLUSTERS,
            LightDeviceType::OnOff => &zcl::ON_OFF_LIGHT_SERVER_CLUSTERS,
        }
    }

    /// Basic cluster string attributes as ZCL character strings.
    pub fn basic_string_attributes(&self) -> [(u16, Vec<u8>); 3] {
        [
            (
                zcl::basic_attrs::MANUFACTURER_NAME,
                zcl::char_string(&self.manufacturer),
            ),
            (
                zcl::basic_attrs::MODEL_IDENTIFIER,
                zcl::char_string(&self.model),
            ),
            (zcl::basic_attrs::SW_BUILD_ID, zcl::char_string(&self.sw_build)),
        ]
    }

    pub fn sanitize(&mut self) {
        // Endpoint 0 is the ZDO and 241+ are reserved.
        if self.endpoint == 0 || self.endpoint > 240 {
            self.endpoint = Self::default().endpoint;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub timing: OutletTiming,
    #[serde(default)]
    pub pins: PinConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub endpoint: EndpointIdentity,
    #[serde(default = "default_serial_baud")]
    pub serial_baud: u32,
}

fn default_serial_baud() -> u32 {
    115_200
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            timing: OutletTiming::default(),
            pins: PinConfig::default(),
            network: NetworkConfig::default(),
            endpoint: EndpointIdentity::default(),
            serial_baud: default_serial_baud(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_json(payload: &str) -> Result<Self, ConfigError> {
        let mut runtime: Self = serde_json::from_str(payload)?;
        runtime.sanitize();
        Ok(runtime)
    }

    pub fn sanitize(&mut self) {
        self.timing.sanitize();
        self.pins.sanitize();
        self.network.sanitize();
        self.endpoint.sanitize();
        if self.serial_baud == 0 {
            self.serial_baud = default_serial_baud();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_match_deployed_identity() {
        let runtime = RuntimeConfig::default();

        assert_eq!(runtime.endpoint.endpoint, 10);
        assert_eq!(runtime.endpoint.device_type, LightDeviceType::Dimmable);
        assert_eq!(runtime.endpoint.manufacturer, "nkey");
        assert_eq!(runtime.endpoint.model, "powerOutlet");
        assert_eq!(runtime.endpoint.sw_build, "0.0.1");
        assert_eq!(runtime.endpoint.on_off_on_time, 0);
        assert!(!runtime.endpoint.global_scene_control);
        assert_eq!(runtime.network.role, DeviceRole::Router);
        assert!(runtime.network.join_distributed);
        assert_eq!(runtime.serial_baud, 115_200);
    }

    #[test]
    fn default_timing_matches_firmware_constants() {
        let timing = OutletTiming::default();

        assert_eq!(timing.switch_interval_ms, 10_000);
        assert_eq!(timing.join_blink_ms, 100);
        assert_eq!(timing.hold_blink_ms, 100);
        assert_eq!(timing.debounce_ms, 100);
        assert_eq!(timing.reset_hold_ms, 3_000);
        assert_eq!(timing.reset_settle_ms, 500);
        assert_eq!(timing.hold_poll_ms, 10);
    }

    #[test]
    fn parses_hue_key_from_hex() {
        let key = NetworkKey::from_hex("81:45:86:86:5D:C6:C8:B1 C8CB C42E 5D65 D3B9").unwrap();
        assert_eq!(key, NetworkKey::HUE_DISTRIBUTED);

        let prefixed = NetworkKey::from_hex("0x814586865dc6c8b1c8cbc42e5d65d3b9").unwrap();
        assert_eq!(prefixed, NetworkKey::HUE_DISTRIBUTED);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            NetworkKey::from_hex("8145"),
            Err(ConfigError::KeyLength(4))
        ));
        assert!(matches!(
            NetworkKey::from_hex("zz4586865dc6c8b1c8cbc42e5d65d3b9"),
            Err(ConfigError::KeyDigit('z'))
        ));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let runtime =
            RuntimeConfig::from_json(r#"{"timing":{"switch_interval_ms":500,"join_blink_ms":0}}"#)
                .unwrap();

        assert_eq!(runtime.timing.switch_interval_ms, 500);
        assert_eq!(runtime.timing.join_blink_ms, 1);
        assert_eq!(runtime.timing.reset_hold_ms, 3_000);
        assert_eq!(runtime.pins, PinConfig::default());
        assert_eq!(runtime.endpoint, EndpointIdentity::default());
        assert_eq!(runtime.network.distributed_key, NetworkKey::HUE_DISTRIBUTED);
    }

    #[test]
    fn network_key_serializes_as_byte_array() {
        let json = serde_json::to_string(&NetworkKey::HUE_DISTRIBUTED).unwrap();
        assert!(json.starts_with("[129,69,134,134"));
    }

    #[test]
    fn sanitize_restores_reserved_endpoint_and_pins() {
        let mut runtime = RuntimeConfig::default();
        runtime.endpoint.endpoint = 0;
        runtime.pins.rail_pin = -1;
        runtime.network.channel_mask = 0x0000_07FF;
        runtime.sanitize();

        assert_eq!(runtime.endpoint.endpoint, 10);
        assert_eq!(runtime.pins.rail_pin, 18);
        assert_eq!(runtime.network.channel_mask, zcl::ALL_CHANNELS_MASK);
    }

    #[test]
    fn dimmable_identity_exposes_level_control() {
        let identity = EndpointIdentity::default();
        assert!(identity
            .server_clusters()
            .contains(&zcl::cluster::LEVEL_CONTROL));

        let attrs = identity.basic_string_attributes();
        assert_eq!(attrs[0].0, zcl::basic_attrs::MANUFACTURER_NAME);
        assert_eq!(attrs[1].1, zcl::char_string("powerOutlet"));
        assert_eq!(attrs[2].1, vec![5, b'0', b'.', b'0', b'.', b'1']);
    }
}
