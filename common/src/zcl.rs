//! Zigbee Cluster Library identifiers used by the emulated light endpoint.

/// Home Automation application profile.
pub const HA_PROFILE_ID: u16 = 0x0104;

/// Mask selecting every 2.4 GHz channel (11 through 26).
pub const ALL_CHANNELS_MASK: u32 = 0x07FF_F800;

pub mod cluster {
    pub const BASIC: u16 = 0x0000;
    pub const IDENTIFY: u16 = 0x0003;
    pub const GROUPS: u16 = 0x0004;
    pub const SCENES: u16 = 0x0005;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
}

pub mod basic_attrs {
    pub const ZCL_VERSION: u16 = 0x0000;
    pub const POWER_SOURCE: u16 = 0x0007;
    pub const MANUFACTURER_NAME: u16 = 0x0004;
    pub const MODEL_IDENTIFIER: u16 = 0x0005;
    pub const SW_BUILD_ID: u16 = 0x4000;

    pub const ZCL_VERSION_DEFAULT: u8 = 0x08;
    pub const POWER_SOURCE_MAINS_SINGLE_PHASE: u8 = 0x01;
}

pub mod on_off_attrs {
    pub const ON_OFF: u16 = 0x0000;
    pub const GLOBAL_SCENE_CONTROL: u16 = 0x4000;
    pub const ON_TIME: u16 = 0x4001;
}

/// Server clusters a dimmable light exposes, in registration order.
pub const DIMMABLE_LIGHT_SERVER_CLUSTERS: [u16; 6] = [
    cluster::BASIC,
    cluster::IDENTIFY,
    cluster::GROUPS,
    cluster::SCENES,
    cluster::ON_OFF,
    cluster::LEVEL_CONTROL,
];

/// Server clusters of a plain on/off light.
pub const ON_OFF_LIGHT_SERVER_CLUSTERS: [u16; 5] = [
    cluster::BASIC,
    cluster::IDENTIFY,
    cluster::GROUPS,
    cluster::SCENES,
    cluster::ON_OFF,
];

/// Encodes `value` as a ZCL character string (length octet followed by the
/// bytes). Input longer than 254 bytes is truncated.
pub fn char_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let len = bytes.len().min(254);
    let mut encoded = Vec::with_capacity(len + 1);
    encoded.push(len as u8);
    encoded.extend_from_slice(&bytes[..len]);
    encoded
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_string_is_length_prefixed() {
        assert_eq!(char_string("nkey"), vec![4, b'n', b'k', b'e', b'y']);
        assert_eq!(char_string(""), vec![0]);
    }

    #[test]
    fn char_string_truncates_oversized_values() {
        let long = "x".repeat(300);
        let encoded = char_string(&long);
        assert_eq!(encoded[0], 254);
        assert_eq!(encoded.len(), 255);
    }

    #[test]
    fn channel_mask_covers_channels_11_to_26() {
        let channels: Vec<u32> = (0..32).filter(|bit| ALL_CHANNELS_MASK & (1 << bit) != 0).collect();
        assert_eq!(channels, (11..=26).collect::<Vec<u32>>());
    }
}
