//! GATT layout of the thermostat
//!
//! The protocol runs over one vendor service with a notify characteristic for
//! responses and a write characteristic for requests. Device metadata is read
//! from the standard Device Information service.

use uuid::Uuid;

/// Vendor service carrying the protocol
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x2141e110_213a_11e6_b67b_9e71128cae77);

/// Characteristic the device notifies response chunks on
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x2141e111_213a_11e6_b67b_9e71128cae77);

/// Characteristic request chunks are written to
pub const WRITE_CHAR_UUID: Uuid = Uuid::from_u128(0x2141e112_213a_11e6_b67b_9e71128cae77);

/// Bluetooth SIG Device Information service
pub const DEVICE_INFORMATION_UUID: Uuid = sig_uuid(0x180a);

const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

/// Expand a 16-bit SIG assigned number into a full UUID
pub const fn sig_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

const SIG_CHARACTERISTICS: &[(u16, &str)] = &[
    (0x2a00, "Device Name"),
    (0x2a01, "Appearance"),
    (0x2a04, "Peripheral Preferred Connection Parameters"),
    (0x2a23, "System ID"),
    (0x2a24, "Model Number String"),
    (0x2a25, "Serial Number String"),
    (0x2a26, "Firmware Revision String"),
    (0x2a27, "Hardware Revision String"),
    (0x2a28, "Software Revision String"),
    (0x2a29, "Manufacturer Name String"),
    (0x2a2a, "IEEE 11073-20601 Regulatory Certification Data List"),
    (0x2a50, "PnP ID"),
];

/// Human readable name of a standard characteristic
pub fn characteristic_name(uuid: &Uuid) -> Option<&'static str> {
    SIG_CHARACTERISTICS
        .iter()
        .find(|(short, _)| sig_uuid(*short) == *uuid)
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sig_uuid() {
        assert_eq!(
            DEVICE_INFORMATION_UUID.to_string(),
            "0000180a-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_vendor_uuids() {
        assert_eq!(
            NOTIFY_CHAR_UUID.to_string(),
            "2141e111-213a-11e6-b67b-9e71128cae77"
        );
        assert_eq!(
            WRITE_CHAR_UUID.to_string(),
            "2141e112-213a-11e6-b67b-9e71128cae77"
        );
    }

    #[test]
    fn test_characteristic_name() {
        assert_eq!(characteristic_name(&sig_uuid(0x2a23)), Some("System ID"));
        assert_eq!(
            characteristic_name(&sig_uuid(0x2a26)),
            Some("Firmware Revision String")
        );
        assert_eq!(characteristic_name(&NOTIFY_CHAR_UUID), None);
    }
}
