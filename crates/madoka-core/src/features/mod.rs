//! Concrete feature statuses of the thermostat

mod clean_filter;
mod fan_speed;
mod operation_mode;
mod power;
mod set_point;
mod temperatures;

pub use clean_filter::{CleanFilterIndicatorStatus, ResetCleanFilterTimerStatus};
pub use fan_speed::{FanSpeed, FanSpeedStatus};
pub use operation_mode::{OperationMode, OperationModeStatus};
pub use power::PowerStateStatus;
pub use set_point::{clamp_set_point, SetPointStatus, MAX_SET_POINT, MIN_SET_POINT};
pub use temperatures::TemperaturesStatus;

use crate::{Error, ParameterList, Result};

/// Device scale for temperatures: 1/128 °C per unit
pub const CELSIUS_SCALE: f64 = 128.0;

/// Encode whole degrees as the two-byte device value.
///
/// Only -256..=255 °C fit the signed 16-bit device range.
pub(crate) fn celsius_to_raw(id: u8, celsius: i16) -> Result<[u8; 2]> {
    let raw = i32::from(celsius) * CELSIUS_SCALE as i32;
    i16::try_from(raw)
        .map(i16::to_be_bytes)
        .map_err(|_| Error::InvalidValue {
            id,
            reason: format!("{} °C is outside the device temperature range", celsius),
        })
}

/// Decode a two's complement device value, rounding to whole degrees
pub(crate) fn raw_to_celsius(raw: i16) -> i16 {
    (raw as f64 / CELSIUS_SCALE).round() as i16
}

/// Read a two-byte scaled temperature
pub(crate) fn require_celsius(values: &ParameterList, id: u8) -> Result<i16> {
    let value = values.require(id)?;
    if value.len() != 2 {
        return Err(Error::InvalidValue {
            id,
            reason: format!("expected 2 bytes, got {}", value.len()),
        });
    }
    Ok(raw_to_celsius(i16::from_be_bytes([value[0], value[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_scaling() {
        assert_eq!(celsius_to_raw(0x20, 20).unwrap(), [0x0a, 0x00]);
        assert_eq!(celsius_to_raw(0x20, 27).unwrap(), [0x0d, 0x80]);
        assert_eq!(raw_to_celsius(0x0d80), 27);
        // 27.4 rounds down, 27.5 rounds up
        assert_eq!(raw_to_celsius(3507), 27);
        assert_eq!(raw_to_celsius(3520), 28);
        assert_eq!(celsius_to_raw(0x20, -5).unwrap(), [0xfd, 0x80]);
        assert_eq!(raw_to_celsius(i16::from_be_bytes([0xfd, 0x80])), -5);
    }

    #[test]
    fn test_celsius_out_of_device_range() {
        assert_eq!(celsius_to_raw(0x20, 255).unwrap(), [0x7f, 0x80]);
        assert_eq!(celsius_to_raw(0x21, -256).unwrap(), [0x80, 0x00]);
        assert!(matches!(
            celsius_to_raw(0x20, 300),
            Err(Error::InvalidValue { id: 0x20, .. })
        ));
        assert!(celsius_to_raw(0x21, 256).is_err());
        assert!(celsius_to_raw(0x21, -257).is_err());
    }
}
