use serde::{Deserialize, Serialize};

use super::{celsius_to_raw, raw_to_celsius};
use crate::{Error, Feature, FeatureStatus, ParameterList, Result};

const INDOOR_IDX: u8 = 0x40;
const OUTDOOR_IDX: u8 = 0x41;

/// Outdoor reading reported when no outdoor sensor is available
const UNAVAILABLE: u8 = 0xFF;

/// Indoor and outdoor temperatures measured by the device, in °C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TemperaturesStatus {
    pub indoor: i16,
    pub outdoor: Option<i16>,
}

impl TemperaturesStatus {
    pub fn new(indoor: i16, outdoor: Option<i16>) -> Self {
        Self { indoor, outdoor }
    }
}

/// Responses carry whole degrees in one byte; the two-byte form is the
/// scaled encoding used in requests.
fn decode_reading(id: u8, value: &[u8]) -> Result<Option<i16>> {
    match value {
        [UNAVAILABLE] => Ok(None),
        [whole] => Ok(Some(*whole as i16)),
        [hi, lo] => Ok(Some(raw_to_celsius(i16::from_be_bytes([*hi, *lo])))),
        _ => Err(Error::InvalidValue {
            id,
            reason: format!("unexpected temperature width {}", value.len()),
        }),
    }
}

impl FeatureStatus for TemperaturesStatus {
    const FEATURE: Feature = Feature {
        name: "temperatures",
        query_command: Some(272),
        update_command: None,
    };

    fn parameter_values(&self) -> Result<ParameterList> {
        let indoor = celsius_to_raw(INDOOR_IDX, self.indoor)?;
        let mut values = ParameterList::new().with(INDOOR_IDX, indoor.to_vec());
        if let Some(outdoor) = self.outdoor {
            values.insert(OUTDOOR_IDX, celsius_to_raw(OUTDOOR_IDX, outdoor)?.to_vec());
        }
        Ok(values)
    }

    fn apply_parameter_values(&mut self, values: &ParameterList) -> Result<()> {
        self.indoor = decode_reading(INDOOR_IDX, values.require(INDOOR_IDX)?)?.ok_or_else(|| {
            Error::InvalidValue {
                id: INDOOR_IDX,
                reason: "indoor temperature unavailable".to_string(),
            }
        })?;
        self.outdoor = match values.get(OUTDOOR_IDX) {
            Some(value) => decode_reading(OUTDOOR_IDX, value)?,
            None => None,
        };
        Ok(())
    }
}
