use serde::{Deserialize, Serialize};

use super::{celsius_to_raw, require_celsius};
use crate::{Feature, FeatureStatus, ParameterList, Result};

const COOLING_IDX: u8 = 0x20;
const HEATING_IDX: u8 = 0x21;

/// Lowest set point accepted from users, in °C
pub const MIN_SET_POINT: i16 = 0;
/// Highest set point accepted from users, in °C
pub const MAX_SET_POINT: i16 = 30;

/// Bring a requested set point into the accepted range
pub fn clamp_set_point(celsius: i16) -> i16 {
    celsius.clamp(MIN_SET_POINT, MAX_SET_POINT)
}

/// Target temperatures in whole degrees Celsius.
///
/// The device clamps values outside its own range; values that do not fit
/// the wire encoding at all are rejected when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SetPointStatus {
    pub cooling_set_point: i16,
    pub heating_set_point: i16,
}

impl SetPointStatus {
    pub fn new(cooling_set_point: i16, heating_set_point: i16) -> Self {
        Self {
            cooling_set_point,
            heating_set_point,
        }
    }
}

impl FeatureStatus for SetPointStatus {
    const FEATURE: Feature = Feature {
        name: "set_point",
        query_command: Some(64),
        update_command: Some(16448),
    };

    fn parameter_values(&self) -> Result<ParameterList> {
        Ok(ParameterList::new()
            .with(COOLING_IDX, celsius_to_raw(COOLING_IDX, self.cooling_set_point)?.to_vec())
            .with(HEATING_IDX, celsius_to_raw(HEATING_IDX, self.heating_set_point)?.to_vec()))
    }

    fn apply_parameter_values(&mut self, values: &ParameterList) -> Result<()> {
        self.cooling_set_point = require_celsius(values, COOLING_IDX)?;
        self.heating_set_point = require_celsius(values, HEATING_IDX)?;
        Ok(())
    }
}
