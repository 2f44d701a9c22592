use serde::{Deserialize, Serialize};

use crate::{Feature, FeatureStatus, ParameterList, Result};

const DATA_IDX: u8 = 0x20;

/// Whether the HVAC unit is turned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PowerStateStatus {
    pub turn_on: bool,
}

impl PowerStateStatus {
    pub fn new(turn_on: bool) -> Self {
        Self { turn_on }
    }
}

impl FeatureStatus for PowerStateStatus {
    const FEATURE: Feature = Feature {
        name: "power_state",
        query_command: Some(32),
        update_command: Some(16416),
    };

    fn parameter_values(&self) -> Result<ParameterList> {
        Ok(ParameterList::new().with(DATA_IDX, vec![self.turn_on as u8]))
    }

    fn apply_parameter_values(&mut self, values: &ParameterList) -> Result<()> {
        self.turn_on = values.require_u8(DATA_IDX)? == 0x01;
        Ok(())
    }
}
