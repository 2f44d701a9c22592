use serde::{Deserialize, Serialize};

use crate::{Feature, FeatureStatus, ParameterList, Result};

const CLEAN_FILTER_IDX: u8 = 0x62;
const TIMER_RESET_IDX: u8 = 0xFE;

/// Whether the "clean filter" indicator is lit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CleanFilterIndicatorStatus {
    pub clean_filter_indicator: bool,
}

impl CleanFilterIndicatorStatus {
    pub fn new(clean_filter_indicator: bool) -> Self {
        Self {
            clean_filter_indicator,
        }
    }
}

impl FeatureStatus for CleanFilterIndicatorStatus {
    const FEATURE: Feature = Feature {
        name: "clean_filter_indicator",
        query_command: Some(256),
        update_command: None,
    };

    fn parameter_values(&self) -> Result<ParameterList> {
        Ok(ParameterList::new().with(CLEAN_FILTER_IDX, vec![self.clean_filter_indicator as u8]))
    }

    fn apply_parameter_values(&mut self, values: &ParameterList) -> Result<()> {
        self.clean_filter_indicator = values.require_u8(CLEAN_FILTER_IDX)? & 0x01 == 0x01;
        Ok(())
    }
}

/// Request body that resets the filter timer; carries no state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResetCleanFilterTimerStatus;

impl FeatureStatus for ResetCleanFilterTimerStatus {
    const FEATURE: Feature = Feature {
        name: "reset_clean_filter_timer",
        query_command: None,
        update_command: Some(16928),
    };

    fn parameter_values(&self) -> Result<ParameterList> {
        Ok(ParameterList::new().with(TIMER_RESET_IDX, vec![0x01]))
    }

    fn apply_parameter_values(&mut self, _values: &ParameterList) -> Result<()> {
        Ok(())
    }
}
