use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

pub const DEFAULT_STORAGE_KEY: &str = "patientTrackerData";

/// Length-of-stay thresholds, in minutes, at which a patient moves into the next
/// urgency band.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StayBandThresholds {
    pub elevated_minutes: u64,
    pub high_minutes: u64,
    pub critical_minutes: u64,
}

impl Default for StayBandThresholds {
    fn default() -> Self {
        Self {
            elevated_minutes: 120,
            high_minutes: 240,
            critical_minutes: 300,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub storage_key: String,
    pub timer_poll_interval_secs: u64,
    pub stay_refresh_interval_secs: u64,
    pub stay_bands: StayBandThresholds,
    pub persist_failure_warn_threshold: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            timer_poll_interval_secs: 30,
            stay_refresh_interval_secs: 60,
            stay_bands: StayBandThresholds::default(),
            persist_failure_warn_threshold: 3,
        }
    }
}

impl TrackerConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        let config: Self = serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("invalid tracker configuration: {error}"),
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.storage_key.trim().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "storage_key must not be empty",
            ));
        }
        let bands = &self.stay_bands;
        if !(bands.elevated_minutes <= bands.high_minutes
            && bands.high_minutes <= bands.critical_minutes)
        {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!(
                    "stay band thresholds must be ascending, got {}/{}/{}",
                    bands.elevated_minutes, bands.high_minutes, bands.critical_minutes
                ),
            ));
        }
        Ok(())
    }

    pub fn timer_poll_interval(&self) -> Duration {
        Duration::from_secs(self.timer_poll_interval_secs.max(1))
    }

    pub fn stay_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.stay_refresh_interval_secs.max(1))
    }
}
