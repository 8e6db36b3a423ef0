//! Per-door and engine-wide settings.

use core::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("open time limit must be a positive number of seconds, got {0}")]
    TimeLimit(f64),
    #[error("alarm growth multiplier must be at least 1.0, got {0}")]
    GrowthMultiplier(f64),
    #[error("alarm growth additive must not be negative, got {0}")]
    GrowthAdditive(f64),
    #[error("settle delay must be a non-negative number of seconds, got {0}")]
    SettleDelay(f64),
    #[error("at least one settle attempt is required")]
    SettleAttempts,
}

/// Open-alarm settings of a single door.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DoorSettings {
    /// Baseline dwell time in seconds before the first alarm
    time_limit: f64,
    /// Factor the alarm threshold is multiplied with after each alarm
    growth_multiplier: f64,
    /// Seconds added to the alarm threshold after each alarm
    growth_additive: f64,
}

impl DoorSettings {
    pub fn new(
        time_limit: f64,
        growth_multiplier: f64,
        growth_additive: f64,
    ) -> Result<Self, SettingsError> {
        if !(time_limit.is_finite() && time_limit > 0.0) {
            return Err(SettingsError::TimeLimit(time_limit));
        }
        if !(growth_multiplier.is_finite() && growth_multiplier >= 1.0) {
            return Err(SettingsError::GrowthMultiplier(growth_multiplier));
        }
        if !(growth_additive.is_finite() && growth_additive >= 0.0) {
            return Err(SettingsError::GrowthAdditive(growth_additive));
        }
        Ok(Self {
            time_limit,
            growth_multiplier,
            growth_additive,
        })
    }

    pub fn time_limit(&self) -> f64 {
        self.time_limit
    }

    pub fn growth_multiplier(&self) -> f64 {
        self.growth_multiplier
    }

    pub fn growth_additive(&self) -> f64 {
        self.growth_additive
    }

    /// The threshold that follows `threshold` after an alarm fired.
    pub fn grow(&self, threshold: f64) -> f64 {
        threshold * self.growth_multiplier + self.growth_additive
    }
}

/// Settings shared by all doors.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EngineSettings {
    settle_delay: Duration,
    max_settle_attempts: u8,
}

impl EngineSettings {
    /// `settle_delay_secs` is the pause before re-sampling a door that has
    /// no sensor asserted.
    pub fn new(settle_delay_secs: f64, max_settle_attempts: u8) -> Result<Self, SettingsError> {
        let settle_delay = Duration::try_from_secs_f64(settle_delay_secs)
            .map_err(|_| SettingsError::SettleDelay(settle_delay_secs))?;
        if max_settle_attempts == 0 {
            return Err(SettingsError::SettleAttempts);
        }
        Ok(Self {
            settle_delay,
            max_settle_attempts,
        })
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub(crate) fn settle_delay_ms(&self) -> u32 {
        u32::try_from(self.settle_delay.as_millis()).unwrap_or(u32::MAX)
    }

    pub fn max_settle_attempts(&self) -> u8 {
        self.max_settle_attempts
    }

    /// Longest time a single evaluation can block, saturating at
    /// `Duration::MAX`.
    pub fn worst_case_settle(&self) -> Duration {
        self.settle_delay
            .saturating_mul(u32::from(self.max_settle_attempts))
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            max_settle_attempts: 1,
        }
    }
}
