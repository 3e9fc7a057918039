//! Threshold configuration for spike detection

use super::event::Direction;
use crate::error::AnalysisError;
use crate::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Entry thresholds and relax offsets for both directions, in °C
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeThresholds {
    /// Minimum rise above baseline that opens an UP spike
    pub up_threshold: f64,
    /// Hysteresis offset; an UP spike closes once the rise falls below `up_threshold - up_relax`
    pub up_relax: f64,
    /// Minimum drop below baseline that opens a DOWN spike
    pub down_threshold: f64,
    /// Hysteresis offset for DOWN spikes
    pub down_relax: f64,
}

impl Default for SpikeThresholds {
    fn default() -> Self {
        Self {
            up_threshold: 0.5,
            up_relax: 0.2,
            down_threshold: 0.5,
            down_relax: 0.2,
        }
    }
}

impl SpikeThresholds {
    /// Create thresholds with validation
    pub fn new(up_threshold: f64, up_relax: f64, down_threshold: f64, down_relax: f64) -> Result<Self> {
        let thresholds = Self {
            up_threshold,
            up_relax,
            down_threshold,
            down_relax,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Check that both directions form a usable hysteresis band
    pub fn validate(&self) -> Result<()> {
        for direction in [Direction::Up, Direction::Down] {
            let (threshold, relax) = self.band(direction);
            let name = direction.name();

            if !threshold.is_finite() || threshold <= 0.0 {
                return Err(AnalysisError::InvalidConfiguration(format!(
                    "{}_threshold must be a positive number, got {}",
                    name, threshold
                )));
            }
            if !relax.is_finite() || relax < 0.0 {
                return Err(AnalysisError::InvalidConfiguration(format!(
                    "{}_relax must be zero or positive, got {}",
                    name, relax
                )));
            }
            if relax >= threshold {
                return Err(AnalysisError::InvalidConfiguration(format!(
                    "{}_relax ({}) must be smaller than {}_threshold ({})",
                    name, relax, name, threshold
                )));
            }
        }
        Ok(())
    }

    /// Entry threshold and relax offset for one direction
    pub fn band(&self, direction: Direction) -> (f64, f64) {
        match direction {
            Direction::Up => (self.up_threshold, self.up_relax),
            Direction::Down => (self.down_threshold, self.down_relax),
        }
    }

    /// Departure from baseline below which an open spike is considered over
    pub fn exit_level(&self, direction: Direction) -> f64 {
        let (threshold, relax) = self.band(direction);
        threshold - relax
    }
}

/// Full spike detection configuration
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeConfig {
    /// Thresholds for the top-level pass
    #[serde(flatten)]
    pub thresholds: SpikeThresholds,
    /// Thresholds for inner spike passes; `None` reuses `thresholds`
    pub inner: Option<SpikeThresholds>,
    /// Largest allowed gap between consecutive samples, in seconds
    pub max_gap_secs: Option<u64>,
}

impl SpikeConfig {
    pub fn new(thresholds: SpikeThresholds) -> Self {
        Self {
            thresholds,
            inner: None,
            max_gap_secs: None,
        }
    }

    pub fn with_inner(mut self, inner: SpikeThresholds) -> Self {
        self.inner = Some(inner);
        self
    }

    pub fn with_max_gap(mut self, max_gap: Duration) -> Self {
        self.max_gap_secs = Some(max_gap.num_seconds().max(0) as u64);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()?;
        if let Some(inner) = &self.inner {
            inner.validate()?;
        }
        if self.max_gap_secs == Some(0) {
            return Err(AnalysisError::InvalidConfiguration(
                "max_gap_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn inner_thresholds(&self) -> &SpikeThresholds {
        self.inner.as_ref().unwrap_or(&self.thresholds)
    }

    pub fn max_gap(&self) -> Option<Duration> {
        self.max_gap_secs.map(|secs| Duration::seconds(secs as i64))
    }
}
