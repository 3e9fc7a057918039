//! Top-level analysis configuration

use crate::error::AnalysisError;
use crate::spectral::{FilterMode, SpectralConfig};
use crate::spikes::SpikeConfig;
use crate::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Every parameter of a full analysis run
///
/// Missing fields take their defaults when read from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub spikes: SpikeConfig,
    pub filter_mode: FilterMode,
    pub spectral: SpectralConfig,
    /// Largest timestamp difference between matched samples of two locations
    pub stratification_tolerance_secs: i64,
    /// Location pairs compared by `stratify_configured_pairs`
    pub location_pairs: Vec<(String, String)>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            spikes: SpikeConfig::default(),
            filter_mode: FilterMode::None,
            spectral: SpectralConfig::default(),
            stratification_tolerance_secs: 60,
            location_pairs: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        self.spikes.validate()?;
        self.spectral.validate()?;
        self.stratification_tolerance()?;
        Ok(())
    }

    /// Matching tolerance as a duration
    ///
    /// Negative values and values beyond the range of `Duration` are rejected.
    pub fn stratification_tolerance(&self) -> Result<Duration> {
        let secs = self.stratification_tolerance_secs;
        if secs < 0 {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "stratification_tolerance_secs must not be negative, got {}",
                secs
            )));
        }
        Duration::try_seconds(secs).ok_or_else(|| {
            AnalysisError::InvalidConfiguration(format!(
                "stratification_tolerance_secs out of range, got {}",
                secs
            ))
        })
    }

    /// Parse and validate a JSON configuration document
    pub fn from_json(text: &str) -> Result<Self> {
        let config: AnalysisConfig = serde_json::from_str(text)
            .map_err(|e| AnalysisError::InvalidConfiguration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Io(format!("{}: {}", path.display(), e)))?;
        let config = Self::from_json(&text)?;
        log::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
