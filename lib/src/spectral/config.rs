//! Filter modes and spectral band parameters

use crate::error::AnalysisError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which periodic components the spectral filter removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    None,
    Diurnal,
    Seasonal,
    Both,
}

impl FilterMode {
    pub fn all() -> &'static [FilterMode] {
        &[
            FilterMode::None,
            FilterMode::Diurnal,
            FilterMode::Seasonal,
            FilterMode::Both,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            FilterMode::None => "none",
            FilterMode::Diurnal => "diurnal",
            FilterMode::Seasonal => "seasonal",
            FilterMode::Both => "both",
        }
    }

    pub fn removes_diurnal(&self) -> bool {
        matches!(self, FilterMode::Diurnal | FilterMode::Both)
    }

    pub fn removes_seasonal(&self) -> bool {
        matches!(self, FilterMode::Seasonal | FilterMode::Both)
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for FilterMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        FilterMode::all()
            .iter()
            .copied()
            .find(|mode| mode.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AnalysisError::InvalidConfiguration(format!(
                    "unknown filter mode '{}', expected none, diurnal, seasonal or both",
                    s
                ))
            })
    }
}

/// Band definitions for diurnal and seasonal removal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Harmonics removed on top of the 1 cycle/day fundamental
    pub diurnal_harmonics: usize,
    /// Half-width of each diurnal band, in cycles/day
    pub diurnal_tolerance_cpd: f64,
    /// Periods longer than this many days belong to the seasonal band
    pub seasonal_cutoff_days: f64,
    /// Resample irregular series onto a uniform grid instead of failing
    pub resample: bool,
    /// Largest relative deviation from the median interval still treated as uniform
    pub uniformity_tolerance: f64,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            diurnal_harmonics: 2,
            diurnal_tolerance_cpd: 0.1,
            seasonal_cutoff_days: 7.0,
            resample: true,
            uniformity_tolerance: 0.01,
        }
    }
}

impl SpectralConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.diurnal_tolerance_cpd.is_finite()
            || self.diurnal_tolerance_cpd < 0.0
            || self.diurnal_tolerance_cpd >= 0.5
        {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "diurnal_tolerance_cpd must be in [0, 0.5), got {}",
                self.diurnal_tolerance_cpd
            )));
        }
        if !self.seasonal_cutoff_days.is_finite() || self.seasonal_cutoff_days <= 1.0 {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "seasonal_cutoff_days must exceed one day, got {}",
                self.seasonal_cutoff_days
            )));
        }
        if !self.uniformity_tolerance.is_finite()
            || self.uniformity_tolerance < 0.0
            || self.uniformity_tolerance >= 1.0
        {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "uniformity_tolerance must be in [0, 1), got {}",
                self.uniformity_tolerance
            )));
        }
        Ok(())
    }

    /// Target frequencies of the diurnal band, in cycles/day
    pub fn diurnal_targets(&self) -> Vec<f64> {
        (1..=self.diurnal_harmonics + 1).map(|h| h as f64).collect()
    }

    /// Frequencies below this belong to the seasonal band, in cycles/day
    pub fn seasonal_cutoff_cpd(&self) -> f64 {
        1.0 / self.seasonal_cutoff_days
    }
}
