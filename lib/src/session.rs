//! Analysis session coordinating loading, filtering, detection and comparison
//!
//! The session owns the series of every monitored location together with the
//! results of the last analysis of each. Analysis results are dropped whenever
//! their input series or the configuration changes.

use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::schedule::{relate_spikes, ScheduleInterval, SpikeRelation};
use crate::series::Series;
use crate::spectral::{FilterResult, SpectralFilter};
use crate::spikes::{SpikeDetector, SpikeEvent};
use crate::stratification::{StratificationEngine, StratificationRecord};
use crate::Result;
use std::collections::BTreeMap;

/// Filter output and detected spikes for one location
#[derive(Debug, Clone)]
pub struct LocationAnalysis {
    pub filter: FilterResult,
    pub spikes: Vec<SpikeEvent>,
}

impl LocationAnalysis {
    /// The series spikes were detected on
    pub fn analyzed_series(&self) -> &Series {
        &self.filter.filtered_series
    }
}

/// Main analysis session for a set of monitoring locations
pub struct AnalysisSession {
    config: AnalysisConfig,
    series: BTreeMap<String, Series>,
    analyses: BTreeMap<String, LocationAnalysis>,
    schedule: Vec<ScheduleInterval>,
}

impl AnalysisSession {
    /// Create a new session with default configuration
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig::default(),
            series: BTreeMap::new(),
            analyses: BTreeMap::new(),
            schedule: Vec::new(),
        }
    }

    /// Create a new session with custom configuration
    pub fn with_config(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Replace the configuration; previous analyses are invalidated
    pub fn set_config(&mut self, config: AnalysisConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.analyses.clear();
        Ok(())
    }

    /// Add or replace the series of a location
    pub fn load_series(&mut self, series: Series) {
        let location = series.location().to_string();
        if self.series.contains_key(&location) {
            log::info!("Replacing series for {}", location);
        }
        self.analyses.remove(&location);
        self.series.insert(location, series);
    }

    pub fn set_schedule(&mut self, schedule: Vec<ScheduleInterval>) {
        self.schedule = schedule;
    }

    pub fn schedule(&self) -> &[ScheduleInterval] {
        &self.schedule
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn series(&self, location: &str) -> Option<&Series> {
        self.series.get(location)
    }

    pub fn analysis(&self, location: &str) -> Option<&LocationAnalysis> {
        self.analyses.get(location)
    }

    fn require_series(&self, location: &str) -> Result<&Series> {
        self.series.get(location).ok_or_else(|| {
            AnalysisError::InvalidConfiguration(format!("no series loaded for '{}'", location))
        })
    }

    /// Filter one location and detect spikes on the filtered series
    pub fn analyze_location(&mut self, location: &str) -> Result<&LocationAnalysis> {
        let series = self.require_series(location)?;

        let mut filter = SpectralFilter::new(self.config.spectral)?;
        let filtered = filter.apply(series, self.config.filter_mode)?;
        let detector = SpikeDetector::new(self.config.spikes)?;
        let spikes = detector.detect(&filtered.filtered_series)?;

        log::info!(
            "{}: {} spikes after '{}' filtering",
            location,
            spikes.len(),
            self.config.filter_mode
        );

        let analysis = LocationAnalysis {
            filter: filtered,
            spikes,
        };
        self.analyses.insert(location.to_string(), analysis);
        Ok(&self.analyses[location])
    }

    /// Analyze every loaded location
    ///
    /// A failing location does not stop the others; failures are returned with
    /// their location.
    pub fn analyze_all(&mut self) -> Vec<(String, AnalysisError)> {
        let locations: Vec<String> = self.series.keys().cloned().collect();
        let mut failures = Vec::new();

        for location in locations {
            if let Err(e) = self.analyze_location(&location) {
                log::warn!("{}: analysis failed: {}", location, e);
                self.analyses.remove(&location);
                failures.push((location, e));
            }
        }

        failures
    }

    /// Compare the raw series of two locations
    pub fn stratify(&self, a: &str, b: &str) -> Result<StratificationRecord> {
        let engine = StratificationEngine::new(self.config.stratification_tolerance()?)?;
        Ok(engine.compute(self.require_series(a)?, self.require_series(b)?))
    }

    /// Compare every configured location pair whose series are both loaded
    pub fn stratify_configured_pairs(&self) -> Vec<StratificationRecord> {
        self.config
            .location_pairs
            .iter()
            .filter_map(|(a, b)| match self.stratify(a, b) {
                Ok(record) => Some(record),
                Err(e) => {
                    log::warn!("skipping pair {} - {}: {}", a, b, e);
                    None
                }
            })
            .collect()
    }

    /// Relate the spikes of every analyzed location to the loaded schedule
    pub fn relate_schedule(&self) -> Vec<SpikeRelation> {
        self.analyses
            .iter()
            .filter_map(|(location, analysis)| {
                let series_end = analysis.analyzed_series().last()?.timestamp;
                Some(relate_spikes(
                    location,
                    &analysis.spikes,
                    &self.schedule,
                    series_end,
                ))
            })
            .flatten()
            .collect()
    }

    /// Clear all data and reset the session
    pub fn clear(&mut self) {
        self.series.clear();
        self.analyses.clear();
        self.schedule.clear();
    }

    pub fn has_series(&self) -> bool {
        !self.series.is_empty()
    }

    pub fn has_analysis(&self) -> bool {
        !self.analyses.is_empty()
    }
}

impl Default for AnalysisSession {
    fn default() -> Self {
        Self::new()
    }
}
