//! Uniform sampling grid for frequency-domain processing

use super::config::SpectralConfig;
use crate::error::AnalysisError;
use crate::series::{interpolate_at, median_interval_secs, seconds_between, Series};
use crate::Result;
use chrono::{DateTime, Duration, Utc};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Series values on an evenly spaced time grid
#[derive(Debug, Clone)]
pub struct UniformGrid {
    start: DateTime<Utc>,
    step_secs: f64,
    values: Vec<f64>,
    resampled: bool,
}

impl UniformGrid {
    /// Place a series on a uniform grid
    ///
    /// A series whose intervals all lie within the configured tolerance of the
    /// median interval is used as-is. Otherwise it is linearly resampled at the
    /// median interval, or rejected when resampling is disabled.
    pub fn from_series(series: &Series, config: &SpectralConfig) -> Result<Self> {
        let samples = series.samples();
        let step_secs = match median_interval_secs(samples) {
            Some(step) if step > 0.0 => step,
            _ => {
                return Err(AnalysisError::InsufficientData {
                    needed: 2,
                    got: samples.len(),
                })
            }
        };

        let worst_secs = samples
            .windows(2)
            .map(|pair| (seconds_between(pair[0].timestamp, pair[1].timestamp) - step_secs).abs())
            .fold(0.0, f64::max);

        let start = samples[0].timestamp;
        if worst_secs <= config.uniformity_tolerance * step_secs {
            return Ok(Self {
                start,
                step_secs,
                values: series.values(),
                resampled: false,
            });
        }

        if !config.resample {
            return Err(AnalysisError::IrregularSampling {
                median_secs: step_secs,
                worst_secs,
            });
        }

        let span_secs = seconds_between(start, samples[samples.len() - 1].timestamp);
        let len = (span_secs / step_secs).floor() as usize + 1;
        let mut values = Vec::with_capacity(len);
        for k in 0..len {
            let t = start + offset(k as f64 * step_secs);
            // Grid points never leave the sampled range, so interpolation always yields a value
            values.push(interpolate_at(samples, t).unwrap_or(samples[0].value));
        }

        log::info!(
            "{}: resampled {} irregular samples onto {} points at {:.0}s (worst deviation {:.0}s)",
            series.location(),
            samples.len(),
            len,
            step_secs,
            worst_secs
        );

        Ok(Self {
            start,
            step_secs,
            values,
            resampled: true,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn step_secs(&self) -> f64 {
        self.step_secs
    }

    /// Whether values were interpolated rather than taken from the series
    pub fn is_resampled(&self) -> bool {
        self.resampled
    }

    pub fn samples_per_day(&self) -> f64 {
        SECONDS_PER_DAY / self.step_secs
    }

    pub fn time_at(&self, index: usize) -> DateTime<Utc> {
        self.start + offset(index as f64 * self.step_secs)
    }

    /// Frequency of a one-sided FFT bin in cycles/day
    pub fn bin_frequency_cpd(&self, bin: usize) -> f64 {
        bin as f64 * self.samples_per_day() / self.len() as f64
    }

    /// Bring grid-aligned values back onto the timestamps of `series`
    pub fn project_onto(&self, grid_values: &[f64], series: &Series) -> Vec<f64> {
        if !self.resampled {
            return grid_values.to_vec();
        }

        series
            .samples()
            .iter()
            .map(|sample| {
                let position = seconds_between(self.start, sample.timestamp) / self.step_secs;
                let lower = (position.floor().max(0.0) as usize).min(grid_values.len() - 1);
                let upper = (lower + 1).min(grid_values.len() - 1);
                let frac = (position - lower as f64).clamp(0.0, 1.0);
                grid_values[lower] + (grid_values[upper] - grid_values[lower]) * frac
            })
            .collect()
    }
}

fn offset(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::TemperatureSample;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    fn jittered() -> Series {
        let minutes = [0, 60, 125, 180, 238, 300, 365, 420];
        let samples = minutes
            .iter()
            .map(|&m| TemperatureSample::new(t0() + Duration::minutes(m), m as f64 / 60.0))
            .collect();
        Series::new("jitter", samples).unwrap()
    }

    #[test]
    fn test_uniform_series_used_directly() {
        let series = Series::from_values("u", t0(), Duration::hours(1), &[1.0, 2.0, 3.0, 4.0]).unwrap();
        let grid = UniformGrid::from_series(&series, &SpectralConfig::default()).unwrap();

        assert!(!grid.is_resampled());
        assert_eq!(grid.values(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(grid.step_secs(), 3600.0);
        assert_eq!(grid.samples_per_day(), 24.0);
        assert_eq!(grid.time_at(2), t0() + Duration::hours(2));
        assert_abs_diff_eq!(grid.bin_frequency_cpd(1), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_irregular_series_rejected_without_resampling() {
        let config = SpectralConfig {
            resample: false,
            ..Default::default()
        };
        let err = UniformGrid::from_series(&jittered(), &config).unwrap_err();
        match err {
            AnalysisError::IrregularSampling {
                median_secs,
                worst_secs,
            } => {
                assert_eq!(median_secs, 3600.0);
                assert_eq!(worst_secs, 300.0);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_irregular_series_resampled_linearly() {
        let series = jittered();
        let grid = UniformGrid::from_series(&series, &SpectralConfig::default()).unwrap();

        assert!(grid.is_resampled());
        assert_eq!(grid.len(), 8);
        // Values are hours since start, so a linear signal survives resampling exactly
        for (k, value) in grid.values().iter().enumerate() {
            assert_abs_diff_eq!(*value, k as f64, epsilon = 1e-9);
        }

        let projected = grid.project_onto(grid.values(), &series);
        for (sample, value) in series.samples().iter().zip(&projected) {
            assert_abs_diff_eq!(sample.value, *value, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_single_sample_is_insufficient() {
        let series = Series::from_values("one", t0(), Duration::hours(1), &[3.0]).unwrap();
        assert!(matches!(
            UniformGrid::from_series(&series, &SpectralConfig::default()),
            Err(AnalysisError::InsufficientData { got: 1, .. })
        ));
    }
}
