//! Diagnostic power spectrum, autocorrelation and residual comparison

use super::config::SpectralConfig;
use super::grid::UniformGrid;
use crate::error::AnalysisError;
use crate::series::Series;
use crate::Result;
use num_complex::Complex64;
use rustfft::FftPlanner;
use std::fmt;

/// Lag, in hours, of the daily cycle
pub const DIURNAL_LAG_HOURS: f64 = 24.0;
/// Lag, in hours, of the weekly cycle
pub const WEEKLY_LAG_HOURS: f64 = 168.0;

/// A local maximum picked out of the power spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralPeak {
    pub frequency_cpd: f64,
    pub period_hours: f64,
    pub power: f64,
}

impl fmt::Display for SpectralPeak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3} cycles/day (period {:.1} h): power {:.4}",
            self.frequency_cpd, self.period_hours, self.power
        )
    }
}

/// One-sided power spectrum indexed by frequency in cycles/day
#[derive(Debug, Clone)]
pub struct PowerSpectrum {
    /// Bin frequencies from DC to Nyquist
    pub frequencies_cpd: Vec<f64>,
    /// Squared magnitude divided by the number of grid points
    pub power: Vec<f64>,
    /// Number of grid points transformed
    pub num_points: usize,
}

impl PowerSpectrum {
    /// Frequency spacing between bins
    pub fn resolution_cpd(&self) -> f64 {
        self.frequencies_cpd.get(1).copied().unwrap_or(0.0)
    }

    fn is_local_maximum(&self, bin: usize) -> bool {
        let power = self.power[bin];
        // DC is not a neighbour; it carries the mean rather than a cycle
        let left = if bin > 1 { self.power[bin - 1] } else { f64::NEG_INFINITY };
        let right = self.power.get(bin + 1).copied().unwrap_or(f64::NEG_INFINITY);
        power > 0.0 && power > left && power >= right
    }

    /// The `count` strongest local maxima above DC, strongest first
    ///
    /// Leakage bins next to a peak are not reported as peaks of their own.
    pub fn dominant_peaks(&self, count: usize) -> Vec<SpectralPeak> {
        let mut bins: Vec<usize> = (1..self.power.len())
            .filter(|&bin| self.is_local_maximum(bin))
            .collect();
        bins.sort_by(|&a, &b| self.power[b].total_cmp(&self.power[a]));

        bins.into_iter()
            .take(count)
            .map(|bin| {
                let frequency_cpd = self.frequencies_cpd[bin];
                SpectralPeak {
                    frequency_cpd,
                    period_hours: 24.0 / frequency_cpd,
                    power: self.power[bin],
                }
            })
            .collect()
    }

    /// Total power with `low_cpd <= f < high_cpd`
    pub fn band_power(&self, low_cpd: f64, high_cpd: f64) -> f64 {
        self.frequencies_cpd
            .iter()
            .zip(&self.power)
            .filter(|(&f, _)| f >= low_cpd && f < high_cpd)
            .map(|(_, &p)| p)
            .sum()
    }
}

/// Compute the power spectrum of a series
///
/// Irregular series go through the same uniform grid as the spectral filter.
/// This is read-only and has no influence on filtering.
pub fn power_spectrum(series: &Series, config: &SpectralConfig) -> Result<PowerSpectrum> {
    config.validate()?;
    let grid = UniformGrid::from_series(series, config)?;
    let n = grid.len();

    let mut buffer: Vec<Complex64> = grid
        .values()
        .iter()
        .map(|&x| Complex64::new(x, 0.0))
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let num_bins = n / 2 + 1;
    let frequencies_cpd = (0..num_bins).map(|bin| grid.bin_frequency_cpd(bin)).collect();
    let power = buffer[..num_bins]
        .iter()
        .map(|c| c.norm_sqr() / n as f64)
        .collect();

    log::debug!(
        "{}: power spectrum over {} points, {} bins",
        series.location(),
        n,
        num_bins
    );

    Ok(PowerSpectrum {
        frequencies_cpd,
        power,
        num_points: n,
    })
}

/// Power of the removed signal next to the power of the original
#[derive(Debug, Clone)]
pub struct ResidualSpectrum {
    pub original: PowerSpectrum,
    /// Spectrum of `original - filtered`
    pub residual: PowerSpectrum,
}

impl ResidualSpectrum {
    /// Share of the original power in `[low_cpd, high_cpd)` carried by the residual
    ///
    /// `None` when the original has no power in the band.
    pub fn removed_fraction(&self, low_cpd: f64, high_cpd: f64) -> Option<f64> {
        let original = self.original.band_power(low_cpd, high_cpd);
        if original <= 0.0 {
            return None;
        }
        Some(self.residual.band_power(low_cpd, high_cpd) / original)
    }
}

/// Compare the spectrum of what a filter removed with the original spectrum
///
/// `filtered` must share the timestamps of `original`, as filter output does.
pub fn residual_spectrum(
    original: &Series,
    filtered: &Series,
    config: &SpectralConfig,
) -> Result<ResidualSpectrum> {
    if original.timestamps() != filtered.timestamps() {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "{}: filtered series does not share the original timestamps",
            original.location()
        )));
    }

    let residual: Vec<f64> = original
        .samples()
        .iter()
        .zip(filtered.samples())
        .map(|(o, f)| o.value - f.value)
        .collect();

    Ok(ResidualSpectrum {
        original: power_spectrum(original, config)?,
        residual: power_spectrum(&original.with_values(&residual), config)?,
    })
}

/// Sample autocorrelation by lag on the uniform grid
#[derive(Debug, Clone)]
pub struct Autocorrelation {
    /// Grid spacing, i.e. the length of one lag
    pub step_hours: f64,
    /// Correlation at lags `0..=max_lag`; lag 0 is 1
    pub values: Vec<f64>,
}

impl Autocorrelation {
    pub fn max_lag(&self) -> usize {
        self.values.len().saturating_sub(1)
    }

    pub fn lag_hours(&self, lag: usize) -> f64 {
        lag as f64 * self.step_hours
    }

    /// Correlation at the lag nearest to `hours`, if within the computed range
    pub fn at_hours(&self, hours: f64) -> Option<f64> {
        if !hours.is_finite() || hours < 0.0 {
            return None;
        }
        let lag = (hours / self.step_hours).round() as usize;
        self.values.get(lag).copied()
    }
}

/// Lag count used when none is requested: a quarter of the series, at most 72
pub fn default_max_lag(len: usize) -> usize {
    (len / 4).min(72)
}

/// Autocorrelation of a series up to `max_lag` grid steps
///
/// Uses the biased estimator normalised by the lag-0 sum of squares. A
/// constant series has correlation 0 at every lag above zero.
pub fn autocorrelation(
    series: &Series,
    max_lag: usize,
    config: &SpectralConfig,
) -> Result<Autocorrelation> {
    config.validate()?;
    let grid = UniformGrid::from_series(series, config)?;
    let values = grid.values();
    let n = values.len();

    let max_lag = if max_lag >= n {
        log::debug!(
            "{}: limiting autocorrelation to {} lags",
            series.location(),
            n - 1
        );
        n - 1
    } else {
        max_lag
    };

    let mean = values.iter().sum::<f64>() / n as f64;
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();
    let denominator: f64 = centered.iter().map(|v| v * v).sum();

    let correlations = (0..=max_lag)
        .map(|lag| {
            if lag == 0 {
                return 1.0;
            }
            if denominator <= 0.0 {
                return 0.0;
            }
            let sum: f64 = centered[..n - lag]
                .iter()
                .zip(&centered[lag..])
                .map(|(x, y)| x * y)
                .sum();
            sum / denominator
        })
        .collect();

    Ok(Autocorrelation {
        step_hours: grid.step_secs() / 3600.0,
        values: correlations,
    })
}
