//! Frequency-domain removal of diurnal and seasonal components

use super::config::{FilterMode, SpectralConfig};
use super::grid::UniformGrid;
use crate::error::AnalysisError;
use crate::series::Series;
use crate::Result;
use num_complex::Complex64;
use realfft::RealFftPlanner;
use std::collections::BTreeMap;
use std::fmt;

/// Slack on band edges so bins exactly on a tolerance boundary are treated alike
const BAND_EDGE_EPSILON: f64 = 1e-9;

/// Periodic component that can be removed from a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PeriodicComponent {
    Diurnal,
    Seasonal,
}

impl PeriodicComponent {
    pub fn name(&self) -> &'static str {
        match self {
            PeriodicComponent::Diurnal => "diurnal",
            PeriodicComponent::Seasonal => "seasonal",
        }
    }
}

impl fmt::Display for PeriodicComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Output of one filter invocation
#[derive(Debug, Clone)]
pub struct FilterResult {
    /// Input minus every removed component, on the input timestamps
    pub filtered_series: Series,
    /// Removed components on the input timestamps, for inspection only
    pub removed_components: BTreeMap<PeriodicComponent, Series>,
    pub mode: FilterMode,
    /// Whether the input had to be resampled onto a uniform grid
    pub resampled: bool,
}

impl FilterResult {
    pub fn component(&self, component: PeriodicComponent) -> Option<&Series> {
        self.removed_components.get(&component)
    }
}

/// One-sided spectral masks, one flag per real-FFT bin
#[derive(Debug, Clone, PartialEq)]
pub struct BandMasks {
    pub diurnal: Vec<bool>,
    pub seasonal: Vec<bool>,
}

impl BandMasks {
    /// Select diurnal and seasonal bins for a grid of `len` points
    ///
    /// Bins claimed by the diurnal band are never also seasonal.
    pub fn for_grid(grid: &UniformGrid, config: &SpectralConfig) -> Self {
        let len = grid.len();
        let num_bins = len / 2 + 1;
        let samples_per_day = grid.samples_per_day();
        let nyquist = samples_per_day / 2.0;

        let mut diurnal = vec![false; num_bins];
        for target in config.diurnal_targets() {
            if target >= nyquist {
                log::debug!(
                    "skipping {:.0} cycles/day: above Nyquist ({:.2} cycles/day)",
                    target,
                    nyquist
                );
                continue;
            }

            for (bin, flag) in diurnal.iter_mut().enumerate().skip(1) {
                let distance = (grid.bin_frequency_cpd(bin) - target).abs();
                if distance <= config.diurnal_tolerance_cpd + BAND_EDGE_EPSILON {
                    *flag = true;
                }
            }

            // The nearest bin always goes, even when the grid is coarser than the tolerance
            let nearest = (target * len as f64 / samples_per_day).round() as usize;
            if nearest >= 1 && nearest < num_bins {
                diurnal[nearest] = true;
            }
        }

        let cutoff = config.seasonal_cutoff_cpd();
        let seasonal = (0..num_bins)
            .map(|bin| !diurnal[bin] && grid.bin_frequency_cpd(bin) < cutoff)
            .collect();

        Self { diurnal, seasonal }
    }

    pub fn mask(&self, component: PeriodicComponent) -> &[bool] {
        match component {
            PeriodicComponent::Diurnal => &self.diurnal,
            PeriodicComponent::Seasonal => &self.seasonal,
        }
    }
}

/// Removes periodic components from temperature series
pub struct SpectralFilter {
    config: SpectralConfig,
    planner: RealFftPlanner<f64>,
}

impl SpectralFilter {
    /// Create a new spectral filter
    pub fn new(config: SpectralConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            planner: RealFftPlanner::new(),
        })
    }

    pub fn config(&self) -> &SpectralConfig {
        &self.config
    }

    /// Remove the components selected by `mode`
    ///
    /// All removed components are cut from one spectrum of the input; the
    /// filtered series is the input minus their sum at every input timestamp.
    pub fn apply(&mut self, series: &Series, mode: FilterMode) -> Result<FilterResult> {
        if series.len() < 2 {
            return Err(AnalysisError::InsufficientData {
                needed: 2,
                got: series.len(),
            });
        }

        if mode == FilterMode::None {
            return Ok(FilterResult {
                filtered_series: series.clone(),
                removed_components: BTreeMap::new(),
                mode,
                resampled: false,
            });
        }

        let grid = UniformGrid::from_series(series, &self.config)?;
        let spectrum = self.forward(grid.values())?;
        let masks = BandMasks::for_grid(&grid, &self.config);

        let mut selected = Vec::new();
        if mode.removes_diurnal() {
            selected.push(PeriodicComponent::Diurnal);
        }
        if mode.removes_seasonal() {
            selected.push(PeriodicComponent::Seasonal);
        }

        let mut filtered = series.values();
        let mut removed_components = BTreeMap::new();

        for component in selected {
            let mask = masks.mask(component);
            let bins = mask.iter().filter(|&&m| m).count();
            if bins == 0 {
                log::warn!(
                    "{}: no {} bins resolvable over {} grid points",
                    series.location(),
                    component,
                    grid.len()
                );
            } else {
                log::debug!("{}: removing {} {} bins", series.location(), bins, component);
            }

            let on_grid = self.extract_band(&spectrum, mask, grid.len())?;
            let on_series = grid.project_onto(&on_grid, series);

            for (value, removed) in filtered.iter_mut().zip(&on_series) {
                *value -= removed;
            }
            removed_components.insert(component, series.with_values(&on_series));
        }

        log::info!(
            "{}: applied {} filter to {} samples{}",
            series.location(),
            mode,
            series.len(),
            if grid.is_resampled() { " (resampled)" } else { "" }
        );

        Ok(FilterResult {
            filtered_series: series.with_values(&filtered),
            removed_components,
            mode,
            resampled: grid.is_resampled(),
        })
    }

    fn forward(&mut self, values: &[f64]) -> Result<Vec<Complex64>> {
        let r2c = self.planner.plan_fft_forward(values.len());
        let mut input = values.to_vec();
        let mut spectrum = r2c.make_output_vec();
        r2c.process(&mut input, &mut spectrum)
            .map_err(|e| AnalysisError::Fft(e.to_string()))?;
        Ok(spectrum)
    }

    /// Inverse transform of only the masked bins
    fn extract_band(&mut self, spectrum: &[Complex64], mask: &[bool], len: usize) -> Result<Vec<f64>> {
        let mut band: Vec<Complex64> = spectrum
            .iter()
            .zip(mask)
            .map(|(&bin, &keep)| if keep { bin } else { Complex64::new(0.0, 0.0) })
            .collect();

        // DC and (for even lengths) Nyquist bins of a real signal are purely real
        band[0].im = 0.0;
        if len % 2 == 0 {
            if let Some(last) = band.last_mut() {
                last.im = 0.0;
            }
        }

        let c2r = self.planner.plan_fft_inverse(len);
        let mut output = c2r.make_output_vec();
        c2r.process(&mut band, &mut output)
            .map_err(|e| AnalysisError::Fft(e.to_string()))?;

        let scale = 1.0 / len as f64;
        for value in output.iter_mut() {
            *value *= scale;
        }
        Ok(output)
    }
}

/// Apply one filter mode with the given band configuration
pub fn apply_filter(series: &Series, mode: FilterMode, config: &SpectralConfig) -> Result<FilterResult> {
    SpectralFilter::new(*config)?.apply(series, mode)
}
