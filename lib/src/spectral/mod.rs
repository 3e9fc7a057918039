//! Spectral removal of periodic temperature components
//!
//! Series are placed on a uniform grid, transformed with a real FFT, and the
//! bins belonging to the diurnal (1 cycle/day and harmonics) and seasonal
//! (periods beyond the cutoff) bands are split out. The removed components are
//! kept for inspection; spike detection only consumes the filtered series.

pub mod config;
pub mod filter;
pub mod grid;
pub mod spectrum;

pub use config::{FilterMode, SpectralConfig};
pub use filter::{apply_filter, BandMasks, FilterResult, PeriodicComponent, SpectralFilter};
pub use grid::UniformGrid;
pub use spectrum::{
    autocorrelation, default_max_lag, power_spectrum, residual_spectrum, Autocorrelation,
    PowerSpectrum, ResidualSpectrum, SpectralPeak, DIURNAL_LAG_HOURS, WEEKLY_LAG_HOURS,
};
