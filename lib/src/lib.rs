//! Tempwatch Library
//!
//! Analysis of temperature time series from fixed monitoring locations.
//! Provides spectral removal of diurnal and seasonal cycles, hysteresis-based
//! spike detection, and stratification between pairs of locations.

pub mod config;
pub mod error;
pub mod io;
pub mod schedule;
pub mod series;
pub mod session;
pub mod spectral;
pub mod spikes;
pub mod stratification;

pub use config::AnalysisConfig;
pub use error::AnalysisError;
pub use series::{Series, TemperatureSample};
pub use session::{AnalysisSession, LocationAnalysis};
pub use spectral::{apply_filter, FilterMode, FilterResult, SpectralConfig};
pub use spikes::{detect_spikes, Direction, SpikeConfig, SpikeEvent, SpikeThresholds};
pub use stratification::{compute_stratification, StratificationRecord};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
///
/// Sets up logging when the `env_logger` feature is enabled.
pub fn init() {
    #[cfg(feature = "env_logger")]
    {
        let _ = env_logger::try_init();
    }
}

/// Result type for analysis operations
pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        init();
        init();
        assert!(!VERSION.is_empty());
    }
}
