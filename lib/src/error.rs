//! Error types for temperature analysis

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors reported by the analysis engine and its boundary helpers
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Too few samples for the requested operation
    #[error("insufficient data: need at least {needed} samples, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// A sample value is NaN or infinite
    #[error("invalid sample at {timestamp}: value is not finite")]
    InvalidSample { timestamp: DateTime<Utc> },

    /// Timestamps are not strictly increasing
    #[error("timestamps not strictly increasing at {timestamp}")]
    UnorderedTimestamps { timestamp: DateTime<Utc> },

    /// Parameter values that cannot drive the analysis
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Sampling is not uniform and resampling was disabled
    #[error("irregular sampling: median interval {median_secs}s, worst deviation {worst_secs}s")]
    IrregularSampling { median_secs: f64, worst_secs: f64 },

    /// Forward or inverse transform failure
    #[error("FFT error: {0}")]
    Fft(String),

    /// Malformed input line
    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// File access failure
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        AnalysisError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_error_messages() {
        let err = AnalysisError::InsufficientData { needed: 2, got: 1 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 2 samples, got 1"
        );

        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let err = AnalysisError::InvalidSample { timestamp: ts };
        assert!(err.to_string().contains("2024-06-01 12:00:00"));

        let err = AnalysisError::InvalidConfiguration("up_relax must be below up_threshold".into());
        assert_eq!(
            err.to_string(),
            "invalid configuration: up_relax must be below up_threshold"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: AnalysisError = io.into();
        assert!(matches!(err, AnalysisError::Io(ref msg) if msg.contains("missing.csv")));
    }
}
