//! Temperature series for a single monitoring location
//!
//! A series is an immutable, timestamp-ordered sequence of samples. All of the
//! analysis engines borrow it and produce new values; none of them mutate it.

use crate::error::AnalysisError;
use crate::Result;
use chrono::{DateTime, Duration, Utc};

/// One temperature reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureSample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl TemperatureSample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered temperature samples for one location
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    location: String,
    samples: Vec<TemperatureSample>,
}

impl Series {
    /// Create a series from samples that are already strictly ordered
    ///
    /// Non-finite values are rejected with [`AnalysisError::InvalidSample`] and
    /// repeated or decreasing timestamps with [`AnalysisError::UnorderedTimestamps`].
    /// An empty sample list is accepted; each engine decides whether it has
    /// enough data.
    pub fn new(location: impl Into<String>, samples: Vec<TemperatureSample>) -> Result<Self> {
        check_finite(&samples)?;

        for pair in samples.windows(2) {
            if pair[1].timestamp <= pair[0].timestamp {
                return Err(AnalysisError::UnorderedTimestamps {
                    timestamp: pair[1].timestamp,
                });
            }
        }

        Ok(Self {
            location: location.into(),
            samples,
        })
    }

    /// Create a series from loader output in arbitrary order
    ///
    /// Samples are sorted by timestamp and duplicate timestamps are dropped,
    /// keeping the first occurrence in input order.
    pub fn from_unsorted(
        location: impl Into<String>,
        mut samples: Vec<TemperatureSample>,
    ) -> Result<Self> {
        check_finite(&samples)?;

        let location = location.into();
        // Stable sort keeps the first occurrence of a duplicated timestamp in front
        samples.sort_by_key(|s| s.timestamp);
        let before = samples.len();
        samples.dedup_by_key(|s| s.timestamp);

        let dropped = before - samples.len();
        if dropped > 0 {
            log::warn!(
                "{}: dropped {} samples with duplicate timestamps",
                location,
                dropped
            );
        }

        Ok(Self { location, samples })
    }

    /// Build a uniformly sampled series starting at `start`
    pub fn from_values(
        location: impl Into<String>,
        start: DateTime<Utc>,
        interval: Duration,
        values: &[f64],
    ) -> Result<Self> {
        if interval <= Duration::zero() {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "sampling interval must be positive, got {}",
                interval
            )));
        }

        let samples = values
            .iter()
            .enumerate()
            .map(|(i, &value)| TemperatureSample::new(start + interval * i as i32, value))
            .collect();

        Self::new(location, samples)
    }

    /// Same timestamps and location, new values
    ///
    /// Callers guarantee `values` has one finite entry per sample.
    pub(crate) fn with_values(&self, values: &[f64]) -> Self {
        debug_assert_eq!(values.len(), self.samples.len());
        let samples = self
            .samples
            .iter()
            .zip(values)
            .map(|(s, &value)| TemperatureSample::new(s.timestamp, value))
            .collect();

        Self {
            location: self.location.clone(),
            samples,
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn samples(&self) -> &[TemperatureSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&TemperatureSample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&TemperatureSample> {
        self.samples.last()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.samples.iter().map(|s| s.timestamp).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Time between the first and last sample
    pub fn span(&self) -> Option<Duration> {
        match (self.first(), self.last()) {
            (Some(first), Some(last)) => Some(last.timestamp - first.timestamp),
            _ => None,
        }
    }

    /// Median spacing between consecutive samples
    pub fn median_interval(&self) -> Option<Duration> {
        median_interval_secs(&self.samples)
            .map(|secs| Duration::milliseconds((secs * 1000.0).round() as i64))
    }
}

fn check_finite(samples: &[TemperatureSample]) -> Result<()> {
    match samples.iter().find(|s| !s.value.is_finite()) {
        Some(bad) => Err(AnalysisError::InvalidSample {
            timestamp: bad.timestamp,
        }),
        None => Ok(()),
    }
}

/// Seconds from `from` to `to` with millisecond resolution
pub(crate) fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

pub(crate) fn median_interval_secs(samples: &[TemperatureSample]) -> Option<f64> {
    if samples.len() < 2 {
        return None;
    }

    let mut intervals: Vec<f64> = samples
        .windows(2)
        .map(|pair| seconds_between(pair[0].timestamp, pair[1].timestamp))
        .collect();
    intervals.sort_by(|a, b| a.total_cmp(b));

    let mid = intervals.len() / 2;
    if intervals.len() % 2 == 0 {
        Some((intervals[mid - 1] + intervals[mid]) / 2.0)
    } else {
        Some(intervals[mid])
    }
}

/// Linearly interpolate the series value at `t`
///
/// Times before the first or after the last sample take the nearest end value.
pub fn interpolate_at(samples: &[TemperatureSample], t: DateTime<Utc>) -> Option<f64> {
    let first = samples.first()?;
    let last = samples.last()?;

    if t <= first.timestamp {
        return Some(first.value);
    }
    if t >= last.timestamp {
        return Some(last.value);
    }

    // First sample strictly after t; both neighbours exist because of the checks above
    let upper = samples.partition_point(|s| s.timestamp <= t);
    let left = &samples[upper - 1];
    let right = &samples[upper];

    let width = seconds_between(left.timestamp, right.timestamp);
    let offset = seconds_between(left.timestamp, t);
    Some(left.value + (right.value - left.value) * offset / width)
}
