//! Thermal stratification between two monitoring locations
//!
//! Two independently sampled series are aligned by nearest-timestamp matching
//! within a tolerance, and the per-pair temperature differences are summarised.

use crate::error::AnalysisError;
use crate::series::{Series, TemperatureSample};
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt;

/// Difference `value_a - value_b` for one matched pair of samples
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DifferencePoint {
    /// Earlier of the two matched sample timestamps
    pub timestamp: DateTime<Utc>,
    pub delta: f64,
}

/// Summary statistics over matched differences
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DifferenceSummary {
    pub mean: f64,
    pub max: f64,
    pub min: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

impl DifferenceSummary {
    fn from_deltas(deltas: &[f64]) -> Option<Self> {
        if deltas.is_empty() {
            return None;
        }

        let n = deltas.len() as f64;
        let mean = deltas.iter().sum::<f64>() / n;
        let variance = deltas.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;

        Some(Self {
            mean,
            max: deltas.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            min: deltas.iter().copied().fold(f64::INFINITY, f64::min),
            std_dev: variance.sqrt(),
        })
    }
}

/// Result of comparing two locations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StratificationRecord {
    pub pair: (String, String),
    pub differences: Vec<DifferencePoint>,
    /// `None` when no samples could be matched
    pub summary: Option<DifferenceSummary>,
    pub a_warmer_count: usize,
    pub b_warmer_count: usize,
    /// Matched pairs with a difference of exactly zero, counted for neither side
    pub tied_count: usize,
    pub unmatched_a: usize,
    pub unmatched_b: usize,
}

impl StratificationRecord {
    pub fn matched_count(&self) -> usize {
        self.differences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.differences.is_empty()
    }

    pub fn deltas(&self) -> Vec<f64> {
        self.differences.iter().map(|d| d.delta).collect()
    }
}

impl fmt::Display for StratificationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (a, b) = &self.pair;
        match &self.summary {
            Some(s) => write!(
                f,
                "{} - {}: {} matched, mean {:.3}, min {:.3}, max {:.3}, std {:.3}; \
                 {} warmer {} times, {} warmer {} times, {} ties; unmatched {}/{}",
                a,
                b,
                self.matched_count(),
                s.mean,
                s.min,
                s.max,
                s.std_dev,
                a,
                self.a_warmer_count,
                b,
                self.b_warmer_count,
                self.tied_count,
                self.unmatched_a,
                self.unmatched_b
            ),
            None => write!(
                f,
                "{} - {}: no matched samples (unmatched {}/{})",
                a, b, self.unmatched_a, self.unmatched_b
            ),
        }
    }
}

/// Aligns two series under a timestamp tolerance
#[derive(Debug, Clone, Copy)]
pub struct StratificationEngine {
    tolerance: Duration,
}

impl Default for StratificationEngine {
    fn default() -> Self {
        Self {
            tolerance: Duration::seconds(60),
        }
    }
}

impl StratificationEngine {
    pub fn new(tolerance: Duration) -> Result<Self> {
        if tolerance < Duration::zero() {
            return Err(AnalysisError::InvalidConfiguration(format!(
                "stratification tolerance must not be negative, got {}",
                tolerance
            )));
        }
        Ok(Self { tolerance })
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Compare `a` against `b`; deltas are `a - b`
    pub fn compute(&self, a: &Series, b: &Series) -> StratificationRecord {
        let pairs = match_samples(a.samples(), b.samples(), self.tolerance);

        let differences: Vec<DifferencePoint> = pairs
            .iter()
            .map(|(sa, sb)| DifferencePoint {
                timestamp: sa.timestamp.min(sb.timestamp),
                delta: sa.value - sb.value,
            })
            .collect();

        let deltas: Vec<f64> = differences.iter().map(|d| d.delta).collect();
        let a_warmer_count = deltas.iter().filter(|&&d| d > 0.0).count();
        let b_warmer_count = deltas.iter().filter(|&&d| d < 0.0).count();

        let record = StratificationRecord {
            pair: (a.location().to_string(), b.location().to_string()),
            summary: DifferenceSummary::from_deltas(&deltas),
            a_warmer_count,
            b_warmer_count,
            tied_count: deltas.len() - a_warmer_count - b_warmer_count,
            unmatched_a: a.len() - pairs.len(),
            unmatched_b: b.len() - pairs.len(),
            differences,
        };

        if record.is_empty() {
            log::warn!(
                "{} - {}: no samples matched within {}s",
                a.location(),
                b.location(),
                self.tolerance.num_seconds()
            );
        } else {
            log::info!("{}", record);
        }

        record
    }
}

/// Compare two series with the given timestamp tolerance
pub fn compute_stratification(a: &Series, b: &Series, tolerance: Duration) -> Result<StratificationRecord> {
    Ok(StratificationEngine::new(tolerance)?.compute(a, b))
}

fn skew(a: DateTime<Utc>, b: DateTime<Utc>) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

/// Single merge pass pairing each sample with its nearest counterpart
///
/// When two samples are within tolerance, the earlier one is skipped if its
/// successor lies even closer to the later one and it could not pair with the
/// next sample on the other side anyway. Each sample joins at most one pair,
/// and swapping `a` and `b` yields the same pairs.
fn match_samples<'s>(
    a: &'s [TemperatureSample],
    b: &'s [TemperatureSample],
    tolerance: Duration,
) -> Vec<(&'s TemperatureSample, &'s TemperatureSample)> {
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < a.len() && j < b.len() {
        let (ta, tb) = (a[i].timestamp, b[j].timestamp);
        let distance = skew(ta, tb);

        if distance <= tolerance {
            if ta < tb
                && i + 1 < a.len()
                && skew(a[i + 1].timestamp, tb) < distance
                && !(j + 1 < b.len() && skew(ta, b[j + 1].timestamp) <= tolerance)
            {
                i += 1;
                continue;
            }
            if tb < ta
                && j + 1 < b.len()
                && skew(b[j + 1].timestamp, ta) < distance
                && !(i + 1 < a.len() && skew(tb, a[i + 1].timestamp) <= tolerance)
            {
                j += 1;
                continue;
            }
            pairs.push((&a[i], &b[j]));
            i += 1;
            j += 1;
        } else if ta < tb {
            i += 1;
        } else {
            j += 1;
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap()
    }

    fn series(location: &str, points: &[(i64, f64)]) -> Series {
        let samples = points
            .iter()
            .map(|&(secs, value)| TemperatureSample::new(t0() + Duration::seconds(secs), value))
            .collect();
        Series::new(location, samples).unwrap()
    }

    #[test]
    fn test_tolerance_boundary() {
        let a = series("surface", &[(0, 15.0)]);
        let b = series("bottom", &[(59, 14.0)]);

        let matched = compute_stratification(&a, &b, Duration::seconds(60)).unwrap();
        assert_eq!(matched.matched_count(), 1);
        assert_eq!(matched.differences[0].timestamp, t0());
        assert_abs_diff_eq!(matched.differences[0].delta, 1.0, epsilon = 1e-12);
        assert_eq!(matched.a_warmer_count, 1);

        let unmatched = compute_stratification(&a, &b, Duration::seconds(58)).unwrap();
        assert!(unmatched.is_empty());
        assert!(unmatched.summary.is_none());
        assert_eq!(unmatched.unmatched_a, 1);
        assert_eq!(unmatched.unmatched_b, 1);
    }

    #[test]
    fn test_offset_exactly_at_tolerance_matches() {
        let a = series("a", &[(0, 10.0), (3600, 11.0), (7200, 12.0)]);
        let b = series("b", &[(60, 9.0), (3660, 9.5), (7261, 9.0)]);

        let record = compute_stratification(&a, &b, Duration::seconds(60)).unwrap();
        // The last pair is 61 seconds apart
        assert_eq!(record.matched_count(), 2);
        assert_eq!(record.unmatched_a, 1);
        assert_eq!(record.unmatched_b, 1);
    }

    #[test]
    fn test_statistics_and_counts() {
        let a = series("a", &[(0, 12.0), (600, 13.0), (1200, 11.0), (1800, 10.0)]);
        let b = series("b", &[(5, 11.0), (598, 13.0), (1210, 12.0), (1790, 8.0)]);

        let record = compute_stratification(&a, &b, Duration::seconds(60)).unwrap();
        assert_eq!(record.deltas(), vec![1.0, 0.0, -1.0, 2.0]);
        assert_eq!(record.a_warmer_count, 2);
        assert_eq!(record.b_warmer_count, 1);
        assert_eq!(record.tied_count, 1);
        assert_eq!(
            record.a_warmer_count + record.b_warmer_count + record.tied_count,
            record.matched_count()
        );

        let summary = record.summary.unwrap();
        assert_abs_diff_eq!(summary.mean, 0.5, epsilon = 1e-12);
        assert_eq!(summary.max, 2.0);
        assert_eq!(summary.min, -1.0);
        assert_abs_diff_eq!(summary.std_dev, 1.25f64.sqrt(), epsilon = 1e-12);

        // Timestamps are the earlier of each matched pair
        assert_eq!(record.differences[1].timestamp, t0() + Duration::seconds(598));
        assert_eq!(record.differences[3].timestamp, t0() + Duration::seconds(1790));
    }

    #[test]
    fn test_nearest_sample_wins() {
        // a has two samples near b's single reading; the closer one is used
        let a = series("a", &[(0, 20.0), (40, 21.0)]);
        let b = series("b", &[(50, 18.0)]);

        let record = compute_stratification(&a, &b, Duration::seconds(60)).unwrap();
        assert_eq!(record.deltas(), vec![3.0]);
        assert_eq!(record.unmatched_a, 1);
    }

    #[test]
    fn test_closer_successor_does_not_strand_pairs() {
        // a at 0s is farther from b at 40s than a at 50s is, but it can still
        // pair with b at 40s while a at 50s takes b at 45s
        let a = series("a", &[(0, 20.0), (50, 21.0)]);
        let b = series("b", &[(40, 18.5), (45, 19.5)]);

        let record = compute_stratification(&a, &b, Duration::seconds(60)).unwrap();
        assert_eq!(record.matched_count(), 2);
        assert_eq!(record.deltas(), vec![1.5, 1.5]);
        assert_eq!(record.unmatched_a, 0);
        assert_eq!(record.unmatched_b, 0);
        assert_eq!(record.differences[0].timestamp, t0());
        assert_eq!(record.differences[1].timestamp, t0() + Duration::seconds(45));

        let swapped = compute_stratification(&b, &a, Duration::seconds(60)).unwrap();
        assert_eq!(swapped.deltas(), vec![-1.5, -1.5]);
    }

    #[test]
    fn test_swapping_locations_negates_deltas() {
        let a = series(
            "a",
            &[(0, 12.0), (610, 13.5), (1190, 11.0), (1800, 10.0), (2410, 9.5), (5000, 9.0)],
        );
        let b = series(
            "b",
            &[(-30, 11.0), (20, 11.5), (600, 13.0), (1230, 12.0), (1795, 10.0), (2400, 9.0)],
        );
        let tolerance = Duration::seconds(45);

        let ab = compute_stratification(&a, &b, tolerance).unwrap();
        let ba = compute_stratification(&b, &a, tolerance).unwrap();

        assert_eq!(ab.matched_count(), ba.matched_count());
        assert!(ab.matched_count() > 0);
        for (x, y) in ab.differences.iter().zip(&ba.differences) {
            assert_eq!(x.timestamp, y.timestamp);
            assert_eq!(x.delta, -y.delta);
        }
        assert_eq!(ab.a_warmer_count, ba.b_warmer_count);
        assert_eq!(ab.b_warmer_count, ba.a_warmer_count);
        assert_eq!(ab.unmatched_a, ba.unmatched_b);
    }

    #[test]
    fn test_empty_series_gives_flagged_record() {
        let a = Series::new("a", Vec::new()).unwrap();
        let b = series("b", &[(0, 10.0), (60, 10.5)]);

        let record = compute_stratification(&a, &b, Duration::seconds(60)).unwrap();
        assert!(record.is_empty());
        assert!(record.summary.is_none());
        assert_eq!(record.unmatched_b, 2);
        assert!(record.to_string().contains("no matched samples"));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        assert!(matches!(
            StratificationEngine::new(Duration::seconds(-1)),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }
}
