//! Hysteresis state machine for spike detection

use super::config::{SpikeConfig, SpikeThresholds};
use super::event::{Direction, SpikeEvent};
use crate::error::AnalysisError;
use crate::series::{seconds_between, Series, TemperatureSample};
use crate::Result;

/// Excursion being tracked by the state machine, indices relative to the scanned slice
#[derive(Debug, Clone, Copy)]
struct Excursion {
    direction: Direction,
    start: usize,
    end: Option<usize>,
    baseline: f64,
    extreme: f64,
}

#[derive(Debug, Clone, Copy)]
enum State {
    Normal,
    InSpike(Excursion),
}

/// Spike detector for single-location series
///
/// Runs one forward pass over the series, then one nested pass inside every
/// closed spike. Inner spikes are never searched for inner spikes themselves.
#[derive(Debug, Clone)]
pub struct SpikeDetector {
    config: SpikeConfig,
}

impl SpikeDetector {
    /// Create a detector, rejecting configurations without a working hysteresis band
    pub fn new(config: SpikeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SpikeConfig {
        &self.config
    }

    /// Detect spikes in time order
    pub fn detect(&self, series: &Series) -> Result<Vec<SpikeEvent>> {
        let samples = series.samples();
        if samples.len() < 2 {
            return Err(AnalysisError::InsufficientData {
                needed: 2,
                got: samples.len(),
            });
        }

        let max_gap = self.config.max_gap_secs.map(|secs| secs as f64);
        let excursions = scan(samples, &self.config.thresholds, max_gap);

        let events: Vec<SpikeEvent> = excursions
            .iter()
            .map(|excursion| {
                let inner = self.detect_inner(samples, excursion, max_gap);
                to_event(samples, excursion, 0, inner)
            })
            .collect();

        let open = events.iter().filter(|e| e.is_open()).count();
        log::info!(
            "{}: detected {} spikes ({} open) in {} samples",
            series.location(),
            events.len(),
            open,
            samples.len()
        );
        for event in &events {
            log::debug!("{}: {}", series.location(), event);
        }

        Ok(events)
    }

    /// Re-run the state machine on the samples strictly inside a closed spike
    fn detect_inner(
        &self,
        samples: &[TemperatureSample],
        parent: &Excursion,
        max_gap: Option<f64>,
    ) -> Vec<SpikeEvent> {
        let Some(end) = parent.end else {
            return Vec::new();
        };

        let offset = parent.start + 1;
        let inside = &samples[offset..end];
        if inside.len() < 2 {
            return Vec::new();
        }

        // An inner spike still open when the parent closes ends with the parent
        let parent_end = samples[end].timestamp;
        scan(inside, self.config.inner_thresholds(), max_gap)
            .iter()
            .map(|excursion| {
                let mut event = to_event(inside, excursion, offset, Vec::new());
                if event.end_time.is_none() {
                    event.end_time = Some(parent_end);
                    event.sample_count += 1;
                }
                event
            })
            .collect()
    }
}

/// Detect spikes with the given thresholds and no gap guard
pub fn detect_spikes(series: &Series, thresholds: SpikeThresholds) -> Result<Vec<SpikeEvent>> {
    SpikeDetector::new(SpikeConfig::new(thresholds))?.detect(series)
}

/// Single forward pass over `samples`, baseline anchored at the first sample
fn scan(
    samples: &[TemperatureSample],
    thresholds: &SpikeThresholds,
    max_gap: Option<f64>,
) -> Vec<Excursion> {
    let mut excursions = Vec::new();
    let Some(first) = samples.first() else {
        return excursions;
    };

    let mut baseline = first.value;
    let mut state = State::Normal;

    for i in 1..samples.len() {
        let sample = samples[i];

        if let Some(max_gap) = max_gap {
            let gap = seconds_between(samples[i - 1].timestamp, sample.timestamp);
            if gap > max_gap {
                if let State::InSpike(mut excursion) = state {
                    // Terminate at the last sample before the gap
                    if i - 1 > excursion.start {
                        excursion.end = Some(i - 1);
                        excursions.push(excursion);
                    } else {
                        log::debug!(
                            "discarding spike opened at {} interrupted by a {:.0}s gap",
                            samples[excursion.start].timestamp,
                            gap
                        );
                    }
                }
                baseline = sample.value;
                state = State::Normal;
                continue;
            }
        }

        state = match state {
            State::Normal => {
                let opened = [Direction::Up, Direction::Down]
                    .into_iter()
                    .find(|&direction| {
                        direction.departure(baseline, sample.value) >= thresholds.band(direction).0
                    });

                match opened {
                    Some(direction) => State::InSpike(Excursion {
                        direction,
                        start: i,
                        end: None,
                        baseline,
                        extreme: sample.value,
                    }),
                    None => State::Normal,
                }
            }
            State::InSpike(mut excursion) => {
                let direction = excursion.direction;
                excursion.extreme = direction.more_extreme(excursion.extreme, sample.value);

                if direction.departure(excursion.baseline, sample.value)
                    < thresholds.exit_level(direction)
                {
                    excursion.end = Some(i);
                    excursions.push(excursion);
                    baseline = sample.value;
                    State::Normal
                } else {
                    State::InSpike(excursion)
                }
            }
        };
    }

    if let State::InSpike(excursion) = state {
        excursions.push(excursion);
    }

    excursions
}

/// Convert a scanned excursion to an event; `offset` maps slice indices back to the series
fn to_event(
    samples: &[TemperatureSample],
    excursion: &Excursion,
    offset: usize,
    inner_spikes: Vec<SpikeEvent>,
) -> SpikeEvent {
    let last = excursion.end.unwrap_or(samples.len() - 1);
    log::trace!(
        "{} spike at series index {}..={}",
        excursion.direction,
        excursion.start + offset,
        last + offset
    );

    SpikeEvent {
        direction: excursion.direction,
        start_time: samples[excursion.start].timestamp,
        end_time: excursion.end.map(|end| samples[end].timestamp),
        baseline_value: excursion.baseline,
        extreme_value: excursion.extreme,
        magnitude: (excursion.extreme - excursion.baseline).abs(),
        sample_count: last - excursion.start + 1,
        inner_spikes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
    }

    fn hourly(values: &[f64]) -> Series {
        Series::from_values("test", t0(), Duration::hours(1), values).unwrap()
    }

    fn at(hours: i64) -> DateTime<Utc> {
        t0() + Duration::hours(hours)
    }

    fn default_detector() -> SpikeDetector {
        SpikeDetector::new(SpikeConfig::default()).unwrap()
    }

    #[test]
    fn test_single_up_spike_with_hysteresis() {
        let series = hourly(&[10.0, 10.6, 10.4, 10.35, 10.1]);
        let spikes = default_detector().detect(&series).unwrap();

        assert_eq!(spikes.len(), 1);
        let spike = &spikes[0];
        assert_eq!(spike.direction, Direction::Up);
        assert_eq!(spike.baseline_value, 10.0);
        assert_eq!(spike.extreme_value, 10.6);
        assert_abs_diff_eq!(spike.magnitude, 0.6, epsilon = 1e-12);
        assert_eq!(spike.start_time, at(1));
        // 10.4 and 10.35 are still inside the relax band; 10.1 closes
        assert_eq!(spike.end_time, Some(at(4)));
        assert_eq!(spike.sample_count, 4);
    }

    #[test]
    fn test_spike_stays_open_at_series_end() {
        let series = hourly(&[10.0, 10.6, 10.45, 10.35]);
        let spikes = default_detector().detect(&series).unwrap();

        assert_eq!(spikes.len(), 1);
        assert!(spikes[0].is_open());
        assert_eq!(spikes[0].extreme_value, 10.6);
        assert_eq!(spikes[0].sample_count, 3);
        assert!(spikes[0].inner_spikes.is_empty());
    }

    #[test]
    fn test_below_entry_bar_never_opens() {
        let values: Vec<f64> = (0..50)
            .map(|i| if i == 0 { 10.0 } else if i % 2 == 0 { 10.45 } else { 10.49 })
            .collect();
        let spikes = default_detector().detect(&hourly(&values)).unwrap();
        assert!(spikes.is_empty());
    }

    #[test]
    fn test_no_flicker_around_entry_bar() {
        // Crossing the bar once opens a spike; oscillating near it never closes and reopens
        let values: Vec<f64> = (0..50)
            .map(|i| if i == 0 { 10.0 } else if i % 2 == 0 { 10.51 } else { 10.49 })
            .collect();
        let spikes = default_detector().detect(&hourly(&values)).unwrap();
        assert_eq!(spikes.len(), 1);
        assert!(spikes[0].is_open());
        assert_eq!(spikes[0].start_time, at(2));
    }

    #[test]
    fn test_down_spike() {
        let series = hourly(&[15.0, 14.8, 14.3, 14.1, 14.6, 14.9]);
        let spikes = default_detector().detect(&series).unwrap();

        assert_eq!(spikes.len(), 1);
        let spike = &spikes[0];
        assert_eq!(spike.direction, Direction::Down);
        assert_eq!(spike.baseline_value, 15.0);
        assert_eq!(spike.extreme_value, 14.1);
        assert_eq!(spike.start_time, at(2));
        // 14.6 is 0.4 below baseline (not yet inside 0.3), 14.9 closes
        assert_eq!(spike.end_time, Some(at(5)));
    }

    #[test]
    fn test_baseline_reanchors_after_close() {
        // First spike closes at 10.1; second must clear 0.5 above 10.1, not above 10.0
        let series = hourly(&[10.0, 10.8, 10.1, 10.55, 10.7, 10.2]);
        let spikes = default_detector().detect(&series).unwrap();

        assert_eq!(spikes.len(), 2);
        assert_eq!(spikes[0].end_time, Some(at(2)));
        assert_eq!(spikes[1].baseline_value, 10.1);
        assert_eq!(spikes[1].start_time, at(4));
        assert_eq!(spikes[1].extreme_value, 10.7);
        assert_eq!(spikes[1].end_time, Some(at(5)));
    }

    #[test]
    fn test_inner_spike_in_decay_phase() {
        let series = hourly(&[10.0, 12.0, 11.0, 11.8, 11.1, 10.1]);
        let spikes = default_detector().detect(&series).unwrap();

        assert_eq!(spikes.len(), 1);
        let parent = &spikes[0];
        assert_eq!(parent.start_time, at(1));
        assert_eq!(parent.end_time, Some(at(5)));
        assert_eq!(parent.extreme_value, 12.0);

        assert_eq!(parent.inner_spikes.len(), 1);
        let inner = &parent.inner_spikes[0];
        assert_eq!(inner.direction, Direction::Up);
        assert_eq!(inner.baseline_value, 11.0);
        assert_eq!(inner.extreme_value, 11.8);
        assert_eq!(inner.start_time, at(3));
        assert_eq!(inner.end_time, Some(at(4)));
        assert!(inner.inner_spikes.is_empty());
        assert_eq!(parent.strongest_inner().unwrap().start_time, at(3));
    }

    #[test]
    fn test_inner_spike_open_at_parent_close_ends_with_parent() {
        let series = hourly(&[10.0, 12.0, 11.0, 11.8, 11.7, 10.1]);
        let spikes = default_detector().detect(&series).unwrap();

        assert_eq!(spikes.len(), 1);
        let parent = &spikes[0];
        assert_eq!(parent.end_time, Some(at(5)));

        assert_eq!(parent.inner_spikes.len(), 1);
        let inner = &parent.inner_spikes[0];
        assert_eq!(inner.start_time, at(3));
        assert_eq!(inner.end_time, parent.end_time);
        assert!(inner.is_closed());
        assert_eq!(inner.extreme_value, 11.8);
        assert_eq!(inner.sample_count, 3);
    }

    #[test]
    fn test_inner_thresholds_configured_independently() {
        let series = hourly(&[10.0, 12.0, 11.0, 11.8, 11.1, 10.1]);
        let strict_inner = SpikeThresholds::new(1.0, 0.2, 1.0, 0.2).unwrap();
        let detector =
            SpikeDetector::new(SpikeConfig::default().with_inner(strict_inner)).unwrap();
        let spikes = detector.detect(&series).unwrap();

        assert_eq!(spikes.len(), 1);
        assert!(spikes[0].inner_spikes.is_empty());
    }

    #[test]
    fn test_insufficient_data() {
        let single = hourly(&[10.0]);
        assert_eq!(
            default_detector().detect(&single),
            Err(AnalysisError::InsufficientData { needed: 2, got: 1 })
        );

        let empty = Series::new("empty", Vec::new()).unwrap();
        assert!(matches!(
            default_detector().detect(&empty),
            Err(AnalysisError::InsufficientData { got: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_configuration_rejected_before_detection() {
        let thresholds = SpikeThresholds {
            up_threshold: 0.5,
            up_relax: 0.6,
            down_threshold: 0.5,
            down_relax: 0.2,
        };
        let series = hourly(&[10.0, 11.0]);
        assert!(matches!(
            detect_spikes(&series, thresholds),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_gap_terminates_spike() {
        let mut samples: Vec<TemperatureSample> = [10.0, 10.8, 10.9, 10.7]
            .iter()
            .enumerate()
            .map(|(i, &v)| TemperatureSample::new(at(i as i64), v))
            .collect();
        // Six hour hole, then data well above the old baseline
        samples.push(TemperatureSample::new(at(9), 11.5));
        samples.push(TemperatureSample::new(at(10), 11.6));
        let series = Series::new("gappy", samples).unwrap();

        let detector = SpikeDetector::new(
            SpikeConfig::default().with_max_gap(Duration::minutes(90)),
        )
        .unwrap();
        let spikes = detector.detect(&series).unwrap();

        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].start_time, at(1));
        assert_eq!(spikes[0].end_time, Some(at(3)));
        assert_eq!(spikes[0].extreme_value, 10.9);

        // Without the guard the spike simply stays open across the hole
        let unguarded = default_detector().detect(&series).unwrap();
        assert_eq!(unguarded.len(), 1);
        assert!(unguarded[0].is_open());
        assert_eq!(unguarded[0].extreme_value, 11.6);
    }

    #[test]
    fn test_inner_spikes_contained_and_disjoint() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut value = 12.0;
        let values: Vec<f64> = (0..2000)
            .map(|_| {
                value += rng.random_range(-0.35..0.35);
                value
            })
            .collect();
        let series = hourly(&values);

        let spikes = default_detector().detect(&series).unwrap();
        assert!(!spikes.is_empty());

        for pair in spikes.windows(2) {
            let prev_end = pair[0].end_time.expect("only the last spike can be open");
            assert!(prev_end <= pair[1].start_time);
        }

        for spike in &spikes {
            if let Some(end) = spike.end_time {
                assert!(spike.start_time < end);
            } else {
                assert!(spike.inner_spikes.is_empty());
            }

            for inner in &spike.inner_spikes {
                let parent_end = spike.end_time.expect("open spikes have no inner spikes");
                let inner_end = inner.end_time.expect("inner spikes are always closed");
                assert!(inner.start_time > spike.start_time);
                assert!(inner.start_time < inner_end);
                assert!(inner_end <= parent_end);
                assert!(inner.inner_spikes.is_empty());
            }
            for pair in spike.inner_spikes.windows(2) {
                assert!(pair[0].end_time.unwrap() <= pair[1].start_time);
            }
        }
    }
}
