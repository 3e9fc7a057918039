//! Spike events produced by the detector

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a temperature excursion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn name(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Signed departure of `value` from `baseline`, positive when moving in this direction
    pub fn departure(&self, baseline: f64, value: f64) -> f64 {
        match self {
            Direction::Up => value - baseline,
            Direction::Down => baseline - value,
        }
    }

    /// The more extreme of two values for this direction
    pub fn more_extreme(&self, a: f64, b: f64) -> f64 {
        match self {
            Direction::Up => a.max(b),
            Direction::Down => a.min(b),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_uppercase())
    }
}

/// One hysteresis excursion away from the baseline
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeEvent {
    pub direction: Direction,
    /// Timestamp of the sample that crossed the entry threshold
    pub start_time: DateTime<Utc>,
    /// Timestamp of the sample that fell back inside the relax band; `None` for an open spike
    pub end_time: Option<DateTime<Utc>>,
    pub baseline_value: f64,
    /// Maximum value for UP spikes, minimum for DOWN spikes
    pub extreme_value: f64,
    pub magnitude: f64,
    /// Samples from the opening sample to the closing (or last) sample, inclusive
    pub sample_count: usize,
    /// Secondary excursions inside this spike, in time order
    ///
    /// Inner spikes are always closed; one still running when this spike
    /// closes ends at this spike's `end_time`.
    pub inner_spikes: Vec<SpikeEvent>,
}

impl SpikeEvent {
    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn is_closed(&self) -> bool {
        self.end_time.is_some()
    }

    /// End time, treating an open spike as lasting until `series_end`
    pub fn effective_end(&self, series_end: DateTime<Utc>) -> DateTime<Utc> {
        self.end_time.unwrap_or(series_end)
    }

    /// Duration of a closed spike
    pub fn duration(&self) -> Option<Duration> {
        self.end_time.map(|end| end - self.start_time)
    }

    /// Inner spike with the largest magnitude
    pub fn strongest_inner(&self) -> Option<&SpikeEvent> {
        self.inner_spikes
            .iter()
            .max_by(|a, b| a.magnitude.total_cmp(&b.magnitude))
    }

    pub fn strongest_inner_magnitude(&self) -> f64 {
        self.strongest_inner().map_or(0.0, |s| s.magnitude)
    }
}

impl fmt::Display for SpikeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = match self.end_time {
            Some(end) => end.format("%Y-%m-%d %H:%M").to_string(),
            None => "open".to_string(),
        };
        write!(
            f,
            "{} {} -> {}: baseline {:.2}, extreme {:.2}, magnitude {:.2}, {} samples, {} inner",
            self.direction,
            self.start_time.format("%Y-%m-%d %H:%M"),
            end,
            self.baseline_value,
            self.extreme_value,
            self.magnitude,
            self.sample_count,
            self.inner_spikes.len()
        )
    }
}

/// Aggregate counts over a detection result
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpikeSummary {
    pub up_count: usize,
    pub down_count: usize,
    pub open_count: usize,
    pub inner_count: usize,
    pub max_up_magnitude: Option<f64>,
    pub max_down_magnitude: Option<f64>,
}

impl SpikeSummary {
    pub fn from_events(events: &[SpikeEvent]) -> Self {
        let mut summary = Self::default();

        for event in events {
            let slot = match event.direction {
                Direction::Up => {
                    summary.up_count += 1;
                    &mut summary.max_up_magnitude
                }
                Direction::Down => {
                    summary.down_count += 1;
                    &mut summary.max_down_magnitude
                }
            };
            *slot = Some(slot.map_or(event.magnitude, |m| m.max(event.magnitude)));

            if event.is_open() {
                summary.open_count += 1;
            }
            summary.inner_count += event.inner_spikes.len();
        }

        summary
    }
}

impl fmt::Display for SpikeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_mag = |m: Option<f64>| m.map_or("-".to_string(), |m| format!("{:.2}", m));
        write!(
            f,
            "Spikes: {} up (max {}), {} down (max {}), {} open, {} inner",
            self.up_count,
            fmt_mag(self.max_up_magnitude),
            self.down_count,
            fmt_mag(self.max_down_magnitude),
            self.open_count,
            self.inner_count
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(direction: Direction, magnitude: f64, end: Option<i64>) -> SpikeEvent {
        let t0 = Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap();
        SpikeEvent {
            direction,
            start_time: t0,
            end_time: end.map(|h| t0 + Duration::hours(h)),
            baseline_value: 10.0,
            extreme_value: 10.0 + magnitude,
            magnitude,
            sample_count: 3,
            inner_spikes: Vec::new(),
        }
    }

    #[test]
    fn test_direction_helpers() {
        assert_eq!(Direction::Up.departure(10.0, 10.7), 10.7 - 10.0);
        assert_eq!(Direction::Down.departure(10.0, 9.0), 1.0);
        assert_eq!(Direction::Up.more_extreme(1.0, 2.0), 2.0);
        assert_eq!(Direction::Down.more_extreme(1.0, 2.0), 1.0);
        assert_eq!(Direction::Down.to_string(), "DOWN");
    }

    #[test]
    fn test_strongest_inner() {
        let mut parent = event(Direction::Up, 2.0, Some(10));
        assert!(parent.strongest_inner().is_none());
        assert_eq!(parent.strongest_inner_magnitude(), 0.0);

        parent.inner_spikes = vec![
            event(Direction::Up, 0.6, Some(2)),
            event(Direction::Down, 0.9, Some(4)),
            event(Direction::Up, 0.7, Some(6)),
        ];
        assert_eq!(parent.strongest_inner().unwrap().direction, Direction::Down);
        assert_eq!(parent.strongest_inner_magnitude(), 0.9);
    }

    #[test]
    fn test_open_spike_effective_end() {
        let open = event(Direction::Up, 1.0, None);
        let series_end = open.start_time + Duration::hours(5);
        assert!(open.is_open());
        assert_eq!(open.duration(), None);
        assert_eq!(open.effective_end(series_end), series_end);
    }

    #[test]
    fn test_summary() {
        let events = vec![
            event(Direction::Up, 0.8, Some(2)),
            event(Direction::Up, 1.4, Some(3)),
            event(Direction::Down, 0.6, None),
        ];
        let summary = SpikeSummary::from_events(&events);
        assert_eq!(summary.up_count, 2);
        assert_eq!(summary.down_count, 1);
        assert_eq!(summary.open_count, 1);
        assert_eq!(summary.max_up_magnitude, Some(1.4));
        assert_eq!(summary.max_down_magnitude, Some(0.6));
    }
}
