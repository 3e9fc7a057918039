//! Correlating spikes with an external schedule of time intervals
//!
//! A schedule is a list of labelled `[start, end]` windows, for example vessel
//! presence at a berth. A spike relates to every window it intersects.

use crate::spikes::{Direction, SpikeEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// A labelled time window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleInterval {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ScheduleInterval {
    pub fn new(label: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            label: label.into(),
            start,
            end,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.start < self.end
    }

    /// Standard interval intersection test against `[start, end]`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start < self.end && self.start < end
    }
}

/// One spike and the schedule labels overlapping it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeRelation {
    pub location: String,
    pub spike_index: usize,
    pub direction: Direction,
    pub start: DateTime<Utc>,
    /// End used for the overlap test; open spikes run to the end of the series
    pub end: DateTime<Utc>,
    pub labels: Vec<String>,
}

/// Schedule intervals intersecting a spike
///
/// Open spikes are treated as lasting until `series_end`.
pub fn overlapping_intervals<'a>(
    event: &SpikeEvent,
    intervals: &'a [ScheduleInterval],
    series_end: DateTime<Utc>,
) -> Vec<&'a ScheduleInterval> {
    let end = event.effective_end(series_end);
    intervals
        .iter()
        .filter(|interval| interval.is_valid() && interval.overlaps(event.start_time, end))
        .collect()
}

/// Relate every spike of one location to the schedule
pub fn relate_spikes(
    location: &str,
    spikes: &[SpikeEvent],
    intervals: &[ScheduleInterval],
    series_end: DateTime<Utc>,
) -> Vec<SpikeRelation> {
    let invalid = intervals.iter().filter(|i| !i.is_valid()).count();
    if invalid > 0 {
        log::warn!("ignoring {} schedule intervals that end before they start", invalid);
    }

    let relations: Vec<SpikeRelation> = spikes
        .iter()
        .enumerate()
        .map(|(spike_index, spike)| SpikeRelation {
            location: location.to_string(),
            spike_index,
            direction: spike.direction,
            start: spike.start_time,
            end: spike.effective_end(series_end),
            labels: overlapping_intervals(spike, intervals, series_end)
                .into_iter()
                .map(|interval| interval.label.clone())
                .collect(),
        })
        .collect();

    let related = relations.iter().filter(|r| !r.labels.is_empty()).count();
    log::info!(
        "{}: {} of {} spikes overlap the schedule",
        location,
        related,
        relations.len()
    );

    relations
}
