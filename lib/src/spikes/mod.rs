//! Hysteresis-based spike detection
//!
//! A spike opens when a sample departs from the current baseline by at least
//! the entry threshold and closes once the departure falls back inside the
//! smaller relax-adjusted band. Each closed spike re-anchors the baseline and
//! is searched once more for secondary ("inner") spikes.

pub mod config;
pub mod detector;
pub mod event;

pub use config::{SpikeConfig, SpikeThresholds};
pub use detector::{detect_spikes, SpikeDetector};
pub use event::{Direction, SpikeEvent, SpikeSummary};
