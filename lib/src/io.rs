//! Loading temperature series and schedules from delimited text files

use crate::error::AnalysisError;
use crate::schedule::ScheduleInterval;
use crate::series::{Series, TemperatureSample};
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parse a timestamp in one of the accepted layouts, interpreted as UTC
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Split data lines into trimmed fields, skipping the header and blank lines
fn data_rows<R: BufRead>(reader: R) -> impl Iterator<Item = Result<(usize, Vec<String>)>> {
    reader
        .lines()
        .enumerate()
        .skip(1)
        .filter_map(|(idx, line)| {
            let line_no = idx + 1;
            match line {
                Err(e) => Some(Err(AnalysisError::from(e))),
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(Ok((
                    line_no,
                    line.split(',').map(|f| f.trim().to_string()).collect(),
                ))),
            }
        })
}

fn field<'a>(fields: &'a [String], index: usize, line: usize, name: &str) -> Result<&'a str> {
    fields
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| AnalysisError::Parse {
            line,
            message: format!("missing {} column", name),
        })
}

fn timestamp_field(fields: &[String], index: usize, line: usize, name: &str) -> Result<DateTime<Utc>> {
    let text = field(fields, index, line, name)?;
    parse_timestamp(text).ok_or_else(|| AnalysisError::Parse {
        line,
        message: format!("unrecognised {} '{}'", name, text),
    })
}

/// Read `timestamp,value` rows after a header line
///
/// The result is sorted and free of duplicate timestamps. Non-finite values
/// are rejected rather than skipped.
pub fn parse_csv<R: BufRead>(reader: R, location: &str) -> Result<Series> {
    let mut samples = Vec::new();

    for row in data_rows(reader) {
        let (line, fields) = row?;
        let timestamp = timestamp_field(&fields, 0, line, "timestamp")?;
        let text = field(&fields, 1, line, "value")?;
        let value = text.parse::<f64>().map_err(|e| AnalysisError::Parse {
            line,
            message: format!("invalid value '{}': {}", text, e),
        })?;
        samples.push(TemperatureSample::new(timestamp, value));
    }

    log::debug!("{}: parsed {} rows", location, samples.len());
    Series::from_unsorted(location, samples)
}

/// Load a series from a CSV file
pub fn load_csv<P: AsRef<Path>>(path: P, location: &str) -> Result<Series> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| AnalysisError::Io(format!("{}: {}", path.display(), e)))?;
    let series = parse_csv(BufReader::new(file), location)?;

    log::info!(
        "Loaded {} samples for {} from {}",
        series.len(),
        location,
        path.display()
    );
    Ok(series)
}

/// Read `label,start,end` rows after a header line
pub fn parse_schedule<R: BufRead>(reader: R) -> Result<Vec<ScheduleInterval>> {
    let mut intervals = Vec::new();

    for row in data_rows(reader) {
        let (line, fields) = row?;
        let label = field(&fields, 0, line, "label")?;
        let start = timestamp_field(&fields, 1, line, "start")?;
        let end = timestamp_field(&fields, 2, line, "end")?;
        intervals.push(ScheduleInterval::new(label, start, end));
    }

    Ok(intervals)
}

/// Load a schedule from a CSV file
pub fn load_schedule_csv<P: AsRef<Path>>(path: P) -> Result<Vec<ScheduleInterval>> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| AnalysisError::Io(format!("{}: {}", path.display(), e)))?;
    let intervals = parse_schedule(BufReader::new(file))?;

    log::info!(
        "Loaded {} schedule intervals from {}",
        intervals.len(),
        path.display()
    );
    Ok(intervals)
}
