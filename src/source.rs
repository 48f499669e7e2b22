use std::io;
use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::aggregate::{compute_attendance_rate, round_rate};
use crate::models::{AttendanceRecord, AttendanceStats, RecordStatus, StatusCounts, StudentId};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid json: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("expected an object or an array of records, found {0}")]
    UnexpectedShape(&'static str),
    #[error("`attendance_records` must be an array, found {0}")]
    RecordsNotArray(&'static str),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum InputFormat {
    Json,
    Csv,
}

impl InputFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(InputFormat::Json),
            "csv" => Some(InputFormat::Csv),
            _ => None,
        }
    }
}

/// A decoded attendance payload: whatever records could be read, the
/// backend's own stats if it sent any, and how many entries were unreadable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttendanceResponse {
    pub records: Vec<AttendanceRecord>,
    pub stats: Option<AttendanceStats>,
    pub dropped: usize,
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn decode_records(entries: Vec<Value>) -> (Vec<AttendanceRecord>, usize) {
    let mut records = Vec::with_capacity(entries.len());
    let mut dropped = 0usize;

    for (index, entry) in entries.into_iter().enumerate() {
        if !entry.is_object() {
            debug!(index, kind = kind_of(&entry), "dropping non-object record");
            dropped += 1;
            continue;
        }
        match serde_json::from_value::<AttendanceRecord>(entry) {
            Ok(record) => records.push(record),
            Err(error) => {
                debug!(index, %error, "dropping undecodable record");
                dropped += 1;
            }
        }
    }

    (records, dropped)
}

/// Parses a `/api/date_attendance` or `/api/student_attendance` body, or a
/// bare array of records.
pub fn parse_response(body: &str) -> Result<AttendanceResponse, SourceError> {
    let value: Value = serde_json::from_str(body)?;

    match value {
        Value::Array(entries) => {
            let (records, dropped) = decode_records(entries);
            Ok(AttendanceResponse {
                records,
                stats: None,
                dropped,
            })
        }
        Value::Object(mut object) => {
            let stats = object
                .remove("stats")
                .and_then(|stats| match serde_json::from_value::<AttendanceStats>(stats) {
                    Ok(stats) => Some(stats),
                    Err(error) => {
                        debug!(%error, "ignoring unreadable stats");
                        None
                    }
                });

            let entries = match object.remove("attendance_records") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(entries)) => entries,
                Some(other) => return Err(SourceError::RecordsNotArray(kind_of(&other))),
            };
            let (records, dropped) = decode_records(entries);

            Ok(AttendanceResponse {
                records,
                stats,
                dropped,
            })
        }
        other => Err(SourceError::UnexpectedShape(kind_of(&other))),
    }
}

// Every column is read as raw text so ids like "007" keep their zeros.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    date: Option<NaiveDate>,
    #[serde(default)]
    student_id: Option<String>,
    #[serde(default)]
    display_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    time_in: Option<String>,
}

impl From<CsvRow> for AttendanceRecord {
    fn from(row: CsvRow) -> Self {
        AttendanceRecord {
            date: row.date,
            student_id: row.student_id.map(StudentId::new),
            display_id: row.display_id,
            name: row.name,
            status: RecordStatus::from(row.status),
            time_in: row.time_in,
        }
    }
}

/// Reads records from a CSV export with a header row
/// (`date,student_id,display_id,name,status,time_in`).
pub fn parse_csv<R: io::Read>(reader: R) -> Result<AttendanceResponse, SourceError> {
    let mut reader = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    let mut dropped = 0usize;

    for (index, result) in reader.deserialize::<CsvRow>().enumerate() {
        match result {
            Ok(row) => records.push(row.into()),
            Err(error) if matches!(error.kind(), csv::ErrorKind::Deserialize { .. }) => {
                debug!(index, %error, "dropping undecodable row");
                dropped += 1;
            }
            Err(error) => return Err(error.into()),
        }
    }

    Ok(AttendanceResponse {
        records,
        stats: None,
        dropped,
    })
}

pub fn load_file(path: &Path, format: Option<InputFormat>) -> anyhow::Result<AttendanceResponse> {
    let format = format
        .or_else(|| InputFormat::from_path(path))
        .with_context(|| {
            format!(
                "cannot tell the format of {}; pass --format json or --format csv",
                path.display()
            )
        })?;

    let response = match format {
        InputFormat::Json => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            parse_response(&body)?
        }
        InputFormat::Csv => {
            let file = std::fs::File::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            parse_csv(file)?
        }
    };

    info!(
        path = %path.display(),
        records = response.records.len(),
        dropped = response.dropped,
        "Loaded attendance records"
    );
    Ok(response)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsMismatch {
    pub field: &'static str,
    pub reported: u64,
    pub computed: usize,
}

/// Fields where the backend's stats disagree with what the records add up to.
/// Rates are compared as displayed, rounded to whole percents.
pub fn reconcile(stats: &AttendanceStats, counts: &StatusCounts) -> Vec<StatsMismatch> {
    let mut fields = vec![
        ("total", stats.total, counts.total()),
        ("present", stats.present, counts.present),
        ("late", stats.late, counts.late),
        ("absent", stats.absent, counts.absent),
    ];
    if let Some(rate) = stats.attendance_rate {
        let computed = round_rate(compute_attendance_rate(counts, counts.total()));
        fields.push(("attendance_rate", round_rate(rate) as u64, computed as usize));
    }

    fields
        .into_iter()
        .filter(|(_, reported, computed)| *reported != *computed as u64)
        .map(|(field, reported, computed)| StatsMismatch {
            field,
            reported,
            computed,
        })
        .collect()
}
