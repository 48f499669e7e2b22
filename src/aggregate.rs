use std::collections::HashMap;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

use crate::models::{
    AttendanceRecord, AttendanceStatus, AttendanceSummary, DateSeries, RecordStatus,
    StatusCounts, StudentId, StudentSummary,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusPolicy {
    #[default]
    Ignore,
    Reject,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("record {index} has unrecognized status {label:?}")]
    UnrecognizedStatus { index: usize, label: String },
    #[error("record {index} has no status")]
    MissingStatus { index: usize },
    #[error("record {index} has no date")]
    MissingDate { index: usize },
}

fn classify(
    index: usize,
    record: &AttendanceRecord,
) -> Result<(NaiveDate, AttendanceStatus), AggregateError> {
    let status = match &record.status {
        RecordStatus::Known(status) => *status,
        RecordStatus::Unrecognized(label) => {
            return Err(AggregateError::UnrecognizedStatus {
                index,
                label: label.clone(),
            })
        }
        RecordStatus::Missing => return Err(AggregateError::MissingStatus { index }),
    };
    let date = record.date.ok_or(AggregateError::MissingDate { index })?;
    Ok((date, status))
}

fn countable(
    records: &[AttendanceRecord],
) -> impl Iterator<Item = (usize, NaiveDate, AttendanceStatus)> + '_ {
    records
        .iter()
        .enumerate()
        .filter_map(|(index, record)| match classify(index, record) {
            Ok((date, status)) => Some((index, date, status)),
            Err(reason) => {
                debug!(%reason, "skipping record");
                None
            }
        })
}

pub fn compute_status_counts(records: &[AttendanceRecord]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for (_, _, status) in countable(records) {
        counts.increment(status);
    }
    counts
}

pub fn compute_attendance_rate(counts: &StatusCounts, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (counts.present + counts.late) as f64 / total as f64 * 100.0
}

pub fn round_rate(rate: f64) -> u32 {
    rate.round().clamp(0.0, 100.0) as u32
}

/// Every dated record puts its date on the axis in first-seen order, even
/// when its status is not one that gets tallied.
pub fn build_date_series(records: &[AttendanceRecord]) -> DateSeries {
    let mut series = DateSeries::default();
    let mut positions: HashMap<NaiveDate, usize> = HashMap::new();

    for record in records {
        let Some(date) = record.date else {
            continue;
        };
        let index = *positions.entry(date).or_insert_with(|| {
            series.dates.push(date);
            series.present.push(0);
            series.late.push(0);
            series.absent.push(0);
            series.dates.len() - 1
        });

        match record.status {
            RecordStatus::Known(AttendanceStatus::Present) => series.present[index] += 1,
            RecordStatus::Known(AttendanceStatus::Late) => series.late[index] += 1,
            RecordStatus::Known(AttendanceStatus::Absent) => series.absent[index] += 1,
            _ => {}
        }
    }

    series
}

pub fn summarize(
    records: &[AttendanceRecord],
    policy: StatusPolicy,
) -> Result<AttendanceSummary, AggregateError> {
    if policy == StatusPolicy::Reject {
        for (index, record) in records.iter().enumerate() {
            classify(index, record)?;
        }
    }

    let counts = compute_status_counts(records);
    let total = counts.total();

    Ok(AttendanceSummary {
        counts,
        total,
        attendance_rate: compute_attendance_rate(&counts, total),
        series: build_date_series(records),
        skipped: records.len() - total,
    })
}

/// Counts per student, students in first-seen order. Records without a
/// student id are left out.
pub fn summarize_by_student(records: &[AttendanceRecord]) -> Vec<StudentSummary> {
    let mut positions: HashMap<StudentId, usize> = HashMap::new();
    let mut students: Vec<StudentSummary> = Vec::new();

    for (index, _, status) in countable(records) {
        let record = &records[index];
        let Some(student_id) = &record.student_id else {
            continue;
        };

        let position = *positions.entry(student_id.clone()).or_insert_with(|| {
            students.push(StudentSummary {
                student_id: student_id.clone(),
                display_id: record.display_id.clone(),
                name: record.name.clone(),
                counts: StatusCounts::default(),
                attendance_rate: 0.0,
            });
            students.len() - 1
        });
        students[position].counts.increment(status);
    }

    for student in students.iter_mut() {
        student.attendance_rate =
            compute_attendance_rate(&student.counts, student.counts.total());
    }

    students
}
