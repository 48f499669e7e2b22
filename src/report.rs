use std::fmt::Write;

use crate::aggregate::round_rate;
use crate::chart::slice_label;
use crate::models::{AttendanceStatus, AttendanceSummary, DateSeries, StudentSummary};

fn display_name(student: &StudentSummary) -> String {
    match (&student.name, &student.display_id) {
        (Some(name), Some(display_id)) => format!("{name} ({display_id})"),
        (Some(name), None) => name.clone(),
        (None, Some(display_id)) => display_id.clone(),
        (None, None) => format!("student {}", student.student_id),
    }
}

pub fn build_report(
    title: Option<&str>,
    summary: &AttendanceSummary,
    dropped: usize,
    series: &DateSeries,
    students: &[StudentSummary],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", title.unwrap_or("Attendance Report"));
    let _ = writeln!(
        output,
        "{} records counted, attendance rate {}%",
        summary.total,
        round_rate(summary.attendance_rate)
    );
    if summary.skipped > 0 {
        let _ = writeln!(
            output,
            "{} records skipped for a missing date or unrecognized status.",
            summary.skipped
        );
    }
    if dropped > 0 {
        let _ = writeln!(output, "{dropped} entries could not be read and were dropped.");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if summary.total == 0 {
        let _ = writeln!(output, "No attendance recorded.");
    } else {
        for status in AttendanceStatus::ALL {
            let _ = writeln!(output, "- {}", slice_label(&summary.counts, status));
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Date");

    if series.is_empty() {
        let _ = writeln!(output, "No dates in this window.");
    } else {
        let _ = writeln!(output, "| Date | Present | Late | Absent |");
        let _ = writeln!(output, "| --- | --- | --- | --- |");
        for (date, counts) in series.iter() {
            let _ = writeln!(
                output,
                "| {} | {} | {} | {} |",
                date, counts.present, counts.late, counts.absent
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## By Student");

    if students.is_empty() {
        let _ = writeln!(output, "No students identified in these records.");
    } else {
        for student in students {
            let _ = writeln!(
                output,
                "- {}: {} present, {} late, {} absent ({}%)",
                display_name(student),
                student.counts.present,
                student.counts.late,
                student.counts.absent,
                round_rate(student.attendance_rate)
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::aggregate::{summarize, summarize_by_student, StatusPolicy};
    use crate::models::{AttendanceRecord, RecordStatus, StudentId};

    fn record(day: u32, student: &str, name: &str, status: &str) -> AttendanceRecord {
        let mut record = AttendanceRecord::new(
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            RecordStatus::from(Some(status.to_string())),
        );
        record.student_id = Some(StudentId::new(student));
        record.name = Some(name.to_string());
        record
    }

    #[test]
    fn report_lists_mix_dates_and_students() {
        let records = vec![
            record(5, "1", "Avery Lee", "Present"),
            record(5, "2", "Jules Moreno", "Late"),
            record(4, "1", "Avery Lee", "Absent"),
            record(4, "2", "Jules Moreno", "Present"),
            record(4, "3", "Kiara Patel", "Excused"),
        ];
        let summary = summarize(&records, StatusPolicy::Ignore).unwrap();
        let students = summarize_by_student(&records);

        let report = build_report(Some("Week 10"), &summary, 2, &summary.series, &students);

        assert!(report.starts_with("# Week 10\n"));
        assert!(report.contains("4 records counted, attendance rate 75%"));
        assert!(report.contains("1 records skipped"));
        assert!(report.contains("2 entries could not be read and were dropped."));
        assert!(report.contains("- Late: 1 (25%)"));
        assert!(report.contains("| 2024-03-05 | 1 | 1 | 0 |"));
        assert!(report.find("2024-03-05").unwrap() < report.find("2024-03-04").unwrap());
        assert!(report.contains("- Avery Lee: 1 present, 0 late, 1 absent (50%)"));
        assert!(!report.contains("Kiara Patel"));
    }

    #[test]
    fn empty_report_says_so() {
        let summary = summarize(&[], StatusPolicy::Ignore).unwrap();
        let report = build_report(None, &summary, 0, &summary.series, &[]);

        assert!(report.starts_with("# Attendance Report\n"));
        assert!(report.contains("0 records counted, attendance rate 0%"));
        assert!(report.contains("No attendance recorded."));
        assert!(report.contains("No dates in this window."));
        assert!(report.contains("No students identified"));
        assert!(!report.contains("dropped"));
    }
}
