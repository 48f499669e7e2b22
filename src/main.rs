use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

mod aggregate;
mod chart;
mod models;
mod recognition;
mod report;
mod source;

use aggregate::StatusPolicy;
use chart::ChartKind;
use models::{AttendanceRecord, AttendanceStatus, AttendanceSummary, DateSeries, StudentId};
use recognition::{AttendanceSession, Frame, FrameOutcome, LabelledFrames, SessionConfig, Student};
use source::InputFormat;

#[derive(Parser)]
#[command(name = "attendance-insights")]
#[command(about = "Attendance statistics and chart data for class attendance exports", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// API response body (.json) or attendance export (.csv)
    #[arg(long)]
    input: PathBuf,
    /// Input format, when the extension does not say
    #[arg(long, value_enum)]
    format: Option<InputFormat>,
    /// Fail on records with a missing date or unrecognized status
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print status counts and the attendance rate
    Summary {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print per-date status counts
    Series {
        #[command(flatten)]
        input: InputArgs,
        /// Sort dates by calendar order instead of first appearance
        #[arg(long)]
        chronological: bool,
        /// Emit the series as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print counts and rate per student
    Students {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Write a Chart.js configuration
    Chart {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value_t = ChartKind::Doughnut)]
        kind: ChartKind,
        #[arg(long)]
        chronological: bool,
        #[arg(long, default_value = "chart.json")]
        out: PathBuf,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        chronological: bool,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Build a day's records from a roster and a log of recognized faces
    Mark {
        /// CSV with id,display_id,name
        #[arg(long)]
        roster: PathBuf,
        /// CSV with captured_at,student_id (blank id for frames with no face)
        #[arg(long)]
        detections: PathBuf,
        #[arg(long)]
        date: NaiveDate,
        /// Arrivals after this time (HH:MM:SS) are marked Late
        #[arg(long)]
        late_after: Option<NaiveTime>,
        #[arg(long, default_value_t = 5)]
        cooldown_secs: i64,
        /// CSV with student_id,status,time_in applied after the detections
        #[arg(long)]
        overrides: Option<PathBuf>,
        #[arg(long, default_value = "attendance.json")]
        out: PathBuf,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

struct Loaded {
    records: Vec<AttendanceRecord>,
    summary: AttendanceSummary,
    dropped: usize,
}

fn load(input: &InputArgs) -> anyhow::Result<Loaded> {
    let response = source::load_file(&input.input, input.format)?;
    let policy = if input.strict {
        StatusPolicy::Reject
    } else {
        StatusPolicy::Ignore
    };
    let summary = aggregate::summarize(&response.records, policy)
        .with_context(|| format!("rejected records in {}", input.input.display()))?;

    info!(
        counted = summary.total,
        skipped = summary.skipped,
        dates = summary.series.len(),
        "Aggregated attendance"
    );

    if let Some(stats) = &response.stats {
        for mismatch in source::reconcile(stats, &summary.counts) {
            warn!(
                field = mismatch.field,
                reported = mismatch.reported,
                computed = mismatch.computed,
                "Backend stats disagree with the records"
            );
        }
    }

    Ok(Loaded {
        records: response.records,
        summary,
        dropped: response.dropped,
    })
}

fn ordered(series: DateSeries, chronological: bool) -> DateSeries {
    if chronological {
        series.sorted_chronologically()
    } else {
        series
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn mark(
    roster: &Path,
    detections: &Path,
    overrides: Option<&Path>,
    date: NaiveDate,
    config: SessionConfig,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    #[derive(serde::Deserialize)]
    struct DetectionRow {
        captured_at: NaiveDateTime,
        student_id: Option<String>,
    }

    #[derive(serde::Deserialize)]
    struct OverrideRow {
        student_id: String,
        status: String,
        time_in: Option<NaiveTime>,
    }

    let mut reader = csv::Reader::from_path(roster)
        .with_context(|| format!("failed to open roster {}", roster.display()))?;
    let students = reader
        .deserialize::<Student>()
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("invalid roster {}", roster.display()))?;

    let mut session = AttendanceSession::new(date, students, config);
    let mut marked = 0usize;

    let mut reader = csv::Reader::from_path(detections)
        .with_context(|| format!("failed to open detections {}", detections.display()))?;
    for result in reader.deserialize::<DetectionRow>() {
        let row = result?;
        let frame = Frame {
            data: row.student_id.unwrap_or_default().into_bytes(),
            captured_at: row.captured_at,
        };
        if let FrameOutcome::Marked { .. } = session.process_frame(&LabelledFrames, &frame) {
            marked += 1;
        }
    }

    if let Some(path) = overrides {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open overrides {}", path.display()))?;
        for result in reader.deserialize::<OverrideRow>() {
            let row = result?;
            let status = AttendanceStatus::from_label(&row.status)
                .with_context(|| format!("unknown status {:?} in {}", row.status, path.display()))?;
            let id = StudentId::new(row.student_id);
            if !session.set_status(&id, status, row.time_in) {
                warn!(student = %id, "override for a student not on the roster");
            }
        }
    }

    info!(date = %session.date(), marked, "Roll call complete");
    Ok(session.records())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Summary { input } => {
            let Loaded {
                summary, dropped, ..
            } = load(&input)?;
            println!("Total: {}", summary.total);
            println!("Present: {}", summary.counts.present);
            println!("Late: {}", summary.counts.late);
            println!("Absent: {}", summary.counts.absent);
            println!(
                "Attendance rate: {}%",
                aggregate::round_rate(summary.attendance_rate)
            );
            if summary.skipped > 0 {
                println!("Skipped: {}", summary.skipped);
            }
            if dropped > 0 {
                println!("Unreadable: {dropped}");
            }
        }
        Commands::Series {
            input,
            chronological,
            json,
        } => {
            let summary = load(&input)?.summary;
            let series = ordered(summary.series, chronological);

            if json {
                println!("{}", serde_json::to_string_pretty(&series)?);
            } else if series.is_empty() {
                println!("No dated records found.");
            } else {
                for (date, counts) in series.iter() {
                    println!(
                        "{date}  present {}  late {}  absent {}",
                        counts.present, counts.late, counts.absent
                    );
                }
            }
        }
        Commands::Students { input } => {
            let records = load(&input)?.records;
            let students = aggregate::summarize_by_student(&records);

            if students.is_empty() {
                println!("No students identified in these records.");
                return Ok(());
            }

            for student in &students {
                println!(
                    "- {} ({}) present {} late {} absent {} rate {}%",
                    student.name.as_deref().unwrap_or("unknown"),
                    student.student_id,
                    student.counts.present,
                    student.counts.late,
                    student.counts.absent,
                    aggregate::round_rate(student.attendance_rate)
                );
            }
        }
        Commands::Chart {
            input,
            kind,
            chronological,
            out,
        } => {
            let summary = load(&input)?.summary;
            let config = match kind {
                ChartKind::Doughnut => chart::status_doughnut(&summary.counts),
                ChartKind::Bar => chart::stacked_bar(&ordered(summary.series, chronological)),
            };
            write_json(&out, &config)?;
            println!("Chart written to {}.", out.display());
        }
        Commands::Report {
            input,
            title,
            chronological,
            out,
        } => {
            let Loaded {
                records,
                summary,
                dropped,
            } = load(&input)?;
            let students = aggregate::summarize_by_student(&records);
            let series = ordered(summary.series.clone(), chronological);
            let report =
                report::build_report(title.as_deref(), &summary, dropped, &series, &students);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Mark {
            roster,
            detections,
            date,
            late_after,
            cooldown_secs,
            overrides,
            out,
        } => {
            let config = SessionConfig {
                cooldown: Duration::seconds(cooldown_secs.max(0)),
                late_after,
            };
            let records = mark(&roster, &detections, overrides.as_deref(), date, config)?;
            write_json(&out, &records)?;
            println!("Wrote {} records to {}.", records.len(), out.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordStatus;

    #[test]
    fn mark_keeps_zero_padded_ids_and_applies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let roster = dir.path().join("roster.csv");
        let detections = dir.path().join("detections.csv");
        let overrides = dir.path().join("overrides.csv");

        std::fs::write(
            &roster,
            "id,display_id,name\n007,0007,Avery Lee\n012,0012,Jules Moreno\n013,0013,Kiara Patel\n",
        )
        .unwrap();
        std::fs::write(
            &detections,
            "captured_at,student_id\n2024-03-04T08:00:00,007\n2024-03-04T08:00:10,\n",
        )
        .unwrap();
        std::fs::write(
            &overrides,
            "student_id,status,time_in\n012,Late,08:40:00\n999,Present,\n",
        )
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let records = mark(
            &roster,
            &detections,
            Some(&overrides),
            date,
            SessionConfig::default(),
        )
        .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(records[0].student_id, Some(StudentId::new("007")));
        assert_eq!(records[0].display_id.as_deref(), Some("0007"));
        assert_eq!(records[0].status, RecordStatus::Known(AttendanceStatus::Present));
        assert_eq!(records[0].time_in.as_deref(), Some("08:00:00"));
        assert_eq!(records[1].status, RecordStatus::Known(AttendanceStatus::Late));
        assert_eq!(records[1].time_in.as_deref(), Some("08:40:00"));
        assert_eq!(records[2].status, RecordStatus::Known(AttendanceStatus::Absent));
    }

    #[test]
    fn mark_rejects_unknown_override_status() {
        let dir = tempfile::tempdir().unwrap();
        let roster = dir.path().join("roster.csv");
        let detections = dir.path().join("detections.csv");
        let overrides = dir.path().join("overrides.csv");

        std::fs::write(&roster, "id,display_id,name\n1,S-001,Avery Lee\n").unwrap();
        std::fs::write(&detections, "captured_at,student_id\n").unwrap();
        std::fs::write(&overrides, "student_id,status,time_in\n1,Excused,\n").unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let result = mark(
            &roster,
            &detections,
            Some(&overrides),
            date,
            SessionConfig::default(),
        );
        assert!(result.is_err());
    }
}
