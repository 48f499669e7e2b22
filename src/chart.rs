use serde::Serialize;

use crate::aggregate::round_rate;
use crate::models::{AttendanceStatus, DateSeries, StatusCounts};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Doughnut,
    Bar,
}

/// A Chart.js configuration object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartConfig {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub data: ChartData,
    pub options: ChartOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub labels: Vec<String>,
    pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Colors {
    Single(String),
    PerItem(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub data: Vec<usize>,
    pub background_color: Colors,
    pub border_color: Colors,
    pub border_width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOptions {
    pub responsive: bool,
    pub maintain_aspect_ratio: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scales: Option<Scales>,
    pub plugins: Plugins,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scales {
    pub x: Axis,
    pub y: Axis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Axis {
    pub stacked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub begin_at_zero: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticks: Option<Ticks>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticks {
    pub step_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plugins {
    pub legend: Legend,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Legend {
    pub position: String,
}

fn status_color(status: AttendanceStatus, alpha: &str) -> String {
    let (r, g, b) = match status {
        AttendanceStatus::Present => (40, 167, 69),
        AttendanceStatus::Late => (255, 193, 7),
        AttendanceStatus::Absent => (220, 53, 69),
    };
    format!("rgba({r}, {g}, {b}, {alpha})")
}

fn base_options(scales: Option<Scales>) -> ChartOptions {
    ChartOptions {
        responsive: true,
        maintain_aspect_ratio: false,
        scales,
        plugins: Plugins {
            legend: Legend {
                position: "bottom".to_string(),
            },
        },
    }
}

/// Text for one slice of the status doughnut, e.g. `Late: 1 (20%)`.
pub fn slice_label(counts: &StatusCounts, status: AttendanceStatus) -> String {
    format!(
        "{}: {} ({}%)",
        status,
        counts.get(status),
        round_rate(counts.share(status))
    )
}

pub fn status_doughnut(counts: &StatusCounts) -> ChartConfig {
    let statuses = AttendanceStatus::ALL;

    ChartConfig {
        kind: ChartKind::Doughnut,
        data: ChartData {
            labels: statuses.iter().map(|s| s.label().to_string()).collect(),
            datasets: vec![Dataset {
                label: None,
                data: statuses.iter().map(|s| counts.get(*s)).collect(),
                background_color: Colors::PerItem(
                    statuses.iter().map(|s| status_color(*s, "0.8")).collect(),
                ),
                border_color: Colors::PerItem(
                    statuses.iter().map(|s| status_color(*s, "1")).collect(),
                ),
                border_width: 1,
            }],
        },
        options: base_options(None),
    }
}

/// One stacked bar per date, in the series' own date order.
pub fn stacked_bar(series: &DateSeries) -> ChartConfig {
    let datasets = AttendanceStatus::ALL
        .iter()
        .map(|status| Dataset {
            label: Some(status.label().to_string()),
            data: series.series(*status).to_vec(),
            background_color: Colors::Single(status_color(*status, "0.8")),
            border_color: Colors::Single(status_color(*status, "1")),
            border_width: 1,
        })
        .collect();

    ChartConfig {
        kind: ChartKind::Bar,
        data: ChartData {
            labels: series
                .dates
                .iter()
                .map(|date| date.format("%Y-%m-%d").to_string())
                .collect(),
            datasets,
        },
        options: base_options(Some(Scales {
            x: Axis {
                stacked: true,
                begin_at_zero: None,
                ticks: None,
            },
            y: Axis {
                stacked: true,
                begin_at_zero: Some(true),
                ticks: Some(Ticks { step_size: 1 }),
            },
        })),
    }
}
