use std::fmt;

use chrono::NaiveDate;
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 3] = [
        AttendanceStatus::Present,
        AttendanceStatus::Late,
        AttendanceStatus::Absent,
    ];

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Present" => Some(AttendanceStatus::Present),
            "Late" => Some(AttendanceStatus::Late),
            "Absent" => Some(AttendanceStatus::Absent),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The status a record arrived with. Anything outside the closed set is kept
/// verbatim so callers can report it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum RecordStatus {
    Known(AttendanceStatus),
    Unrecognized(String),
    #[default]
    Missing,
}

impl From<AttendanceStatus> for RecordStatus {
    fn from(status: AttendanceStatus) -> Self {
        RecordStatus::Known(status)
    }
}

impl From<Option<String>> for RecordStatus {
    fn from(value: Option<String>) -> Self {
        match value {
            None => RecordStatus::Missing,
            Some(label) => match AttendanceStatus::from_label(&label) {
                Some(status) => RecordStatus::Known(status),
                None => RecordStatus::Unrecognized(label),
            },
        }
    }
}

impl From<RecordStatus> for Option<String> {
    fn from(value: RecordStatus) -> Self {
        match value {
            RecordStatus::Known(status) => Some(status.label().to_string()),
            RecordStatus::Unrecognized(label) => Some(label),
            RecordStatus::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StudentId(String);

impl StudentId {
    pub fn new(id: impl Into<String>) -> Self {
        StudentId(id.into())
    }
}

impl fmt::Display for StudentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseText {
    Text(String),
    Integer(i64),
    Other(IgnoredAny),
}

// JSON sends ids as numbers or strings; anything else in a presentation
// field becomes None instead of failing the whole record.
fn loose_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<LooseText>::deserialize(deserializer)?.and_then(|value| match value {
            LooseText::Text(text) => Some(text),
            LooseText::Integer(number) => Some(number.to_string()),
            LooseText::Other(_) => None,
        }),
    )
}

fn loose_id<'de, D>(deserializer: D) -> Result<Option<StudentId>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(loose_text(deserializer)?.map(StudentId::new))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "loose_id")]
    pub student_id: Option<StudentId>,
    #[serde(default, deserialize_with = "loose_text")]
    pub display_id: Option<String>,
    #[serde(default, deserialize_with = "loose_text")]
    pub name: Option<String>,
    #[serde(default)]
    pub status: RecordStatus,
    #[serde(default, deserialize_with = "loose_text")]
    pub time_in: Option<String>,
}

impl AttendanceRecord {
    pub fn new(date: NaiveDate, status: impl Into<RecordStatus>) -> Self {
        Self {
            date: Some(date),
            student_id: None,
            display_id: None,
            name: None,
            status: status.into(),
            time_in: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceStats {
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub present: u64,
    #[serde(default)]
    pub late: u64,
    #[serde(default)]
    pub absent: u64,
    #[serde(default)]
    pub attendance_rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub present: usize,
    pub late: usize,
    pub absent: usize,
}

impl StatusCounts {
    pub fn new(present: usize, late: usize, absent: usize) -> Self {
        Self {
            present,
            late,
            absent,
        }
    }

    pub fn get(&self, status: AttendanceStatus) -> usize {
        match status {
            AttendanceStatus::Present => self.present,
            AttendanceStatus::Late => self.late,
            AttendanceStatus::Absent => self.absent,
        }
    }

    pub fn increment(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Late => self.late += 1,
            AttendanceStatus::Absent => self.absent += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.present + self.late + self.absent
    }

    pub fn share(&self, status: AttendanceStatus) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.get(status) as f64 / total as f64 * 100.0
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DateSeries {
    pub dates: Vec<NaiveDate>,
    pub present: Vec<usize>,
    pub late: Vec<usize>,
    pub absent: Vec<usize>,
}

impl DateSeries {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn series(&self, status: AttendanceStatus) -> &[usize] {
        match status {
            AttendanceStatus::Present => &self.present,
            AttendanceStatus::Late => &self.late,
            AttendanceStatus::Absent => &self.absent,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, StatusCounts)> + '_ {
        self.dates
            .iter()
            .enumerate()
            .map(|(index, date)| {
                (
                    *date,
                    StatusCounts::new(self.present[index], self.late[index], self.absent[index]),
                )
            })
    }

    /// Copy of the series with dates in calendar order. The aggregator itself
    /// always keeps first-seen order.
    pub fn sorted_chronologically(&self) -> DateSeries {
        let mut rows: Vec<(NaiveDate, StatusCounts)> = self.iter().collect();
        rows.sort_by_key(|(date, _)| *date);

        let mut sorted = DateSeries::default();
        for (date, counts) in rows {
            sorted.dates.push(date);
            sorted.present.push(counts.present);
            sorted.late.push(counts.late);
            sorted.absent.push(counts.absent);
        }
        sorted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub counts: StatusCounts,
    pub total: usize,
    pub attendance_rate: f64,
    pub series: DateSeries,
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentSummary {
    pub student_id: StudentId,
    pub display_id: Option<String>,
    pub name: Option<String>,
    pub counts: StatusCounts,
    pub attendance_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn status_labels_are_case_sensitive() {
        assert_eq!(
            AttendanceStatus::from_label("Late"),
            Some(AttendanceStatus::Late)
        );
        assert_eq!(AttendanceStatus::from_label("late"), None);
        assert_eq!(AttendanceStatus::from_label(""), None);
    }

    #[test]
    fn record_decodes_numeric_and_text_ids() {
        let record: AttendanceRecord = serde_json::from_str(
            r#"{"date":"2024-01-03","student_id":17,"display_id":"S-017","name":"Avery Lee","status":"Late","time_in":"08:12:00"}"#,
        )
        .unwrap();
        assert_eq!(record.date, Some(date(3)));
        assert_eq!(record.student_id, Some(StudentId::new("17")));
        assert_eq!(record.display_id.as_deref(), Some("S-017"));
        assert_eq!(record.status, RecordStatus::Known(AttendanceStatus::Late));

        let record: AttendanceRecord =
            serde_json::from_str(r#"{"student_id":"A9","display_id":1009}"#).unwrap();
        assert_eq!(record.student_id, Some(StudentId::new("A9")));
        assert_eq!(record.display_id.as_deref(), Some("1009"));
        assert_eq!(record.date, None);
        assert_eq!(record.status, RecordStatus::Missing);
    }

    #[test]
    fn wrong_typed_presentation_fields_do_not_drop_the_record() {
        let record: AttendanceRecord = serde_json::from_str(
            r#"{"date":"2024-01-01","student_id":true,"name":123,"display_id":{"a":1},"status":"Present","time_in":800}"#,
        )
        .unwrap();
        assert_eq!(record.status, RecordStatus::Known(AttendanceStatus::Present));
        assert_eq!(record.name.as_deref(), Some("123"));
        assert_eq!(record.time_in.as_deref(), Some("800"));
        assert_eq!(record.display_id, None);
        assert_eq!(record.student_id, None);

        let record: AttendanceRecord =
            serde_json::from_str(r#"{"date":"2024-01-01","status":"Late","time_in":8.5}"#)
                .unwrap();
        assert_eq!(record.time_in, None);
    }

    #[test]
    fn unrecognized_status_keeps_its_label() {
        let record: AttendanceRecord =
            serde_json::from_str(r#"{"date":"2024-01-01","status":"Excused"}"#).unwrap();
        assert_eq!(
            record.status,
            RecordStatus::Unrecognized("Excused".to_string())
        );

        let record: AttendanceRecord =
            serde_json::from_str(r#"{"date":"2024-01-01","status":null}"#).unwrap();
        assert_eq!(record.status, RecordStatus::Missing);
    }

    #[test]
    fn share_is_zero_for_empty_counts() {
        let counts = StatusCounts::default();
        assert_eq!(counts.share(AttendanceStatus::Present), 0.0);

        let counts = StatusCounts::new(1, 1, 2);
        assert_eq!(counts.share(AttendanceStatus::Absent), 50.0);
    }

    #[test]
    fn chronological_sort_moves_counts_with_dates() {
        let series = DateSeries {
            dates: vec![date(5), date(2), date(9)],
            present: vec![1, 2, 3],
            late: vec![0, 1, 0],
            absent: vec![4, 0, 1],
        };

        let sorted = series.sorted_chronologically();
        assert_eq!(sorted.dates, vec![date(2), date(5), date(9)]);
        assert_eq!(sorted.present, vec![2, 1, 3]);
        assert_eq!(sorted.late, vec![1, 0, 0]);
        assert_eq!(sorted.absent, vec![0, 4, 1]);
        assert_eq!(series.dates[0], date(5));
    }
}
