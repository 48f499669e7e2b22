use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::{debug, info};

use crate::models::{AttendanceRecord, AttendanceStatus, StudentId};

/// A captured camera frame. The pixel encoding is up to the matcher.
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Vec<u8>,
    pub captured_at: NaiveDateTime,
}

/// Identifies the student visible in a frame, if any.
pub trait FaceMatcher {
    fn match_frame(&self, frame: &Frame) -> Option<StudentId>;
}

/// Reads frames whose payload is already the recognized student id, as
/// written by an external recognizer. An empty payload means no face.
#[derive(Debug, Clone, Copy, Default)]
pub struct LabelledFrames;

impl FaceMatcher for LabelledFrames {
    fn match_frame(&self, frame: &Frame) -> Option<StudentId> {
        let label = std::str::from_utf8(&frame.data).ok()?.trim();
        if label.is_empty() {
            None
        } else {
            Some(StudentId::new(label))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct Student {
    pub id: StudentId,
    pub display_id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Minimum gap between two recognitions.
    pub cooldown: Duration,
    /// Arrivals after this time are marked Late instead of Present.
    pub late_after: Option<NaiveTime>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::seconds(5),
            late_after: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    CoolingDown,
    NoFace,
    NoAbsentMatch(StudentId),
    Marked {
        student: StudentId,
        status: AttendanceStatus,
        time_in: NaiveTime,
    },
}

#[derive(Debug, Clone)]
struct Entry {
    student: Student,
    status: AttendanceStatus,
    time_in: Option<NaiveTime>,
}

/// One day's roll call. Everyone starts Absent and is moved to Present or
/// Late as the matcher recognizes them.
#[derive(Debug, Clone)]
pub struct AttendanceSession {
    date: NaiveDate,
    config: SessionConfig,
    entries: Vec<Entry>,
    last_recognized: Option<NaiveDateTime>,
}

impl AttendanceSession {
    pub fn new(date: NaiveDate, roster: Vec<Student>, config: SessionConfig) -> Self {
        let entries = roster
            .into_iter()
            .map(|student| Entry {
                student,
                status: AttendanceStatus::Absent,
                time_in: None,
            })
            .collect();

        Self {
            date,
            config,
            entries,
            last_recognized: None,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn process_frame<M: FaceMatcher + ?Sized>(
        &mut self,
        matcher: &M,
        frame: &Frame,
    ) -> FrameOutcome {
        if let Some(last) = self.last_recognized {
            if frame.captured_at - last < self.config.cooldown {
                return FrameOutcome::CoolingDown;
            }
        }

        let Some(id) = matcher.match_frame(frame) else {
            return FrameOutcome::NoFace;
        };

        let late_after = self.config.late_after;
        let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.student.id == id && entry.status == AttendanceStatus::Absent)
        else {
            debug!(student = %id, "face matched but no absent student on the roster");
            return FrameOutcome::NoAbsentMatch(id);
        };

        let time_in = frame.captured_at.time();
        let status = match late_after {
            Some(cutoff) if time_in > cutoff => AttendanceStatus::Late,
            _ => AttendanceStatus::Present,
        };
        entry.status = status;
        entry.time_in = Some(time_in);
        self.last_recognized = Some(frame.captured_at);

        info!(student = %id, name = %entry.student.name, %status, "Attendance marked");
        FrameOutcome::Marked {
            student: id,
            status,
            time_in,
        }
    }

    /// Manual override from the marking form. Returns false for unknown ids.
    pub fn set_status(
        &mut self,
        id: &StudentId,
        status: AttendanceStatus,
        time_in: Option<NaiveTime>,
    ) -> bool {
        match self.entries.iter_mut().find(|entry| &entry.student.id == id) {
            Some(entry) => {
                entry.status = status;
                entry.time_in = match status {
                    AttendanceStatus::Absent => None,
                    _ => time_in.or(entry.time_in),
                };
                true
            }
            None => false,
        }
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.entries
            .iter()
            .map(|entry| {
                let mut record = AttendanceRecord::new(self.date, entry.status);
                record.student_id = Some(entry.student.id.clone());
                record.display_id = Some(entry.student.display_id.clone());
                record.name = Some(entry.student.name.clone());
                record.time_in = entry.time_in.map(|time| time.format("%H:%M:%S").to_string());
                record
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::aggregate::compute_status_counts;
    use crate::models::{RecordStatus, StatusCounts};

    /// Matches frames by their first byte.
    struct ByteMatcher(HashMap<u8, StudentId>);

    impl FaceMatcher for ByteMatcher {
        fn match_frame(&self, frame: &Frame) -> Option<StudentId> {
            frame.data.first().and_then(|byte| self.0.get(byte).cloned())
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn frame(byte: u8, hour: u32, min: u32, sec: u32) -> Frame {
        Frame {
            data: vec![byte],
            captured_at: day().and_hms_opt(hour, min, sec).unwrap(),
        }
    }

    fn roster() -> Vec<Student> {
        vec![
            Student {
                id: StudentId::new("1"),
                display_id: "S-001".to_string(),
                name: "Avery Lee".to_string(),
            },
            Student {
                id: StudentId::new("2"),
                display_id: "S-002".to_string(),
                name: "Jules Moreno".to_string(),
            },
        ]
    }

    fn matcher() -> ByteMatcher {
        ByteMatcher(HashMap::from([
            (1, StudentId::new("1")),
            (2, StudentId::new("2")),
            (9, StudentId::new("9")),
        ]))
    }

    #[test]
    fn everyone_starts_absent() {
        let session = AttendanceSession::new(day(), roster(), SessionConfig::default());
        let counts = compute_status_counts(&session.records());
        assert_eq!(counts, StatusCounts::new(0, 0, 2));
    }

    #[test]
    fn recognized_student_is_marked_present() {
        let mut session = AttendanceSession::new(day(), roster(), SessionConfig::default());

        let outcome = session.process_frame(&matcher(), &frame(1, 8, 0, 0));
        assert_eq!(
            outcome,
            FrameOutcome::Marked {
                student: StudentId::new("1"),
                status: AttendanceStatus::Present,
                time_in: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            }
        );

        let records = session.records();
        assert_eq!(records[0].time_in.as_deref(), Some("08:00:00"));
        assert_eq!(records[1].time_in, None);
    }

    #[test]
    fn cooldown_blocks_back_to_back_frames() {
        let mut session = AttendanceSession::new(day(), roster(), SessionConfig::default());
        let matcher = matcher();

        session.process_frame(&matcher, &frame(1, 8, 0, 0));
        assert_eq!(
            session.process_frame(&matcher, &frame(2, 8, 0, 3)),
            FrameOutcome::CoolingDown
        );
        assert!(matches!(
            session.process_frame(&matcher, &frame(2, 8, 0, 5)),
            FrameOutcome::Marked { .. }
        ));
    }

    #[test]
    fn unmatched_and_already_marked_faces_change_nothing() {
        let mut session = AttendanceSession::new(day(), roster(), SessionConfig::default());
        let matcher = matcher();

        assert_eq!(session.process_frame(&matcher, &frame(0, 8, 0, 0)), FrameOutcome::NoFace);
        assert_eq!(
            session.process_frame(&matcher, &frame(9, 8, 0, 0)),
            FrameOutcome::NoAbsentMatch(StudentId::new("9"))
        );

        session.process_frame(&matcher, &frame(1, 8, 0, 0));
        assert_eq!(
            session.process_frame(&matcher, &frame(1, 8, 1, 0)),
            FrameOutcome::NoAbsentMatch(StudentId::new("1"))
        );
    }

    #[test]
    fn arrivals_after_cutoff_are_late() {
        let config = SessionConfig {
            late_after: NaiveTime::from_hms_opt(8, 30, 0),
            ..SessionConfig::default()
        };
        let mut session = AttendanceSession::new(day(), roster(), config);
        let matcher = matcher();

        session.process_frame(&matcher, &frame(1, 8, 15, 0));
        session.process_frame(&matcher, &frame(2, 8, 45, 0));

        let records = session.records();
        assert_eq!(records[0].status, RecordStatus::Known(AttendanceStatus::Present));
        assert_eq!(records[1].status, RecordStatus::Known(AttendanceStatus::Late));
        assert_eq!(records[1].time_in.as_deref(), Some("08:45:00"));
        assert_eq!(compute_status_counts(&records), StatusCounts::new(1, 1, 0));
    }

    #[test]
    fn labelled_frames_carry_their_student() {
        let labelled = Frame {
            data: b" 2 ".to_vec(),
            captured_at: day().and_hms_opt(8, 0, 0).unwrap(),
        };
        assert_eq!(LabelledFrames.match_frame(&labelled), Some(StudentId::new("2")));

        let blank = Frame {
            data: Vec::new(),
            captured_at: day().and_hms_opt(8, 0, 0).unwrap(),
        };
        assert_eq!(LabelledFrames.match_frame(&blank), None);
    }

    #[test]
    fn manual_override_clears_time_for_absent() {
        let mut session = AttendanceSession::new(day(), roster(), SessionConfig::default());
        session.process_frame(&matcher(), &frame(1, 8, 0, 0));

        assert!(session.set_status(&StudentId::new("1"), AttendanceStatus::Absent, None));
        assert_eq!(session.records()[0].time_in, None);
        assert!(!session.set_status(&StudentId::new("7"), AttendanceStatus::Late, None));
        assert_eq!(session.date(), day());
    }
}
