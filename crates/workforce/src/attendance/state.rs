//! Per-day attendance record states and the transitions between them.

use crate::models::Attendance;
use attend_core::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    /// No punches recorded yet.
    Absent,
    /// Punched in, not yet out.
    PunchedIn,
    /// Both punches recorded.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PunchType {
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "OUT", alias = "out")]
    Out,
}

impl PunchType {
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_uppercase().as_str() {
            "IN" => Ok(PunchType::In),
            "OUT" => Ok(PunchType::Out),
            _ => Err(Error::validation(format!(
                "punch_type must be IN or OUT, got '{}'",
                value
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PunchType::In => "IN",
            PunchType::Out => "OUT",
        }
    }

    pub fn key_fragment(&self) -> &'static str {
        match self {
            PunchType::In => "in",
            PunchType::Out => "out",
        }
    }
}

impl std::fmt::Display for PunchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn status_of(record: &Attendance) -> AttendanceStatus {
    match (record.punch_in_time, record.punch_out_time) {
        (None, _) => AttendanceStatus::Absent,
        (Some(_), None) => AttendanceStatus::PunchedIn,
        (Some(_), Some(_)) => AttendanceStatus::Completed,
    }
}

/// Rejects transitions the state machine does not allow. The `Absent +
/// punch(OUT)` case is only an error once carry-forward lookup has failed;
/// callers try that first.
pub fn validate_transition(status: AttendanceStatus, punch: PunchType) -> Result<()> {
    match (status, punch) {
        (AttendanceStatus::Absent, PunchType::In) => Ok(()),
        (AttendanceStatus::PunchedIn, PunchType::Out) => Ok(()),
        (AttendanceStatus::PunchedIn, PunchType::In) => {
            Err(Error::validation("Already punched in"))
        }
        (AttendanceStatus::Completed, PunchType::In) => {
            Err(Error::validation("Already punched in"))
        }
        (AttendanceStatus::Completed, PunchType::Out) => {
            Err(Error::validation("Already punched out"))
        }
        (AttendanceStatus::Absent, PunchType::Out) => {
            Err(Error::validation("Must punch in first"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};

    fn record(punch_in: bool, punch_out: bool) -> Attendance {
        Attendance {
            attendance_id: 1,
            emp_id: 1,
            date: NaiveDate::from_ymd_opt(2023, 6, 15).unwrap(),
            ward_id: None,
            punch_in_time: punch_in.then(Utc::now),
            punch_out_time: punch_out.then(Utc::now),
            punch_in_image_ref: None,
            punch_out_image_ref: None,
            latitude_in: None,
            longitude_in: None,
            latitude_out: None,
            longitude_out: None,
            in_address: None,
            out_address: None,
            duration: None,
            punched_in_by: None,
            punched_out_by: None,
        }
    }

    #[test]
    fn status_follows_punch_fields() {
        assert_eq!(status_of(&record(false, false)), AttendanceStatus::Absent);
        assert_eq!(status_of(&record(true, false)), AttendanceStatus::PunchedIn);
        assert_eq!(status_of(&record(true, true)), AttendanceStatus::Completed);
    }

    #[test]
    fn allowed_transitions() {
        assert!(validate_transition(AttendanceStatus::Absent, PunchType::In).is_ok());
        assert!(validate_transition(AttendanceStatus::PunchedIn, PunchType::Out).is_ok());
    }

    #[test]
    fn double_punch_in_is_rejected() {
        let err = validate_transition(AttendanceStatus::PunchedIn, PunchType::In).unwrap_err();
        assert_eq!(err.message, "Already punched in");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn completed_record_rejects_both() {
        assert!(validate_transition(AttendanceStatus::Completed, PunchType::In).is_err());
        assert!(validate_transition(AttendanceStatus::Completed, PunchType::Out).is_err());
    }

    #[test]
    fn punch_out_without_punch_in_is_rejected() {
        let err = validate_transition(AttendanceStatus::Absent, PunchType::Out).unwrap_err();
        assert_eq!(err.message, "Must punch in first");
    }

    #[test]
    fn punch_type_parsing() {
        assert_eq!(PunchType::parse("IN").unwrap(), PunchType::In);
        assert_eq!(PunchType::parse("out").unwrap(), PunchType::Out);
        assert!(PunchType::parse("sideways").is_err());
    }
}
