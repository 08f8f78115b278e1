use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::period::Term;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: Uuid,
    pub full_name: String,
    pub registration_number: String,
    pub class_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Course {
    pub id: Uuid,
    pub code: String,
    pub name: String,
}

/// One graded assessment. `score <= max_score` is expected but not enforced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub class_id: Uuid,
    pub academic_year: String,
    pub term: Term,
    pub exam_type: String,
    pub score: f64,
    pub max_score: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Excused => "excused",
        }
    }

    /// Late arrivals count as attended everywhere a rate is computed.
    pub fn is_attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown attendance status `{0}`")]
pub struct UnknownStatus(pub String);

impl FromStr for AttendanceStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            "late" => Ok(AttendanceStatus::Late),
            "excused" => Ok(AttendanceStatus::Excused),
            _ => Err(UnknownStatus(value.to_string())),
        }
    }
}

/// One daily mark. Time of day is never kept.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceRecord {
    pub student_id: Uuid,
    pub class_id: Uuid,
    pub course_id: Option<Uuid>,
    pub date: NaiveDate,
    pub status: AttendanceStatus,
    pub remarks: Option<String>,
    pub marked_by: Option<String>,
}
