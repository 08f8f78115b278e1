use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::aggregate::{self, serialize_rounded, serialize_rounded_opt, AttendanceStat, ScoreStat};
use crate::models::{AttendanceRecord, ScoreRecord};
use crate::period::{self, Term};

/// Relative change needed before a period counts as better or worse.
pub const TREND_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
        })
    }
}

/// A period aggregate that can be compared against another one.
pub trait Measured {
    fn sample_count(&self) -> usize;
    fn measure(&self) -> f64;
}

impl Measured for AttendanceStat {
    fn sample_count(&self) -> usize {
        self.total
    }

    fn measure(&self) -> f64 {
        self.attendance_rate
    }
}

impl Measured for ScoreStat {
    fn sample_count(&self) -> usize {
        self.count
    }

    fn measure(&self) -> f64 {
        self.average_percentage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrendOutcome {
    pub trend: Trend,
    #[serde(serialize_with = "serialize_rounded")]
    pub current: f64,
    #[serde(serialize_with = "serialize_rounded_opt")]
    pub previous: Option<f64>,
    /// Set when there was no baseline period to compare against.
    pub no_prior_data: bool,
}

impl TrendOutcome {
    fn without_baseline(current: f64) -> Self {
        Self {
            trend: Trend::Stable,
            current,
            previous: None,
            no_prior_data: true,
        }
    }
}

pub fn classify_change(current: f64, previous: f64) -> Trend {
    if current > previous * (1.0 + TREND_THRESHOLD) {
        Trend::Improving
    } else if current < previous * (1.0 - TREND_THRESHOLD) {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

pub fn detect_trend<S: Measured>(current: &S, previous: &S) -> TrendOutcome {
    if previous.sample_count() == 0 {
        return TrendOutcome::without_baseline(current.measure());
    }

    TrendOutcome {
        trend: classify_change(current.measure(), previous.measure()),
        current: current.measure(),
        previous: Some(previous.measure()),
        no_prior_data: false,
    }
}

fn scores_for_term<'a>(
    records: &'a [ScoreRecord],
    academic_year: &'a str,
    term: Term,
) -> impl Iterator<Item = &'a ScoreRecord> {
    records
        .iter()
        .filter(move |r| r.academic_year == academic_year && r.term == term)
}

/// Average-percentage trend of `(academic_year, term)` against the term before it.
pub fn term_trend(records: &[ScoreRecord], academic_year: &str, term: Term) -> TrendOutcome {
    let current = aggregate::aggregate_scores(scores_for_term(records, academic_year, term));

    match period::previous_term(academic_year, term) {
        Some((previous_year, previous_term)) => {
            let previous =
                aggregate::aggregate_scores(scores_for_term(records, &previous_year, previous_term));
            detect_trend(&current, &previous)
        }
        None => TrendOutcome::without_baseline(current.measure()),
    }
}

/// Attendance-rate trend of the month to date against the previous full month.
pub fn monthly_attendance_trend(records: &[AttendanceRecord], today: NaiveDate) -> TrendOutcome {
    let current_window = period::current_month(today);
    let previous_window = period::previous_month(today);

    let current =
        aggregate::aggregate_attendance(records.iter().filter(|r| current_window.contains(r.date)));
    let previous =
        aggregate::aggregate_attendance(records.iter().filter(|r| previous_window.contains(r.date)));
    detect_trend(&current, &previous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceStatus;
    use uuid::Uuid;

    fn stat(total: usize, rate: f64) -> AttendanceStat {
        AttendanceStat {
            total,
            attendance_rate: rate,
            ..AttendanceStat::default()
        }
    }

    fn final_exam(year: &str, term: Term, score: f64) -> ScoreRecord {
        ScoreRecord {
            student_id: Uuid::nil(),
            course_id: Uuid::nil(),
            class_id: Uuid::nil(),
            academic_year: year.to_string(),
            term,
            exam_type: "Final Exam".to_string(),
            score,
            max_score: 100.0,
            remarks: None,
        }
    }

    fn mark(y: i32, m: u32, d: u32, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            student_id: Uuid::nil(),
            class_id: Uuid::nil(),
            course_id: None,
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            status,
            remarks: None,
            marked_by: None,
        }
    }

    #[test]
    fn five_percent_relative_threshold() {
        assert_eq!(classify_change(80.0, 70.0), Trend::Improving);
        assert_eq!(classify_change(72.0, 70.0), Trend::Stable);
        assert_eq!(classify_change(60.0, 70.0), Trend::Declining);
        assert_eq!(classify_change(73.5, 70.0), Trend::Stable);
    }

    #[test]
    fn detect_trend_compares_measures() {
        let outcome = detect_trend(&stat(10, 80.0), &stat(10, 70.0));
        assert_eq!(outcome.trend, Trend::Improving);
        assert_eq!(outcome.previous, Some(70.0));
        assert!(!outcome.no_prior_data);
    }

    #[test]
    fn empty_baseline_is_stable_with_flag() {
        let outcome = detect_trend(&stat(10, 40.0), &stat(0, 0.0));
        assert_eq!(outcome.trend, Trend::Stable);
        assert!(outcome.no_prior_data);
        assert_eq!(outcome.previous, None);
    }

    #[test]
    fn term_trend_compares_against_previous_year_third_term() {
        let records = vec![
            final_exam("2022-2023", Term::Three, 60.0),
            final_exam("2023-2024", Term::One, 80.0),
            final_exam("2023-2024", Term::Two, 10.0),
        ];

        let outcome = term_trend(&records, "2023-2024", Term::One);
        assert_eq!(outcome.trend, Trend::Improving);
        assert_eq!(outcome.previous, Some(60.0));
    }

    #[test]
    fn term_trend_detects_decline_within_year() {
        let records = vec![
            final_exam("2023-2024", Term::One, 80.0),
            final_exam("2023-2024", Term::Two, 60.0),
        ];

        let outcome = term_trend(&records, "2023-2024", Term::Two);
        assert_eq!(outcome.trend, Trend::Declining);
    }

    #[test]
    fn unparseable_year_skips_trend() {
        let records = vec![final_exam("current", Term::One, 80.0)];

        let outcome = term_trend(&records, "current", Term::One);
        assert_eq!(outcome.trend, Trend::Stable);
        assert!(outcome.no_prior_data);
        assert!((outcome.current - 80.0).abs() < 1e-9);
    }

    #[test]
    fn monthly_attendance_uses_calendar_months() {
        let records = vec![
            mark(2024, 2, 1, AttendanceStatus::Present),
            mark(2024, 2, 29, AttendanceStatus::Absent),
            mark(2024, 3, 4, AttendanceStatus::Present),
            mark(2024, 3, 5, AttendanceStatus::Late),
            mark(2024, 3, 20, AttendanceStatus::Absent),
            mark(2024, 1, 31, AttendanceStatus::Absent),
        ];

        let outcome = monthly_attendance_trend(&records, NaiveDate::from_ymd_opt(2024, 3, 10).unwrap());
        assert_eq!(outcome.trend, Trend::Improving);
        assert!((outcome.current - 100.0).abs() < 1e-9);
        assert_eq!(outcome.previous, Some(50.0));
    }

    #[test]
    fn trend_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Trend::Declining).unwrap(), "\"declining\"");
    }
}
