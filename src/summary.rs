//! Dashboard summaries built on the aggregator and trend detector.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use crate::aggregate::{self, round_one_decimal, serialize_rounded, AttendanceStat, ScoreStat};
use crate::grading;
use crate::models::{AttendanceRecord, Course, ScoreRecord};
use crate::period::{self, DateWindow, Term};
use crate::trend::{self, TrendOutcome};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceSummary {
    pub overall: AttendanceStat,
    pub current_month: DateWindow,
    pub current: AttendanceStat,
    pub previous_month: DateWindow,
    pub previous: AttendanceStat,
    pub trend: TrendOutcome,
    pub daily: BTreeMap<NaiveDate, AttendanceStat>,
}

/// Marks dated after `today` are left out of every figure.
pub fn attendance_summary(records: &[AttendanceRecord], today: NaiveDate) -> AttendanceSummary {
    let current_month = period::current_month(today);
    let previous_month = period::previous_month(today);
    let records: Vec<AttendanceRecord> = records
        .iter()
        .filter(|r| r.date <= today)
        .cloned()
        .collect();

    AttendanceSummary {
        overall: aggregate::aggregate_attendance(&records),
        current_month,
        current: aggregate::aggregate_attendance(
            records.iter().filter(|r| current_month.contains(r.date)),
        ),
        previous_month,
        previous: aggregate::aggregate_attendance(
            records.iter().filter(|r| previous_month.contains(r.date)),
        ),
        trend: trend::monthly_attendance_trend(&records, today),
        daily: aggregate::attendance_by(&records, |r| r.date),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseAverage {
    pub course_id: Uuid,
    pub course_name: String,
    pub stat: ScoreStat,
    pub grade: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcademicSummary {
    pub academic_year: String,
    pub term: Term,
    pub courses: Vec<CourseAverage>,
    pub overall: ScoreStat,
    #[serde(serialize_with = "serialize_rounded")]
    pub overall_percentage: f64,
    pub overall_grade: &'static str,
    pub trend: TrendOutcome,
}

/// Running averages over every exam type for one term. Unlike the term
/// report, quizzes and assignments count here.
pub fn academic_summary(
    records: &[ScoreRecord],
    courses: &[Course],
    academic_year: &str,
    term: Term,
) -> AcademicSummary {
    let in_term: Vec<ScoreRecord> = records
        .iter()
        .filter(|r| r.academic_year == academic_year && r.term == term)
        .cloned()
        .collect();

    let course_averages: Vec<CourseAverage> = aggregate::scores_by(&in_term, |r| r.course_id)
        .into_iter()
        .map(|(course_id, stat)| CourseAverage {
            course_id,
            course_name: courses
                .iter()
                .find(|c| c.id == course_id)
                .map(|c| c.name.clone())
                .unwrap_or_else(|| course_id.to_string()),
            grade: grading::letter_grade(stat.average_percentage),
            stat,
        })
        .collect();

    let overall = aggregate::aggregate_scores(&in_term);

    AcademicSummary {
        academic_year: academic_year.to_string(),
        term,
        courses: course_averages,
        overall,
        overall_percentage: overall.average_percentage,
        overall_grade: grading::letter_grade(overall.average_percentage),
        trend: trend::term_trend(records, academic_year, term),
    }
}

fn describe_trend(outcome: &TrendOutcome) -> String {
    match outcome.previous {
        Some(previous) => format!(
            "{} ({:.1}% vs {:.1}%)",
            outcome.trend,
            round_one_decimal(outcome.current),
            round_one_decimal(previous)
        ),
        None => format!("{} (no prior data)", outcome.trend),
    }
}

pub fn render_attendance(summary: &AttendanceSummary) -> String {
    let mut output = String::new();
    let stat = &summary.overall;

    let _ = writeln!(
        output,
        "Attendance: {:.1}% over {} marks ({} present, {} late, {} absent, {} excused)",
        round_one_decimal(stat.attendance_rate),
        stat.total,
        stat.present,
        stat.late,
        stat.absent,
        stat.excused
    );
    let _ = writeln!(
        output,
        "This month ({} to {}): {:.1}%",
        summary.current_month.start,
        summary.current_month.end,
        round_one_decimal(summary.current.attendance_rate)
    );
    let _ = writeln!(
        output,
        "Last month ({} to {}): {:.1}%",
        summary.previous_month.start,
        summary.previous_month.end,
        round_one_decimal(summary.previous.attendance_rate)
    );
    let _ = writeln!(output, "Trend: {}", describe_trend(&summary.trend));

    if !summary.daily.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "Daily breakdown:");
        for (date, day) in summary.daily.iter().rev().take(14) {
            let _ = writeln!(
                output,
                "- {}: {:.1}% ({}/{})",
                date,
                round_one_decimal(day.attendance_rate),
                day.attended,
                day.total
            );
        }
    }

    output
}

pub fn render_academic(summary: &AcademicSummary) -> String {
    let mut output = String::new();

    let _ = writeln!(
        output,
        "{} {}: {:.1}% ({}) across {} assessments",
        summary.term,
        summary.academic_year,
        round_one_decimal(summary.overall_percentage),
        summary.overall_grade,
        summary.overall.count
    );
    let _ = writeln!(output, "Trend: {}", describe_trend(&summary.trend));

    if summary.courses.is_empty() {
        let _ = writeln!(output, "No scores recorded for this term.");
    } else {
        for course in &summary.courses {
            let _ = writeln!(
                output,
                "- {}: {:.1}% ({}) from {} assessments",
                course.course_name,
                round_one_decimal(course.stat.average_percentage),
                course.grade,
                course.stat.count
            );
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AttendanceStatus;
    use crate::trend::Trend;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn mark(day: NaiveDate, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            student_id: Uuid::from_u128(1),
            class_id: Uuid::from_u128(2),
            course_id: None,
            date: day,
            status,
            remarks: None,
            marked_by: Some("t.okafor".to_string()),
        }
    }

    fn scored(course_id: Uuid, year: &str, term: Term, exam_type: &str, score: f64) -> ScoreRecord {
        ScoreRecord {
            student_id: Uuid::from_u128(1),
            course_id,
            class_id: Uuid::from_u128(2),
            academic_year: year.to_string(),
            term,
            exam_type: exam_type.to_string(),
            score,
            max_score: 100.0,
            remarks: None,
        }
    }

    #[test]
    fn attendance_summary_splits_months_and_days() {
        let records = vec![
            mark(date(2024, 9, 30), AttendanceStatus::Present),
            mark(date(2024, 9, 27), AttendanceStatus::Present),
            mark(date(2024, 10, 1), AttendanceStatus::Absent),
            mark(date(2024, 10, 2), AttendanceStatus::Absent),
            mark(date(2024, 10, 2), AttendanceStatus::Late),
        ];

        let summary = attendance_summary(&records, date(2024, 10, 3));
        assert_eq!(summary.overall.total, 5);
        assert_eq!(summary.current.total, 3);
        assert_eq!(summary.previous.total, 2);
        assert_eq!(summary.trend.trend, Trend::Declining);
        assert_eq!(summary.daily.len(), 4);
        assert_eq!(summary.daily[&date(2024, 10, 2)].total, 2);

        let text = render_attendance(&summary);
        assert!(text.contains("Trend: declining (33.3% vs 100.0%)"));
        assert!(text.contains("- 2024-10-02: 50.0% (1/2)"));
    }

    #[test]
    fn attendance_summary_ignores_marks_after_as_of_date() {
        let records = vec![
            mark(date(2024, 9, 2), AttendanceStatus::Present),
            mark(date(2024, 9, 3), AttendanceStatus::Present),
            mark(date(2024, 9, 20), AttendanceStatus::Absent),
            mark(date(2024, 10, 1), AttendanceStatus::Absent),
        ];

        let summary = attendance_summary(&records, date(2024, 9, 10));
        assert_eq!(summary.overall.total, 2);
        assert_eq!(summary.overall.attendance_rate, 100.0);
        assert_eq!(summary.daily.len(), 2);
        assert!(!summary.daily.contains_key(&date(2024, 9, 20)));
    }

    #[test]
    fn attendance_summary_without_history_is_stable() {
        let records = vec![mark(date(2024, 10, 1), AttendanceStatus::Present)];

        let summary = attendance_summary(&records, date(2024, 10, 3));
        assert!(summary.trend.no_prior_data);
        assert!(render_attendance(&summary).contains("Trend: stable (no prior data)"));
    }

    #[test]
    fn academic_summary_averages_all_exam_types_per_course() {
        let math = Course {
            id: Uuid::from_u128(10),
            code: "MATH".to_string(),
            name: "Mathematics".to_string(),
        };
        let records = vec![
            scored(math.id, "2023-2024", Term::Two, "Quiz", 60.0),
            scored(math.id, "2023-2024", Term::Two, "Final Exam", 80.0),
            scored(math.id, "2023-2024", Term::One, "Final Exam", 50.0),
        ];

        let summary = academic_summary(&records, &[math], "2023-2024", Term::Two);
        assert_eq!(summary.courses.len(), 1);
        assert_eq!(summary.courses[0].course_name, "Mathematics");
        assert_eq!(summary.courses[0].stat.count, 2);
        assert!((summary.overall_percentage - 70.0).abs() < 1e-9);
        assert_eq!(summary.overall_grade, "B");
        assert_eq!(summary.trend.trend, Trend::Improving);

        let text = render_academic(&summary);
        assert!(text.starts_with("Term 2 2023-2024: 70.0% (B) across 2 assessments"));
    }

    #[test]
    fn academic_summary_for_empty_term() {
        let summary = academic_summary(&[], &[], "2023-2024", Term::Three);
        assert!(summary.courses.is_empty());
        assert_eq!(summary.overall_grade, "F");
        assert!(render_academic(&summary).contains("No scores recorded for this term."));
    }
}
