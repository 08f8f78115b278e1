use std::cmp::Ordering;
use std::fmt::Write;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::aggregate::{mean, percent_of, round_one_decimal, serialize_rounded};
use crate::grading::{self, Classification};
use crate::models::{Course, ScoreRecord, Student};
use crate::period::Term;

/// Only final exams feed term report cards.
pub const REPORT_EXAM_TYPE: &str = "Final Exam";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportFilter {
    pub class_id: Uuid,
    pub term: Term,
    pub academic_year: String,
}

impl ReportFilter {
    fn matches(&self, record: &ScoreRecord) -> bool {
        record.exam_type == REPORT_EXAM_TYPE
            && record.class_id == self.class_id
            && record.term == self.term
            && record.academic_year == self.academic_year
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GradedCell {
    pub score: f64,
    pub max_score: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub percentage: f64,
    pub grade: &'static str,
}

/// A course the student has no usable final exam for is `N/A`, never zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradeCell {
    Graded(GradedCell),
    NotAvailable,
}

impl GradeCell {
    pub fn percentage(&self) -> Option<f64> {
        match self {
            GradeCell::Graded(cell) => Some(cell.percentage),
            GradeCell::NotAvailable => None,
        }
    }

    fn label(&self) -> String {
        match self {
            GradeCell::Graded(cell) => {
                format!("{:.1} ({})", round_one_decimal(cell.percentage), cell.grade)
            }
            GradeCell::NotAvailable => "N/A".to_string(),
        }
    }
}

impl Serialize for GradeCell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            GradeCell::Graded(cell) => cell.serialize(serializer),
            GradeCell::NotAvailable => serializer.serialize_str("N/A"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CourseColumn {
    pub course_id: Uuid,
    pub code: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStudentRow {
    pub student_id: Uuid,
    pub student_name: String,
    pub registration_number: String,
    /// One cell per report course, in column order.
    pub cells: Vec<GradeCell>,
    #[serde(serialize_with = "serialize_rounded")]
    pub average_percentage: f64,
    pub overall_grade: &'static str,
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassStatistics {
    pub student_count: usize,
    #[serde(serialize_with = "serialize_rounded")]
    pub highest_average: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub lowest_average: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub class_average: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub pass_rate: f64,
}

/// How tied averages are ranked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankPolicy {
    /// Ties take consecutive ranks in roster order: 1, 2, 3.
    #[default]
    Sequential,
    /// Ties share the better rank and the next rank is skipped: 1, 1, 3.
    Shared,
}

impl RankPolicy {
    fn assign(self, sorted_averages: &[f64]) -> Vec<usize> {
        let mut ranks = Vec::with_capacity(sorted_averages.len());
        for (index, average) in sorted_averages.iter().enumerate() {
            let rank = match self {
                RankPolicy::Sequential => index + 1,
                RankPolicy::Shared if index > 0 && sorted_averages[index - 1] == *average => {
                    ranks[index - 1]
                }
                RankPolicy::Shared => index + 1,
            };
            ranks.push(rank);
        }
        ranks
    }
}

fn by_average_descending(a: &RankedStudentRow, b: &RankedStudentRow) -> Ordering {
    b.average_percentage.total_cmp(&a.average_percentage)
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub filter: ReportFilter,
    pub courses: Vec<CourseColumn>,
    pub rows: Vec<RankedStudentRow>,
    pub statistics: ClassStatistics,
    pub generated_at: DateTime<Utc>,
}

/// `generated_at` is a stamp, not content; two reports over the same inputs
/// compare equal regardless of when they were built.
impl PartialEq for Report {
    fn eq(&self, other: &Self) -> bool {
        self.filter == other.filter
            && self.courses == other.courses
            && self.rows == other.rows
            && self.statistics == other.statistics
    }
}

pub fn build_report(
    students: &[Student],
    courses: &[Course],
    scores: &[ScoreRecord],
    filter: ReportFilter,
) -> Report {
    build_report_with(
        students,
        courses,
        scores,
        filter,
        RankPolicy::default(),
        Utc::now(),
    )
}

pub fn build_report_with(
    students: &[Student],
    courses: &[Course],
    scores: &[ScoreRecord],
    filter: ReportFilter,
    policy: RankPolicy,
    generated_at: DateTime<Utc>,
) -> Report {
    let finals: Vec<&ScoreRecord> = scores.iter().filter(|r| filter.matches(r)).collect();

    let mut rows: Vec<RankedStudentRow> = students
        .iter()
        .map(|student| {
            let cells: Vec<GradeCell> = courses
                .iter()
                .map(|course| grade_cell(&finals, student.id, course.id))
                .collect();
            let populated: Vec<f64> = cells.iter().filter_map(GradeCell::percentage).collect();
            let average_percentage = mean(&populated);

            RankedStudentRow {
                student_id: student.id,
                student_name: student.full_name.clone(),
                registration_number: student.registration_number.clone(),
                cells,
                average_percentage,
                overall_grade: grading::letter_grade(average_percentage),
                rank: 0,
            }
        })
        .collect();

    // Stable sort: equal averages keep roster order.
    rows.sort_by(by_average_descending);
    let averages: Vec<f64> = rows.iter().map(|row| row.average_percentage).collect();
    for (row, rank) in rows.iter_mut().zip(policy.assign(&averages)) {
        row.rank = rank;
    }

    let statistics = class_statistics(&averages);

    Report {
        filter,
        courses: courses
            .iter()
            .map(|course| CourseColumn {
                course_id: course.id,
                code: course.code.clone(),
                name: course.name.clone(),
            })
            .collect(),
        rows,
        statistics,
        generated_at,
    }
}

fn grade_cell(finals: &[&ScoreRecord], student_id: Uuid, course_id: Uuid) -> GradeCell {
    finals
        .iter()
        .find(|r| r.student_id == student_id && r.course_id == course_id)
        .and_then(|r| {
            grading::classify(r.score, r.max_score)
                .ok()
                .map(|Classification { percentage, grade }| {
                    GradeCell::Graded(GradedCell {
                        score: r.score,
                        max_score: r.max_score,
                        percentage,
                        grade,
                    })
                })
        })
        .unwrap_or(GradeCell::NotAvailable)
}

/// `sorted_averages` must be in rank order.
fn class_statistics(sorted_averages: &[f64]) -> ClassStatistics {
    let passed = sorted_averages
        .iter()
        .filter(|average| grading::is_passing(**average))
        .count();

    ClassStatistics {
        student_count: sorted_averages.len(),
        highest_average: sorted_averages.first().copied().unwrap_or(0.0),
        lowest_average: sorted_averages.last().copied().unwrap_or(0.0),
        class_average: mean(sorted_averages),
        pass_rate: percent_of(passed as f64, sorted_averages.len() as f64),
    }
}

pub fn write_csv<W: std::io::Write>(report: &Report, writer: W) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);

    let mut header = vec![
        "Student Name".to_string(),
        "Registration Number".to_string(),
        "Rank".to_string(),
    ];
    header.extend(report.courses.iter().map(|course| course.name.clone()));
    header.push("Average".to_string());
    header.push("Overall Grade".to_string());
    csv.write_record(&header)?;

    for row in &report.rows {
        let mut record = vec![
            row.student_name.clone(),
            row.registration_number.clone(),
            row.rank.to_string(),
        ];
        record.extend(row.cells.iter().map(GradeCell::label));
        record.push(format!("{:.1}", round_one_decimal(row.average_percentage)));
        record.push(row.overall_grade.to_string());
        csv.write_record(&record)?;
    }

    csv.flush()?;
    Ok(())
}

pub fn render_markdown(report: &Report) -> String {
    let mut output = String::new();
    let stats = &report.statistics;

    let _ = writeln!(output, "# Term Report");
    let _ = writeln!(
        output,
        "Class {} · {} {} (generated {})",
        report.filter.class_id,
        report.filter.term,
        report.filter.academic_year,
        report.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Class Statistics");
    let _ = writeln!(output, "- Students: {}", stats.student_count);
    let _ = writeln!(output, "- Class average: {:.1}%", round_one_decimal(stats.class_average));
    let _ = writeln!(output, "- Highest average: {:.1}%", round_one_decimal(stats.highest_average));
    let _ = writeln!(output, "- Lowest average: {:.1}%", round_one_decimal(stats.lowest_average));
    let _ = writeln!(output, "- Pass rate: {:.1}%", round_one_decimal(stats.pass_rate));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Rankings");

    if report.rows.is_empty() {
        let _ = writeln!(output, "No students enrolled in this class.");
        return output;
    }

    let _ = write!(output, "| Rank | Student | Reg. No. |");
    for course in &report.courses {
        let _ = write!(output, " {} |", course.name);
    }
    let _ = writeln!(output, " Average | Grade |");
    let _ = writeln!(output, "|{}", "---|".repeat(report.courses.len() + 5));

    for row in &report.rows {
        let _ = write!(
            output,
            "| {} | {} | {} |",
            row.rank, row.student_name, row.registration_number
        );
        for cell in &row.cells {
            let _ = write!(output, " {} |", cell.label());
        }
        let _ = writeln!(
            output,
            " {:.1} | {} |",
            round_one_decimal(row.average_percentage),
            row.overall_grade
        );
    }

    output
}
