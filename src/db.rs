use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::grading;
use crate::models::{AttendanceRecord, AttendanceStatus, Course, ScoreRecord, Student};
use crate::period::{AcademicYear, DateWindow, Term};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub const SEED_CLASS_ID: &str = "6b0f3c1e-5a52-4a1c-9d0e-2f7d8c4b1a90";

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let class_id = Uuid::parse_str(SEED_CLASS_ID)?;
    sqlx::query(
        r#"
        INSERT INTO school_reports.classes (id, name)
        VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name
        "#,
    )
    .bind(class_id)
    .bind("Form 2 East")
    .execute(pool)
    .await?;

    let students = vec![
        ("Avery Lee", "F2E-001"),
        ("Jules Moreno", "F2E-002"),
        ("Kiara Patel", "F2E-003"),
        ("Tomas Okafor", "F2E-004"),
    ];
    for (name, registration_number) in students {
        sqlx::query(
            r#"
            INSERT INTO school_reports.students (id, full_name, registration_number, class_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (registration_number) DO UPDATE
            SET full_name = EXCLUDED.full_name, class_id = EXCLUDED.class_id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(registration_number)
        .bind(class_id)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        ("MATH", "Mathematics"),
        ("ENG", "English"),
        ("BIO", "Biology"),
    ];
    for (code, name) in courses {
        sqlx::query(
            r#"
            INSERT INTO school_reports.courses (id, code, name)
            VALUES ($1, $2, $3)
            ON CONFLICT (code) DO UPDATE SET name = EXCLUDED.name
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(code)
        .bind(name)
        .execute(pool)
        .await?;
    }

    let scores = vec![
        ("F2E-001", "MATH", "Term 1", "Final Exam", 88.0),
        ("F2E-001", "ENG", "Term 1", "Final Exam", 74.0),
        ("F2E-001", "BIO", "Term 1", "Final Exam", 91.0),
        ("F2E-002", "MATH", "Term 1", "Final Exam", 47.0),
        ("F2E-002", "ENG", "Term 1", "Final Exam", 58.0),
        ("F2E-003", "MATH", "Term 1", "Final Exam", 95.0),
        ("F2E-003", "ENG", "Term 1", "Final Exam", 81.0),
        ("F2E-003", "BIO", "Term 1", "Final Exam", 77.0),
        ("F2E-003", "MATH", "Term 1", "Quiz", 18.0),
        ("F2E-001", "MATH", "Term 3", "Final Exam", 79.0),
    ];
    for (registration_number, course_code, term, exam_type, score) in scores {
        let academic_year = if term == "Term 3" { "2023-2024" } else { "2024-2025" };
        let max_score = if exam_type == "Quiz" { 20.0 } else { 100.0 };
        upsert_score(
            pool,
            &ScoreImportRow {
                registration_number: registration_number.to_string(),
                course_code: course_code.to_string(),
                academic_year: academic_year.to_string(),
                term: term.to_string(),
                exam_type: exam_type.to_string(),
                score,
                max_score,
                remarks: None,
            },
        )
        .await?;
    }

    let marks = vec![
        ("F2E-001", "2024-09-23", "present"),
        ("F2E-001", "2024-09-24", "late"),
        ("F2E-001", "2024-10-01", "present"),
        ("F2E-002", "2024-09-23", "present"),
        ("F2E-002", "2024-09-24", "absent"),
        ("F2E-002", "2024-10-01", "absent"),
        ("F2E-003", "2024-09-23", "present"),
        ("F2E-003", "2024-10-01", "excused"),
    ];
    for (registration_number, date, status) in marks {
        upsert_attendance(
            pool,
            &AttendanceImportRow {
                registration_number: registration_number.to_string(),
                course_code: None,
                date: date.to_string(),
                status: status.to_string(),
                remarks: None,
                marked_by: Some("seed".to_string()),
            },
        )
        .await?;
    }

    Ok(())
}

fn student_from_row(row: &PgRow) -> Student {
    Student {
        id: row.get("id"),
        full_name: row.get("full_name"),
        registration_number: row.get("registration_number"),
        class_id: row.get("class_id"),
    }
}

pub async fn fetch_class_roster(pool: &PgPool, class_id: Uuid) -> anyhow::Result<Vec<Student>> {
    let rows = sqlx::query(
        "SELECT id, full_name, registration_number, class_id \
         FROM school_reports.students WHERE class_id = $1 ORDER BY full_name",
    )
    .bind(class_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(student_from_row).collect())
}

pub async fn fetch_courses(pool: &PgPool) -> anyhow::Result<Vec<Course>> {
    let rows = sqlx::query("SELECT id, code, name FROM school_reports.courses ORDER BY code")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| Course {
            id: row.get("id"),
            code: row.get("code"),
            name: row.get("name"),
        })
        .collect())
}

pub async fn fetch_scores(
    pool: &PgPool,
    class_id: Uuid,
    student_id: Option<Uuid>,
) -> anyhow::Result<Vec<ScoreRecord>> {
    let mut query = String::from(
        "SELECT student_id, course_id, class_id, academic_year, term, exam_type, \
         score, max_score, remarks \
         FROM school_reports.score_records WHERE class_id = $1",
    );
    if student_id.is_some() {
        query.push_str(" AND student_id = $2");
    }
    query.push_str(" ORDER BY academic_year, term, updated_at");

    let mut rows = sqlx::query(&query).bind(class_id);
    if let Some(value) = student_id {
        rows = rows.bind(value);
    }

    let mut records = Vec::new();
    for row in rows.fetch_all(pool).await? {
        let term: String = row.get("term");
        records.push(ScoreRecord {
            student_id: row.get("student_id"),
            course_id: row.get("course_id"),
            class_id: row.get("class_id"),
            academic_year: row.get("academic_year"),
            term: term.parse()?,
            exam_type: row.get("exam_type"),
            score: row.get("score"),
            max_score: row.get("max_score"),
            remarks: row.get("remarks"),
        });
    }

    debug!(%class_id, count = records.len(), "fetched score records");
    Ok(records)
}

pub async fn fetch_attendance(
    pool: &PgPool,
    class_id: Uuid,
    student_id: Option<Uuid>,
    window: DateWindow,
) -> anyhow::Result<Vec<AttendanceRecord>> {
    let mut query = String::from(
        "SELECT student_id, class_id, course_id, attended_on, status, remarks, marked_by \
         FROM school_reports.attendance_records \
         WHERE class_id = $1 AND attended_on BETWEEN $2 AND $3",
    );
    if student_id.is_some() {
        query.push_str(" AND student_id = $4");
    }
    query.push_str(" ORDER BY attended_on");

    let mut rows = sqlx::query(&query)
        .bind(class_id)
        .bind(window.start)
        .bind(window.end);
    if let Some(value) = student_id {
        rows = rows.bind(value);
    }

    let mut records = Vec::new();
    for row in rows.fetch_all(pool).await? {
        let status: String = row.get("status");
        records.push(AttendanceRecord {
            student_id: row.get("student_id"),
            class_id: row.get("class_id"),
            course_id: row.get("course_id"),
            date: row.get("attended_on"),
            status: status.parse()?,
            remarks: row.get("remarks"),
            marked_by: row.get("marked_by"),
        });
    }

    debug!(%class_id, count = records.len(), "fetched attendance records");
    Ok(records)
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScoreImportRow {
    pub registration_number: String,
    pub course_code: String,
    pub academic_year: String,
    pub term: String,
    pub exam_type: String,
    pub score: f64,
    pub max_score: f64,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AttendanceImportRow {
    pub registration_number: String,
    pub course_code: Option<String>,
    pub date: String,
    pub status: String,
    pub remarks: Option<String>,
    pub marked_by: Option<String>,
}

/// Accepts a plain date or a timestamp; any time of day is dropped.
pub fn parse_day(value: &str) -> anyhow::Result<NaiveDate> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(timestamp.date());
        }
    }
    bail!("unrecognised date `{value}`")
}

/// Checks a score row before it reaches storage.
pub fn validate_score_row(row: &ScoreImportRow) -> anyhow::Result<Term> {
    row.academic_year
        .parse::<AcademicYear>()
        .with_context(|| format!("score for {}", row.registration_number))?;
    let term = row
        .term
        .parse::<Term>()
        .with_context(|| format!("score for {}", row.registration_number))?;
    grading::classify(row.score, row.max_score).with_context(|| {
        format!(
            "score for {} in {}",
            row.registration_number, row.course_code
        )
    })?;
    if row.score < 0.0 {
        bail!(
            "score for {} in {} is negative",
            row.registration_number,
            row.course_code
        );
    }
    Ok(term)
}

async fn lookup_student(pool: &PgPool, registration_number: &str) -> anyhow::Result<(Uuid, Uuid)> {
    let row = sqlx::query(
        "SELECT id, class_id FROM school_reports.students WHERE registration_number = $1",
    )
    .bind(registration_number)
    .fetch_optional(pool)
    .await?
    .with_context(|| format!("unknown student registration number {registration_number}"))?;
    Ok((row.get("id"), row.get("class_id")))
}

async fn lookup_course(pool: &PgPool, code: &str) -> anyhow::Result<Uuid> {
    let row = sqlx::query("SELECT id FROM school_reports.courses WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await?
        .with_context(|| format!("unknown course code {code}"))?;
    Ok(row.get("id"))
}

/// One score per student, course, academic year, term and exam type.
pub async fn upsert_score(pool: &PgPool, row: &ScoreImportRow) -> anyhow::Result<u64> {
    let term = validate_score_row(row)?;
    let (student_id, class_id) = lookup_student(pool, &row.registration_number).await?;
    let course_id = lookup_course(pool, &row.course_code).await?;

    let result = sqlx::query(
        r#"
        INSERT INTO school_reports.score_records
        (id, student_id, course_id, class_id, academic_year, term, exam_type, score, max_score, remarks)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (student_id, course_id, academic_year, term, exam_type) DO UPDATE
        SET score = EXCLUDED.score,
            max_score = EXCLUDED.max_score,
            class_id = EXCLUDED.class_id,
            remarks = EXCLUDED.remarks,
            updated_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(course_id)
    .bind(class_id)
    .bind(row.academic_year.trim())
    .bind(term.as_str())
    .bind(row.exam_type.trim())
    .bind(row.score)
    .bind(row.max_score)
    .bind(&row.remarks)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// One mark per student, class, course and day.
pub async fn upsert_attendance(pool: &PgPool, row: &AttendanceImportRow) -> anyhow::Result<u64> {
    let date = parse_day(&row.date)?;
    let status: AttendanceStatus = row.status.parse()?;
    let (student_id, class_id) = lookup_student(pool, &row.registration_number).await?;
    let course_id = match row.course_code.as_deref().filter(|code| !code.trim().is_empty()) {
        Some(code) => Some(lookup_course(pool, code).await?),
        None => None,
    };

    let result = sqlx::query(
        r#"
        INSERT INTO school_reports.attendance_records
        (id, student_id, class_id, course_id, attended_on, status, remarks, marked_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ON CONFLICT (student_id, class_id, course_id, attended_on) DO UPDATE
        SET status = EXCLUDED.status,
            remarks = EXCLUDED.remarks,
            marked_by = EXCLUDED.marked_by,
            updated_at = now()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(class_id)
    .bind(course_id)
    .bind(date)
    .bind(status.as_str())
    .bind(&row.remarks)
    .bind(&row.marked_by)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn import_scores_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut upserted = 0usize;

    for (index, result) in reader.deserialize::<ScoreImportRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("line {line}"))?;
        if upsert_score(pool, &row)
            .await
            .with_context(|| format!("line {line}"))?
            > 0
        {
            upserted += 1;
        }
    }

    info!(path = %csv_path.display(), upserted, "imported score records");
    Ok(upserted)
}

pub async fn import_attendance_csv(
    pool: &PgPool,
    csv_path: &std::path::Path,
) -> anyhow::Result<usize> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut upserted = 0usize;

    for (index, result) in reader.deserialize::<AttendanceImportRow>().enumerate() {
        let line = index + 2;
        let row = result.with_context(|| format!("line {line}"))?;
        if upsert_attendance(pool, &row)
            .await
            .with_context(|| format!("line {line}"))?
            > 0
        {
            upserted += 1;
        }
    }

    info!(path = %csv_path.display(), upserted, "imported attendance records");
    Ok(upserted)
}
