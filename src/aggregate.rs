use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use tracing::warn;

use crate::grading;
use crate::models::{AttendanceRecord, AttendanceStatus, ScoreRecord};

/// `round(x * 10) / 10`. Only applied where values leave the crate.
pub fn round_one_decimal(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

pub fn serialize_rounded<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_one_decimal(*value))
}

pub fn serialize_rounded_opt<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_some(&round_one_decimal(*value)),
        None => serializer.serialize_none(),
    }
}

/// `part / whole * 100`, or `0` when `whole` is zero.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 {
        0.0
    } else {
        part / whole * 100.0
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Multi-map keyed by `key_fn`. Each bucket keeps its records in input order.
pub fn group_by<'a, T, K, F>(records: &'a [T], mut key_fn: F) -> BTreeMap<K, Vec<&'a T>>
where
    K: Ord,
    F: FnMut(&T) -> K,
{
    let mut groups: BTreeMap<K, Vec<&'a T>> = BTreeMap::new();
    for record in records {
        groups.entry(key_fn(record)).or_default().push(record);
    }
    groups
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AttendanceStat {
    pub total: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    /// Marks whose status counts as attended.
    pub attended: usize,
    #[serde(serialize_with = "serialize_rounded")]
    pub attendance_rate: f64,
}

pub fn aggregate_attendance<'a, I>(records: I) -> AttendanceStat
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut stat = AttendanceStat::default();
    for record in records {
        stat.total += 1;
        match record.status {
            AttendanceStatus::Present => stat.present += 1,
            AttendanceStatus::Absent => stat.absent += 1,
            AttendanceStatus::Late => stat.late += 1,
            AttendanceStatus::Excused => stat.excused += 1,
        }
        if record.status.is_attended() {
            stat.attended += 1;
        }
    }
    stat.attendance_rate = percent_of(stat.attended as f64, stat.total as f64);
    stat
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreStat {
    pub count: usize,
    /// Records dropped because the classifier rejected them.
    pub skipped: usize,
    pub sum_percentage: f64,
    #[serde(serialize_with = "serialize_rounded")]
    pub average_percentage: f64,
}

pub fn aggregate_scores<'a, I>(records: I) -> ScoreStat
where
    I: IntoIterator<Item = &'a ScoreRecord>,
{
    let mut stat = ScoreStat::default();
    for record in records {
        match grading::classify(record.score, record.max_score) {
            Ok(classification) => {
                stat.count += 1;
                stat.sum_percentage += classification.percentage;
            }
            Err(err) => {
                warn!(
                    student_id = %record.student_id,
                    course_id = %record.course_id,
                    exam_type = %record.exam_type,
                    "skipping score record: {err}"
                );
                stat.skipped += 1;
            }
        }
    }
    stat.average_percentage = if stat.count == 0 {
        0.0
    } else {
        stat.sum_percentage / stat.count as f64
    };
    stat
}

pub fn attendance_by<K, F>(records: &[AttendanceRecord], key_fn: F) -> BTreeMap<K, AttendanceStat>
where
    K: Ord,
    F: FnMut(&AttendanceRecord) -> K,
{
    group_by(records, key_fn)
        .into_iter()
        .map(|(key, group)| (key, aggregate_attendance(group)))
        .collect()
}

pub fn scores_by<K, F>(records: &[ScoreRecord], key_fn: F) -> BTreeMap<K, ScoreStat>
where
    K: Ord,
    F: FnMut(&ScoreRecord) -> K,
{
    group_by(records, key_fn)
        .into_iter()
        .map(|(key, group)| (key, aggregate_scores(group)))
        .collect()
}
