//! Percentage and letter-grade classification for a single score.

use serde::Serialize;

/// Lower bounds scanned in descending order; the first bound the percentage
/// reaches wins. Anything below the last bound is [`FAILING_GRADE`].
pub const GRADE_BOUNDARIES: &[(f64, &str)] = &[
    (90.0, "A+"),
    (80.0, "A"),
    (75.0, "B+"),
    (70.0, "B"),
    (65.0, "C+"),
    (60.0, "C"),
    (55.0, "D+"),
    (50.0, "D"),
];

pub const FAILING_GRADE: &str = "F";

/// Minimum average percentage counted as a pass.
pub const PASS_MARK: f64 = 50.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GradeError {
    #[error("max score must be greater than zero (got {max_score})")]
    InvalidInput { max_score: f64 },
    #[error("score {score} out of {max_score} is not a finite number")]
    NonFinite { score: f64, max_score: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Classification {
    pub percentage: f64,
    pub grade: &'static str,
}

/// Scores above `max_score` yield percentages above 100; they are not clamped
/// so bonus marks survive. Callers validate that upstream if they care.
pub fn classify(score: f64, max_score: f64) -> Result<Classification, GradeError> {
    if !score.is_finite() || !max_score.is_finite() {
        return Err(GradeError::NonFinite { score, max_score });
    }
    if max_score <= 0.0 {
        return Err(GradeError::InvalidInput { max_score });
    }

    let percentage = score / max_score * 100.0;
    Ok(Classification {
        percentage,
        grade: letter_grade(percentage),
    })
}

pub fn letter_grade(percentage: f64) -> &'static str {
    GRADE_BOUNDARIES
        .iter()
        .find(|(lower_bound, _)| percentage >= *lower_bound)
        .map(|(_, label)| *label)
        .unwrap_or(FAILING_GRADE)
}

pub fn is_passing(percentage: f64) -> bool {
    percentage >= PASS_MARK
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn rank_of(grade: &str) -> usize {
        GRADE_BOUNDARIES
            .iter()
            .position(|(_, label)| *label == grade)
            .unwrap_or(GRADE_BOUNDARIES.len())
    }

    #[test]
    fn known_scores_classify() {
        assert_eq!(
            classify(0.0, 100.0),
            Ok(Classification {
                percentage: 0.0,
                grade: "F"
            })
        );
        assert_eq!(
            classify(90.0, 100.0),
            Ok(Classification {
                percentage: 90.0,
                grade: "A+"
            })
        );
        assert_eq!(classify(49.9, 100.0).unwrap().grade, "F");
        assert_eq!(classify(50.0, 100.0).unwrap().grade, "D");
    }

    #[test]
    fn boundaries_are_inclusive_at_the_lower_edge() {
        assert_eq!(letter_grade(100.0), "A+");
        assert_eq!(letter_grade(89.99), "A");
        assert_eq!(letter_grade(80.0), "A");
        assert_eq!(letter_grade(75.0), "B+");
        assert_eq!(letter_grade(74.9), "B");
        assert_eq!(letter_grade(65.0), "C+");
        assert_eq!(letter_grade(60.0), "C");
        assert_eq!(letter_grade(55.0), "D+");
        assert_eq!(letter_grade(54.9), "D");
    }

    #[test]
    fn scales_by_max_score() {
        let result = classify(18.0, 20.0).unwrap();
        assert!((result.percentage - 90.0).abs() < 1e-9);
        assert_eq!(result.grade, "A+");
    }

    #[test]
    fn bonus_marks_are_not_clamped() {
        let result = classify(110.0, 100.0).unwrap();
        assert!((result.percentage - 110.0).abs() < 1e-9);
        assert_eq!(result.grade, "A+");
    }

    #[test]
    fn rejects_non_positive_max_score() {
        assert_eq!(
            classify(10.0, 0.0),
            Err(GradeError::InvalidInput { max_score: 0.0 })
        );
        assert!(classify(10.0, -5.0).is_err());
    }

    #[test]
    fn rejects_non_finite_inputs() {
        assert!(matches!(
            classify(f64::NAN, 100.0),
            Err(GradeError::NonFinite { .. })
        ));
        assert!(matches!(
            classify(1.0, f64::INFINITY),
            Err(GradeError::NonFinite { .. })
        ));
        assert!(matches!(
            classify(f64::INFINITY, 100.0),
            Err(GradeError::NonFinite { .. })
        ));
        assert!(matches!(
            classify(10.0, f64::NAN),
            Err(GradeError::NonFinite { .. })
        ));
    }

    #[test]
    fn pass_mark_matches_lowest_passing_grade() {
        assert!(is_passing(50.0));
        assert!(!is_passing(49.99));
        assert_ne!(letter_grade(PASS_MARK), FAILING_GRADE);
    }

    proptest! {
        #[test]
        fn every_percentage_gets_a_known_letter(p in 0.0f64..=100.0) {
            let grade = letter_grade(p);
            prop_assert!(grade == FAILING_GRADE || GRADE_BOUNDARIES.iter().any(|(_, l)| *l == grade));
        }

        #[test]
        fn higher_percentage_never_gets_worse_letter(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(rank_of(letter_grade(high)) <= rank_of(letter_grade(low)));
        }
    }
}
