//! Academic-year, term and calendar-month arithmetic.
//!
//! Academic years travel through the rest of the crate as `"YYYY-YYYY"`
//! strings (they are stored and grouped that way). This module is the only
//! place that parses them into integers.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeriodError {
    #[error("academic year `{0}` is not in YYYY-YYYY form")]
    InvalidAcademicYear(String),
    #[error("unknown term `{0}` (expected Term 1, Term 2 or Term 3)")]
    UnknownTerm(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AcademicYear {
    pub start_year: i32,
    pub end_year: i32,
}

impl AcademicYear {
    pub fn previous(self) -> Self {
        Self {
            start_year: self.start_year - 1,
            end_year: self.end_year - 1,
        }
    }
}

impl FromStr for AcademicYear {
    type Err = PeriodError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || PeriodError::InvalidAcademicYear(value.to_string());
        let (start, end) = value.trim().split_once('-').ok_or_else(invalid)?;
        Ok(Self {
            start_year: start.parse().map_err(|_| invalid())?,
            end_year: end.parse().map_err(|_| invalid())?,
        })
    }
}

impl fmt::Display for AcademicYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_year, self.end_year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    #[serde(rename = "Term 1")]
    One,
    #[serde(rename = "Term 2")]
    Two,
    #[serde(rename = "Term 3")]
    Three,
}

impl Term {
    pub fn as_str(self) -> &'static str {
        match self {
            Term::One => "Term 1",
            Term::Two => "Term 2",
            Term::Three => "Term 3",
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Term {
    type Err = PeriodError;

    /// Accepts `Term 1` as well as the bare number.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let number = trimmed
            .strip_prefix("Term")
            .or_else(|| trimmed.strip_prefix("term"))
            .unwrap_or(trimmed)
            .trim();
        match number {
            "1" => Ok(Term::One),
            "2" => Ok(Term::Two),
            "3" => Ok(Term::Three),
            _ => Err(PeriodError::UnknownTerm(value.to_string())),
        }
    }
}

/// The term immediately before `(academic_year, term)`. Term 1 rolls back
/// into Term 3 of the prior year. `None` when the year does not parse.
pub fn previous_term(academic_year: &str, term: Term) -> Option<(String, Term)> {
    let year: AcademicYear = academic_year.parse().ok()?;
    let previous = match term {
        Term::Three => (year, Term::Two),
        Term::Two => (year, Term::One),
        Term::One => (year.previous(), Term::Three),
    };
    Some((previous.0.to_string(), previous.1))
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.day0()))
}

/// First of the month through `today`.
pub fn current_month(today: NaiveDate) -> DateWindow {
    DateWindow {
        start: first_of_month(today),
        end: today,
    }
}

/// The whole calendar month before `today`'s month.
pub fn previous_month(today: NaiveDate) -> DateWindow {
    let end = first_of_month(today) - Duration::days(1);
    DateWindow {
        start: first_of_month(end),
        end,
    }
}
