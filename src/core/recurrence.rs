//! Recurrence calculator - maps a one-time birth date onto a given year.
//!
//! Leap-day policy: a Feb 29 birthday falls on **Feb 28** in non-leap years. Generation and
//! the upcoming/past views both go through [`occurrence_date`], so they cannot disagree.

use chrono::{Datelike, NaiveDate};

/// Returns the date of the birthday occurrence in `year`.
///
/// Returns `None` only when `year` is outside chrono's representable range.
#[must_use]
pub fn occurrence_date(birth_date: NaiveDate, year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, birth_date.month(), birth_date.day()).or_else(|| {
        // Only Feb 29 can be missing from a valid year
        NaiveDate::from_ymd_opt(year, 2, 28)
    })
}

/// Age the person turns on their occurrence in `year`.
#[must_use]
pub fn age_at_occurrence(birth_date: NaiveDate, year: i32) -> i32 {
    year - birth_date.year()
}

/// Signed day distance from `today` to the occurrence in `year` (negative when already past).
#[must_use]
pub fn days_from(today: NaiveDate, birth_date: NaiveDate, year: i32) -> Option<i64> {
    occurrence_date(birth_date, year).map(|date| date.signed_duration_since(today).num_days())
}
