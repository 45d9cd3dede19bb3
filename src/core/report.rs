//! Upcoming/past birthday views and per-year statistics.
//!
//! The upcoming and past views are computed live from profile birth dates, not from
//! notification records, so they also show people whose records have not been generated
//! yet. Statistics are read from the records.

use crate::{
    core::{profiles, profiles::ProfileSnapshot, recurrence},
    entities::{BirthdayNotification, NotificationStatus, birthday_notification},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate};
use sea_orm::{QuerySelect, prelude::*, sea_query::Expr};
use serde::Serialize;
use std::ops::RangeInclusive;

/// Widest window accepted by [`upcoming`] and [`past`].
pub const MAX_WINDOW_DAYS: i64 = 365;

/// One birthday inside a window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BirthdayEntry {
    /// Profile id
    pub profile_id: i64,
    /// Person's name
    pub full_name: String,
    /// Cohort
    pub alumni_cohort: Option<String>,
    /// Birth date
    pub birth_date: NaiveDate,
    /// The occurrence that falls inside the window
    pub occurrence_date: NaiveDate,
    /// Age turned on that occurrence
    pub age: i32,
    /// Signed distance from today (negative in the past)
    pub days_from_today: i64,
    /// Whether the person is opted out
    pub is_excluded: bool,
}

/// Record counts for one year.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Year counted
    pub year: i32,
    /// All records for the year
    pub total: u64,
    /// PENDING records
    pub pending: u64,
    /// SENT records
    pub sent: u64,
    /// FAILED records
    pub failed: u64,
    /// EXCLUDED records
    pub excluded: u64,
    /// Active profiles with a known birth date
    pub profiles_with_birth_date: u64,
    /// Active profiles currently opted out
    pub currently_excluded_profiles: u64,
}

/// Birthdays from `today` through `today + days`, nearest first.
///
/// # Arguments
/// * `db` - Database connection
/// * `today` - Reference date in the configured timezone
/// * `days` - Window length, `0..=365`
pub async fn upcoming<C>(db: &C, today: NaiveDate, days: i64) -> Result<Vec<BirthdayEntry>>
where
    C: ConnectionTrait,
{
    check_window(days)?;
    let profiles = profiles::list_active_profiles_with_birth_date(db).await?;
    Ok(birthdays_within(&profiles, today, 0..=days))
}

/// Birthdays from `today - days` through yesterday, most recent first.
pub async fn past<C>(db: &C, today: NaiveDate, days: i64) -> Result<Vec<BirthdayEntry>>
where
    C: ConnectionTrait,
{
    check_window(days)?;
    let profiles = profiles::list_active_profiles_with_birth_date(db).await?;
    Ok(birthdays_within(&profiles, today, -days..=-1))
}

fn check_window(days: i64) -> Result<()> {
    if (0..=MAX_WINDOW_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(Error::Validation {
            message: format!("days must be between 0 and {MAX_WINDOW_DAYS}, got {days}"),
        })
    }
}

/// Pure windowing over profile snapshots.
///
/// Each profile is checked against its occurrence in the previous, current and next year so
/// windows crossing 31 Dec / 1 Jan are handled; only the occurrence closest to today is kept.
#[must_use]
pub fn birthdays_within(
    profiles: &[ProfileSnapshot],
    today: NaiveDate,
    window: RangeInclusive<i64>,
) -> Vec<BirthdayEntry> {
    let mut entries: Vec<BirthdayEntry> = profiles
        .iter()
        .filter_map(|profile| {
            (today.year() - 1..=today.year() + 1)
                .filter(|year| *year >= profile.birth_date.year())
                .filter_map(|year| {
                    let occurrence = recurrence::occurrence_date(profile.birth_date, year)?;
                    let distance = (occurrence - today).num_days();
                    window
                        .contains(&distance)
                        .then_some((year, occurrence, distance))
                })
                .min_by_key(|(_, _, distance)| distance.abs())
                .map(|(year, occurrence_date, days_from_today)| BirthdayEntry {
                    profile_id: profile.profile_id,
                    full_name: profile.display_name.clone(),
                    alumni_cohort: profile.alumni_cohort.clone(),
                    birth_date: profile.birth_date,
                    occurrence_date,
                    age: recurrence::age_at_occurrence(profile.birth_date, year),
                    days_from_today,
                    is_excluded: profile.is_excluded,
                })
        })
        .collect();

    entries.sort_by(|a, b| {
        a.days_from_today
            .abs()
            .cmp(&b.days_from_today.abs())
            .then_with(|| a.full_name.cmp(&b.full_name))
    });
    entries
}

/// Counts the year's records by status, plus profile totals.
pub async fn statistics<C>(db: &C, year: i32) -> Result<Statistics>
where
    C: ConnectionTrait,
{
    let counts: Vec<(NotificationStatus, i64)> = BirthdayNotification::find()
        .select_only()
        .column(birthday_notification::Column::Status)
        .column_as(Expr::col(birthday_notification::Column::Id).count(), "count")
        .filter(birthday_notification::Column::Year.eq(year))
        .group_by(birthday_notification::Column::Status)
        .into_tuple()
        .all(db)
        .await?;

    let mut stats = Statistics {
        year,
        profiles_with_birth_date: profiles::count_profiles_with_birth_date(db).await?,
        currently_excluded_profiles: profiles::count_excluded_profiles(db).await?,
        ..Statistics::default()
    };
    for (status, count) in counts {
        let count = u64::try_from(count).unwrap_or_default();
        stats.total += count;
        match status {
            NotificationStatus::Pending => stats.pending = count,
            NotificationStatus::Sent => stats.sent = count,
            NotificationStatus::Failed => stats.failed = count,
            NotificationStatus::Excluded => stats.excluded = count,
        }
    }
    Ok(stats)
}
