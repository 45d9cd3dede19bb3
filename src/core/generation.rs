//! Yearly generation job.
//!
//! Materialises one notification record per active, dated profile for a target year.
//! Re-running it for the same year writes nothing new: existing rows are left exactly as
//! they are, whatever their status. A profile with unusable birth data is logged and
//! skipped without aborting the batch.

use crate::{
    core::{profiles, records},
    entities::NotificationStatus,
    errors::{Error, Result},
};
use chrono::Datelike;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Years accepted by [`generate_for_year`].
pub const SUPPORTED_YEARS: std::ops::RangeInclusive<i32> = 1900..=9999;

/// Aggregate outcome of a generation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationSummary {
    /// Target year
    pub year: i32,
    /// Profiles considered
    pub profiles_seen: usize,
    /// New rows written (any status)
    pub created: usize,
    /// Of the new rows, how many were written as EXCLUDED
    pub created_excluded: usize,
    /// Rows that already existed and were left alone
    pub already_present: usize,
    /// Profiles skipped because of bad data or a per-row failure
    pub skipped: usize,
}

/// Populates the record store for `year`.
#[instrument(skip(db))]
pub async fn generate_for_year<C>(db: &C, year: i32) -> Result<GenerationSummary>
where
    C: ConnectionTrait,
{
    if !SUPPORTED_YEARS.contains(&year) {
        return Err(Error::Validation {
            message: format!(
                "year must be between {} and {}, got {year}",
                SUPPORTED_YEARS.start(),
                SUPPORTED_YEARS.end()
            ),
        });
    }

    let profiles = profiles::list_active_profiles_with_birth_date(db).await?;
    let mut summary = GenerationSummary {
        year,
        profiles_seen: profiles.len(),
        ..GenerationSummary::default()
    };

    for profile in profiles {
        if profile.birth_date.year() > year {
            warn!(
                profile_id = profile.profile_id,
                birth_date = %profile.birth_date,
                "Skipping profile: birth date lies after the target year"
            );
            summary.skipped += 1;
            continue;
        }

        match records::upsert(
            db,
            profile.profile_id,
            year,
            profile.birth_date,
            profile.is_excluded,
        )
        .await
        {
            Ok(records::UpsertOutcome::Created(record)) => {
                summary.created += 1;
                if record.status == NotificationStatus::Excluded {
                    summary.created_excluded += 1;
                }
            }
            Ok(records::UpsertOutcome::Existing(_)) => summary.already_present += 1,
            Err(e) => {
                warn!(
                    profile_id = profile.profile_id,
                    error = %e,
                    "Skipping profile: could not write birthday notification"
                );
                summary.skipped += 1;
            }
        }
    }

    info!(
        year,
        created = summary.created,
        already_present = summary.already_present,
        skipped = summary.skipped,
        "Birthday notification generation finished"
    );
    Ok(summary)
}
