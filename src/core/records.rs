//! Notification record store - one row per person per year and its lifecycle.
//!
//! All writes to `birthday_notifications` go through this module. Two kinds of transition
//! exist:
//! - dispatch transitions, compare-and-set on `status = PENDING` plus a claim token, so a
//!   row is handed to the transport at most once even if two ticks overlap;
//! - operator transitions ([`set_status`]), unconditional, always dropping any claim.

use crate::{
    core::recurrence,
    entities::{BirthdayNotification, NotificationStatus, birthday_notification},
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, SqlErr, prelude::*};
use tracing::{debug, warn};
use uuid::Uuid;

/// `last_error` written by [`fail_stale_claims`].
pub const STALE_CLAIM_ERROR: &str = "dispatch was interrupted before the outcome was recorded";

/// Result of [`upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new row was written
    Created(birthday_notification::Model),
    /// The row already existed and was left untouched
    Existing(birthday_notification::Model),
}

impl UpsertOutcome {
    /// The record, whichever way it was obtained.
    #[must_use]
    pub const fn record(&self) -> &birthday_notification::Model {
        match self {
            Self::Created(record) | Self::Existing(record) => record,
        }
    }
}

/// How a dispatch attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The transport accepted the message
    Delivered {
        /// Acceptance time
        at: DateTime<Utc>,
    },
    /// The transport failed or timed out
    Failed {
        /// Stored as `last_error`
        reason: String,
    },
}

impl DeliveryOutcome {
    fn apply(&self, changes: &mut birthday_notification::ActiveModel) {
        match self {
            Self::Delivered { at } => {
                changes.status = Set(NotificationStatus::Sent);
                changes.sent_at = Set(Some(*at));
                changes.last_error = Set(None);
            }
            Self::Failed { reason } => {
                changes.status = Set(NotificationStatus::Failed);
                changes.last_error = Set(Some(reason.clone()));
            }
        }
    }
}

/// Strictly inserts a new record; a second row for the same (person, year) is rejected.
pub async fn create_record<C>(
    db: &C,
    profile_id: i64,
    year: i32,
    birth_date: NaiveDate,
    is_excluded: bool,
) -> Result<birthday_notification::Model>
where
    C: ConnectionTrait,
{
    let occurrence_date =
        recurrence::occurrence_date(birth_date, year).ok_or_else(|| Error::Validation {
            message: format!("year {year} is out of range"),
        })?;
    let status = if is_excluded {
        NotificationStatus::Excluded
    } else {
        NotificationStatus::Pending
    };
    let now = Utc::now();

    let record = birthday_notification::ActiveModel {
        profile_id: Set(profile_id),
        year: Set(year),
        birth_date: Set(birth_date),
        occurrence_date: Set(occurrence_date),
        status: Set(status),
        is_excluded: Set(is_excluded),
        sent_at: Set(None),
        last_error: Set(None),
        claim_token: Set(None),
        claimed_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match record.insert(db).await {
        Ok(inserted) => Ok(inserted),
        Err(err) if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
            Err(Error::DuplicateNotification { profile_id, year })
        }
        Err(err) => Err(err.into()),
    }
}

/// Inserts the record for (person, year) unless one already exists.
///
/// An existing row is never modified, so re-running generation cannot resurrect a SENT or
/// operator-EXCLUDED record into PENDING.
pub async fn upsert<C>(
    db: &C,
    profile_id: i64,
    year: i32,
    birth_date: NaiveDate,
    is_excluded: bool,
) -> Result<UpsertOutcome>
where
    C: ConnectionTrait,
{
    if let Some(existing) = get(db, profile_id, year).await? {
        return Ok(UpsertOutcome::Existing(existing));
    }

    match create_record(db, profile_id, year, birth_date, is_excluded).await {
        Ok(created) => Ok(UpsertOutcome::Created(created)),
        // Lost a race with a concurrent generation run
        Err(Error::DuplicateNotification { .. }) => get(db, profile_id, year)
            .await?
            .map(UpsertOutcome::Existing)
            .ok_or(Error::NoNotificationForYear { profile_id, year }),
        Err(err) => Err(err),
    }
}

/// Finds the record for (person, year).
pub async fn get<C>(
    db: &C,
    profile_id: i64,
    year: i32,
) -> Result<Option<birthday_notification::Model>>
where
    C: ConnectionTrait,
{
    BirthdayNotification::find()
        .filter(birthday_notification::Column::ProfileId.eq(profile_id))
        .filter(birthday_notification::Column::Year.eq(year))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a record by id.
pub async fn get_by_id<C>(db: &C, record_id: i64) -> Result<Option<birthday_notification::Model>>
where
    C: ConnectionTrait,
{
    BirthdayNotification::find_by_id(record_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// All of a person's records from `from_year` onwards, oldest first.
pub async fn list_for_profile_from_year<C>(
    db: &C,
    profile_id: i64,
    from_year: i32,
) -> Result<Vec<birthday_notification::Model>>
where
    C: ConnectionTrait,
{
    BirthdayNotification::find()
        .filter(birthday_notification::Column::ProfileId.eq(profile_id))
        .filter(birthday_notification::Column::Year.gte(from_year))
        .order_by_asc(birthday_notification::Column::Year)
        .all(db)
        .await
        .map_err(Into::into)
}

/// PENDING, unclaimed, non-excluded rows whose send day (`occurrence - lead_days`) is `as_of`.
pub async fn list_due<C>(
    db: &C,
    as_of: NaiveDate,
    lead_days: i32,
) -> Result<Vec<birthday_notification::Model>>
where
    C: ConnectionTrait,
{
    let target = as_of + Duration::days(i64::from(lead_days));
    BirthdayNotification::find()
        .filter(birthday_notification::Column::Status.eq(NotificationStatus::Pending))
        .filter(birthday_notification::Column::IsExcluded.eq(false))
        .filter(birthday_notification::Column::ClaimToken.is_null())
        .filter(birthday_notification::Column::OccurrenceDate.eq(target))
        .order_by_asc(birthday_notification::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Takes ownership of a PENDING row for delivery.
///
/// Returns the claim token when this caller won the row, `None` when another dispatcher
/// (or an operator change) got there first.
pub async fn claim_for_dispatch<C>(db: &C, record_id: i64) -> Result<Option<String>>
where
    C: ConnectionTrait,
{
    let token = Uuid::new_v4().to_string();
    let now = Utc::now();
    let changes = birthday_notification::ActiveModel {
        claim_token: Set(Some(token.clone())),
        claimed_at: Set(Some(now)),
        updated_at: Set(now),
        ..Default::default()
    };

    let result = BirthdayNotification::update_many()
        .set(changes)
        .filter(birthday_notification::Column::Id.eq(record_id))
        .filter(birthday_notification::Column::Status.eq(NotificationStatus::Pending))
        .filter(birthday_notification::Column::ClaimToken.is_null())
        .exec(db)
        .await?;

    if result.rows_affected == 1 {
        debug!(record_id, "Claimed notification for dispatch");
        Ok(Some(token))
    } else {
        Ok(None)
    }
}

/// Moves a claimed PENDING row to SENT or FAILED.
///
/// Returns `false` if the claim was lost in the meantime (e.g. an operator reset the row).
pub async fn complete_dispatch<C>(
    db: &C,
    record_id: i64,
    claim_token: &str,
    outcome: &DeliveryOutcome,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    let mut changes = birthday_notification::ActiveModel {
        claim_token: Set(None),
        claimed_at: Set(None),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    outcome.apply(&mut changes);

    let result = BirthdayNotification::update_many()
        .set(changes)
        .filter(birthday_notification::Column::Id.eq(record_id))
        .filter(birthday_notification::Column::Status.eq(NotificationStatus::Pending))
        .filter(birthday_notification::Column::ClaimToken.eq(claim_token))
        .exec(db)
        .await?;

    if result.rows_affected != 1 {
        warn!(record_id, "Dispatch claim lost before the outcome was written");
    }
    Ok(result.rows_affected == 1)
}

/// Moves PENDING rows whose claim was taken before `claimed_before` to FAILED.
///
/// A claim that old belongs to a dispatcher that stopped between claiming and completing.
/// Whether the transport was reached is unknown, so the row is failed rather than re-armed
/// and waits for an operator resend. Returns the number of rows failed.
pub async fn fail_stale_claims<C>(db: &C, claimed_before: DateTime<Utc>) -> Result<u64>
where
    C: ConnectionTrait,
{
    let changes = birthday_notification::ActiveModel {
        status: Set(NotificationStatus::Failed),
        last_error: Set(Some(STALE_CLAIM_ERROR.to_string())),
        claim_token: Set(None),
        claimed_at: Set(None),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    let result = BirthdayNotification::update_many()
        .set(changes)
        .filter(birthday_notification::Column::Status.eq(NotificationStatus::Pending))
        .filter(birthday_notification::Column::ClaimToken.is_not_null())
        .filter(birthday_notification::Column::ClaimedAt.lt(claimed_before))
        .exec(db)
        .await?;

    if result.rows_affected > 0 {
        warn!(
            rows = result.rows_affected,
            "Failed notifications left claimed by an interrupted dispatch"
        );
    }
    Ok(result.rows_affected)
}

/// Records the outcome of an operator-initiated send, regardless of the current status.
pub async fn record_manual_delivery<C>(
    db: &C,
    record_id: i64,
    outcome: &DeliveryOutcome,
) -> Result<birthday_notification::Model>
where
    C: ConnectionTrait,
{
    let record = get_by_id(db, record_id)
        .await?
        .ok_or(Error::NotificationNotFound { record_id })?;

    let mut active_model: birthday_notification::ActiveModel = record.into();
    active_model.claim_token = Set(None);
    active_model.claimed_at = Set(None);
    active_model.updated_at = Set(Utc::now());
    outcome.apply(&mut active_model);
    Ok(active_model.update(db).await?)
}

/// Unconditionally moves a record to `new_status` (operator path).
///
/// - `Pending` clears `sent_at` and `last_error`
/// - `Sent` stamps `sent_at` (now when not given)
/// - `Failed` requires an error message
pub async fn set_status<C>(
    db: &C,
    record_id: i64,
    new_status: NotificationStatus,
    sent_at: Option<DateTime<Utc>>,
    error: Option<String>,
) -> Result<birthday_notification::Model>
where
    C: ConnectionTrait,
{
    let record = get_by_id(db, record_id)
        .await?
        .ok_or(Error::NotificationNotFound { record_id })?;

    let mut active_model: birthday_notification::ActiveModel = record.into();
    match new_status {
        NotificationStatus::Pending => {
            active_model.sent_at = Set(None);
            active_model.last_error = Set(None);
        }
        NotificationStatus::Sent => {
            active_model.sent_at = Set(Some(sent_at.unwrap_or_else(Utc::now)));
            active_model.last_error = Set(None);
        }
        NotificationStatus::Failed => {
            let error = error.ok_or_else(|| Error::Validation {
                message: "a FAILED record needs an error message".to_string(),
            })?;
            active_model.last_error = Set(Some(error));
        }
        NotificationStatus::Excluded => {}
    }
    active_model.status = Set(new_status);
    active_model.claim_token = Set(None);
    active_model.claimed_at = Set(None);
    active_model.updated_at = Set(Utc::now());

    Ok(active_model.update(db).await?)
}

/// Updates the exclusion mirror (and optionally the status) of one record.
pub(crate) async fn set_exclusion<C>(
    db: &C,
    record: birthday_notification::Model,
    is_excluded: bool,
    new_status: Option<NotificationStatus>,
) -> Result<birthday_notification::Model>
where
    C: ConnectionTrait,
{
    let mut active_model: birthday_notification::ActiveModel = record.into();
    active_model.is_excluded = Set(is_excluded);
    if let Some(status) = new_status {
        active_model.status = Set(status);
        active_model.claim_token = Set(None);
        active_model.claimed_at = Set(None);
    }
    active_model.updated_at = Set(Utc::now());
    Ok(active_model.update(db).await?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::{ProfileSeed, create_profile, date, setup_test_db};

    #[tokio::test]
    async fn test_upsert_creates_then_leaves_existing() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;

        let first = upsert(&db, profile.id, 2025, date(1990, 6, 15), false).await?;
        assert!(matches!(first, UpsertOutcome::Created(_)));
        assert_eq!(first.record().occurrence_date, date(2025, 6, 15));
        assert_eq!(first.record().status, NotificationStatus::Pending);

        // Snapshot is kept even if a different birth date is offered later
        let second = upsert(&db, profile.id, 2025, date(1991, 7, 1), true).await?;
        assert!(matches!(second, UpsertOutcome::Existing(_)));
        assert_eq!(second.record().birth_date, date(1990, 6, 15));
        assert_eq!(second.record().status, NotificationStatus::Pending);

        assert_eq!(BirthdayNotification::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_record_rejects_duplicate() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;

        create_record(&db, profile.id, 2025, date(1990, 6, 15), false).await?;
        let duplicate = create_record(&db, profile.id, 2025, date(1990, 6, 15), false).await;
        assert!(matches!(
            duplicate,
            Err(Error::DuplicateNotification { year: 2025, .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_excluded_profile_gets_excluded_row() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;

        let outcome = upsert(&db, profile.id, 2025, date(1990, 6, 15), true).await?;
        assert_eq!(outcome.record().status, NotificationStatus::Excluded);
        assert!(outcome.record().is_excluded);
        Ok(())
    }

    #[tokio::test]
    async fn test_list_due_respects_lead_days_and_status() -> Result<()> {
        let db = setup_test_db().await?;
        let due = create_profile(&db, ProfileSeed::born("Due", date(1990, 6, 15))).await?;
        let later = create_profile(&db, ProfileSeed::born("Later", date(1990, 6, 16))).await?;
        let excluded = create_profile(&db, ProfileSeed::born("Out", date(1990, 6, 15))).await?;

        upsert(&db, due.id, 2025, date(1990, 6, 15), false).await?;
        upsert(&db, later.id, 2025, date(1990, 6, 16), false).await?;
        upsert(&db, excluded.id, 2025, date(1990, 6, 15), true).await?;

        let same_day = list_due(&db, date(2025, 6, 15), 0).await?;
        assert_eq!(same_day.len(), 1);
        assert_eq!(same_day[0].profile_id, due.id);

        let two_days_ahead = list_due(&db, date(2025, 6, 14), 2).await?;
        assert_eq!(two_days_ahead.len(), 1);
        assert_eq!(two_days_ahead[0].profile_id, later.id);
        Ok(())
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_and_completion_is_compare_and_set() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        let record = upsert(&db, profile.id, 2025, date(1990, 6, 15), false)
            .await?
            .record()
            .clone();

        let token = claim_for_dispatch(&db, record.id).await?.unwrap();
        assert!(claim_for_dispatch(&db, record.id).await?.is_none());
        assert!(list_due(&db, date(2025, 6, 15), 0).await?.is_empty());

        // A stale token cannot complete the row
        let delivered = DeliveryOutcome::Delivered { at: Utc::now() };
        assert!(!complete_dispatch(&db, record.id, "stale", &delivered).await?);
        assert!(complete_dispatch(&db, record.id, &token, &delivered).await?);
        // Second completion is a no-op
        assert!(!complete_dispatch(&db, record.id, &token, &delivered).await?);

        let stored = get_by_id(&db, record.id).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Sent);
        assert!(stored.sent_at.is_some());
        assert!(stored.claim_token.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_fail_stale_claims_only_touches_old_claims() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        let record = upsert(&db, profile.id, 2025, date(1990, 6, 15), false)
            .await?
            .record()
            .clone();
        claim_for_dispatch(&db, record.id).await?.unwrap();

        // A claim younger than the cutoff is left alone
        let cutoff = Utc::now() - Duration::minutes(5);
        assert_eq!(fail_stale_claims(&db, cutoff).await?, 0);
        let claimed = get_by_id(&db, record.id).await?.unwrap();
        assert_eq!(claimed.status, NotificationStatus::Pending);
        assert!(claimed.claimed_at.is_some());

        let cutoff = Utc::now() + Duration::seconds(1);
        assert_eq!(fail_stale_claims(&db, cutoff).await?, 1);
        let stored = get_by_id(&db, record.id).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some(STALE_CLAIM_ERROR));
        assert!(stored.claim_token.is_none());
        assert!(stored.claimed_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_completion_stores_error() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        let record = upsert(&db, profile.id, 2025, date(1990, 6, 15), false)
            .await?
            .record()
            .clone();

        let token = claim_for_dispatch(&db, record.id).await?.unwrap();
        let failed = DeliveryOutcome::Failed {
            reason: "provider rejected number".to_string(),
        };
        assert!(complete_dispatch(&db, record.id, &token, &failed).await?);

        let stored = get_by_id(&db, record.id).await?.unwrap();
        assert_eq!(stored.status, NotificationStatus::Failed);
        assert_eq!(stored.last_error.as_deref(), Some("provider rejected number"));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_status_clears_and_stamps_fields() -> Result<()> {
        let db = setup_test_db().await?;
        let profile = create_profile(&db, ProfileSeed::born("Rina", date(1990, 6, 15))).await?;
        let record = upsert(&db, profile.id, 2025, date(1990, 6, 15), false)
            .await?
            .record()
            .clone();

        let missing_error =
            set_status(&db, record.id, NotificationStatus::Failed, None, None).await;
        assert!(matches!(missing_error, Err(Error::Validation { .. })));

        let sent = set_status(&db, record.id, NotificationStatus::Sent, None, None).await?;
        assert!(sent.sent_at.is_some());

        let pending = set_status(&db, record.id, NotificationStatus::Pending, None, None).await?;
        assert!(pending.sent_at.is_none());
        assert!(pending.last_error.is_none());

        let not_found = set_status(&db, 999, NotificationStatus::Pending, None, None).await;
        assert!(matches!(
            not_found,
            Err(Error::NotificationNotFound { record_id: 999 })
        ));
        Ok(())
    }
}
