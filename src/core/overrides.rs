//! Operator overrides: exclusion toggling, re-arming, resend and test-send.
//!
//! These are single-target operations, so failures go straight back to the caller instead
//! of being counted like the batch jobs do.

use crate::{
    core::{
        dispatch::{Dispatcher, compose},
        profiles, records,
        records::DeliveryOutcome,
        settings,
        template::{MessageContext, MessageTemplate},
    },
    entities::{NotificationStatus, alumni_profile, birthday_notification},
    errors::{Error, Result},
};
use chrono::Datelike;
use sea_orm::{ConnectionTrait, TransactionTrait};
use serde::Serialize;
use tracing::{info, instrument};

/// Name used for test-sends to people without a profile.
pub const SAMPLE_NAME: &str = "Sample Alumnus";

/// Cohort used for test-sends to people without a profile.
pub const SAMPLE_COHORT: &str = "2010";

/// Age used for test-sends to people without a profile.
pub const SAMPLE_AGE: i32 = 30;

/// What an exclusion toggle changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionChange {
    /// Profile id
    pub profile_id: i64,
    /// New exclusion flag
    pub excluded: bool,
    /// Records whose status flipped
    pub records_changed: usize,
}

/// Result of a test-send; the message that went out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestSendReport {
    /// Where it was sent
    pub phone_number: String,
    /// Rendered body
    pub message: String,
    /// Attachment included, if any
    pub attachment_url: Option<String>,
}

/// Excludes or re-includes a person.
///
/// The profile flag is always written. Records from `current_year` onwards follow it:
/// excluding moves PENDING rows to EXCLUDED, including moves EXCLUDED rows back to PENDING.
/// SENT and FAILED rows keep their status either way.
#[instrument(skip(db))]
pub async fn set_exclusion<C>(
    db: &C,
    profile_id: i64,
    excluded: bool,
    current_year: i32,
) -> Result<ExclusionChange>
where
    C: ConnectionTrait + TransactionTrait,
{
    let txn = db.begin().await?;

    profiles::set_exclusion_flag(&txn, profile_id, excluded).await?;

    let mut records_changed = 0;
    for record in records::list_for_profile_from_year(&txn, profile_id, current_year).await? {
        let new_status = match (excluded, record.status) {
            (true, NotificationStatus::Pending) => Some(NotificationStatus::Excluded),
            (false, NotificationStatus::Excluded) => Some(NotificationStatus::Pending),
            _ => None,
        };
        if new_status.is_some() {
            records_changed += 1;
        }
        records::set_exclusion(&txn, record, excluded, new_status).await?;
    }

    txn.commit().await?;

    info!(profile_id, excluded, records_changed, "Birthday exclusion updated");
    Ok(ExclusionChange {
        profile_id,
        excluded,
        records_changed,
    })
}

/// Forces a person's record for `year` back to PENDING, whatever its status.
///
/// Clears `sent_at`, `last_error` and any dispatch claim; `is_excluded` is left alone.
#[instrument(skip(db))]
pub async fn reset_to_pending<C>(
    db: &C,
    profile_id: i64,
    year: i32,
) -> Result<birthday_notification::Model>
where
    C: ConnectionTrait,
{
    let record = records::get(db, profile_id, year)
        .await?
        .ok_or(Error::NoNotificationForYear { profile_id, year })?;

    let reset =
        records::set_status(db, record.id, NotificationStatus::Pending, None, None).await?;
    info!(
        record_id = reset.id,
        previous_status = ?record.status,
        "Birthday notification reset to pending"
    );
    Ok(reset)
}

/// Sends one record right now, bypassing the schedule and the PENDING guard.
///
/// The outcome is written to the record. A transport failure is recorded as FAILED and
/// also returned as [`Error::Transport`].
#[instrument(skip(dispatcher))]
pub async fn resend<C>(
    dispatcher: &Dispatcher<'_, C>,
    record_id: i64,
) -> Result<birthday_notification::Model>
where
    C: ConnectionTrait,
{
    let db = dispatcher.db();
    let record = records::get_by_id(db, record_id)
        .await?
        .ok_or(Error::NotificationNotFound { record_id })?;
    let profile = profiles::get_profile(db, record.profile_id)
        .await?
        .ok_or(Error::ProfileNotFound {
            profile_id: record.profile_id,
        })?;
    if profile
        .phone_number
        .as_deref()
        .is_none_or(|phone| phone.trim().is_empty())
    {
        return Err(Error::MissingPhoneNumber {
            profile_id: profile.id,
        });
    }

    let settings = settings::get_settings(db).await?;
    let template = MessageTemplate::parse(&settings.message_template)?;

    let outcome = dispatcher
        .deliver(&settings, &template, &record, &profile)
        .await;
    let updated = records::record_manual_delivery(db, record.id, &outcome).await?;

    match outcome {
        DeliveryOutcome::Delivered { .. } => {
            info!(record_id, "Birthday notification resent");
            Ok(updated)
        }
        DeliveryOutcome::Failed { reason } => Err(Error::Transport { reason }),
    }
}

/// Renders a message with the current settings and sends it to `phone_number`.
///
/// Uses the profile's name and cohort when `profile_id` exists, sample values otherwise.
/// Never reads or writes notification records.
#[instrument(skip(dispatcher))]
pub async fn test_send<C>(
    dispatcher: &Dispatcher<'_, C>,
    profile_id: i64,
    phone_number: &str,
) -> Result<TestSendReport>
where
    C: ConnectionTrait,
{
    let phone_number = phone_number.trim();
    if phone_number.is_empty() {
        return Err(Error::Validation {
            message: "phone_number must not be empty".to_string(),
        });
    }

    let db = dispatcher.db();
    let settings = settings::get_settings(db).await?;
    let template = MessageTemplate::parse(&settings.message_template)?;
    let year = settings::today_in(&settings)?.year();

    let profile = profiles::get_profile(db, profile_id).await?;
    let message = match &profile {
        Some(profile @ alumni_profile::Model {
            birth_date: Some(birth_date),
            ..
        }) => compose(&template, &settings, profile, *birth_date, year),
        Some(profile) => template.render(
            &MessageContext {
                name: &profile.full_name,
                cohort: profile.alumni_cohort.as_deref(),
                age: SAMPLE_AGE,
                year,
            },
            settings.include_age,
        ),
        None => template.render(
            &MessageContext {
                name: SAMPLE_NAME,
                cohort: Some(SAMPLE_COHORT),
                age: SAMPLE_AGE,
                year,
            },
            settings.include_age,
        ),
    };

    let attachment_url = settings.attachment_image_url.clone();
    dispatcher
        .send(phone_number, &message, attachment_url.as_deref())
        .await?;

    info!(profile_id, "Test birthday message sent");
    Ok(TestSendReport {
        phone_number: phone_number.to_string(),
        message,
        attachment_url,
    })
}
