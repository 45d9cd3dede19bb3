//! Notification settings - the singleton configuration row.
//!
//! Callers load the settings once per operation and pass the value down; nothing caches
//! them globally. When no row exists yet, [`get_settings`] inserts [`default_settings`].

use crate::{
    core::template::MessageTemplate,
    entities::{NotificationSettings, notification_settings},
    errors::{Error, Result},
    scheduler::cron::CronSchedule,
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use sea_orm::{Set, prelude::*};
use serde::Deserialize;
use tracing::info;

/// Primary key of the settings row.
pub const SETTINGS_ID: i32 = 1;

/// Upper bound for `lead_days`.
pub const MAX_LEAD_DAYS: i32 = 365;

/// Template used until an operator sets one.
pub const DEFAULT_MESSAGE_TEMPLATE: &str = "Happy birthday, {name}!{#age} Congratulations on turning {age}.{/age} \
     Warm wishes from your fellow alumni.";

/// Partial settings update; absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    /// Master switch
    pub enabled: Option<bool>,
    /// Cron expression
    pub schedule_expression: Option<String>,
    /// IANA timezone name
    pub timezone: Option<String>,
    /// Days before the birthday to send
    pub lead_days: Option<i32>,
    /// Mention the age in messages
    pub include_age: Option<bool>,
    /// Message body template
    pub message_template: Option<String>,
    /// Attachment URL; `Some(None)` clears it
    #[serde(default, deserialize_with = "double_option")]
    pub attachment_image_url: Option<Option<String>>,
}

/// Built-in defaults, used when the settings row does not exist yet.
#[must_use]
pub fn default_settings() -> notification_settings::Model {
    notification_settings::Model {
        id: SETTINGS_ID,
        enabled: true,
        schedule_expression: "0 8 * * *".to_string(),
        timezone: "UTC".to_string(),
        lead_days: 0,
        include_age: true,
        message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        attachment_image_url: None,
        updated_at: Utc::now(),
    }
}

/// Loads the settings row, inserting the defaults on first read.
pub async fn get_settings<C>(db: &C) -> Result<notification_settings::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = NotificationSettings::find_by_id(SETTINGS_ID).one(db).await? {
        return Ok(existing);
    }

    let defaults = default_settings();
    let active_model = notification_settings::ActiveModel {
        id: Set(defaults.id),
        enabled: Set(defaults.enabled),
        schedule_expression: Set(defaults.schedule_expression),
        timezone: Set(defaults.timezone),
        lead_days: Set(defaults.lead_days),
        include_age: Set(defaults.include_age),
        message_template: Set(defaults.message_template),
        attachment_image_url: Set(defaults.attachment_image_url),
        updated_at: Set(defaults.updated_at),
    };
    match active_model.insert(db).await {
        Ok(inserted) => {
            info!("Initialised notification settings with defaults");
            Ok(inserted)
        }
        // Someone else inserted the row between our read and write
        Err(_) => NotificationSettings::find_by_id(SETTINGS_ID)
            .one(db)
            .await?
            .ok_or_else(|| Error::Config {
                message: "notification settings row could not be created".to_string(),
            }),
    }
}

/// Applies a partial update after validating every changed field.
pub async fn update_settings<C>(
    db: &C,
    update: SettingsUpdate,
) -> Result<notification_settings::Model>
where
    C: ConnectionTrait,
{
    let current = get_settings(db).await?;

    let mut merged = current.clone();
    if let Some(enabled) = update.enabled {
        merged.enabled = enabled;
    }
    if let Some(expression) = update.schedule_expression {
        merged.schedule_expression = expression.trim().to_string();
    }
    if let Some(timezone) = update.timezone {
        merged.timezone = timezone.trim().to_string();
    }
    if let Some(lead_days) = update.lead_days {
        merged.lead_days = lead_days;
    }
    if let Some(include_age) = update.include_age {
        merged.include_age = include_age;
    }
    if let Some(template) = update.message_template {
        merged.message_template = template;
    }
    if let Some(attachment) = update.attachment_image_url {
        merged.attachment_image_url = attachment.filter(|url| !url.trim().is_empty());
    }

    validate_settings(&merged)?;

    let mut active_model: notification_settings::ActiveModel = current.into();
    active_model.enabled = Set(merged.enabled);
    active_model.schedule_expression = Set(merged.schedule_expression);
    active_model.timezone = Set(merged.timezone);
    active_model.lead_days = Set(merged.lead_days);
    active_model.include_age = Set(merged.include_age);
    active_model.message_template = Set(merged.message_template);
    active_model.attachment_image_url = Set(merged.attachment_image_url);
    active_model.updated_at = Set(Utc::now());

    let updated = active_model.update(db).await?;
    info!(
        enabled = updated.enabled,
        schedule = %updated.schedule_expression,
        timezone = %updated.timezone,
        lead_days = updated.lead_days,
        "Notification settings updated"
    );
    Ok(updated)
}

/// Checks that the settings can drive a dispatch run.
pub fn validate_settings(settings: &notification_settings::Model) -> Result<()> {
    CronSchedule::parse(&settings.schedule_expression)?;
    parse_timezone(&settings.timezone)?;
    if !(0..=MAX_LEAD_DAYS).contains(&settings.lead_days) {
        return Err(Error::Validation {
            message: format!(
                "lead_days must be between 0 and {MAX_LEAD_DAYS}, got {}",
                settings.lead_days
            ),
        });
    }
    MessageTemplate::parse(&settings.message_template)?;
    Ok(())
}

/// Resolves an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>().map_err(|_| Error::Config {
        message: format!("unknown timezone '{name}'"),
    })
}

/// Today's date in the configured timezone.
pub fn today_in(settings: &notification_settings::Model) -> Result<NaiveDate> {
    let tz = parse_timezone(&settings.timezone)?;
    Ok(Utc::now().with_timezone(&tz).date_naive())
}

fn double_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::setup_test_db;

    #[tokio::test]
    async fn test_get_settings_creates_defaults_once() -> Result<()> {
        let db = setup_test_db().await?;

        let first = get_settings(&db).await?;
        assert!(first.enabled);
        assert_eq!(first.schedule_expression, "0 8 * * *");
        assert_eq!(first.lead_days, 0);

        let _second = get_settings(&db).await?;
        assert_eq!(NotificationSettings::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_settings_partial() -> Result<()> {
        let db = setup_test_db().await?;

        let updated = update_settings(
            &db,
            SettingsUpdate {
                lead_days: Some(2),
                timezone: Some("Asia/Jakarta".to_string()),
                attachment_image_url: Some(Some("https://cdn.example.org/cake.png".to_string())),
                ..Default::default()
            },
        )
        .await?;

        assert_eq!(updated.lead_days, 2);
        assert_eq!(updated.timezone, "Asia/Jakarta");
        assert_eq!(
            updated.attachment_image_url.as_deref(),
            Some("https://cdn.example.org/cake.png")
        );
        // Untouched fields keep defaults
        assert!(updated.include_age);
        assert_eq!(updated.message_template, DEFAULT_MESSAGE_TEMPLATE);

        let cleared = update_settings(
            &db,
            SettingsUpdate {
                attachment_image_url: Some(None),
                ..Default::default()
            },
        )
        .await?;
        assert!(cleared.attachment_image_url.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_settings_rejects_invalid_values() -> Result<()> {
        let db = setup_test_db().await?;

        let bad_timezone = update_settings(
            &db,
            SettingsUpdate {
                timezone: Some("Mars/Olympus_Mons".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(bad_timezone, Err(Error::Config { .. })));

        let bad_lead = update_settings(
            &db,
            SettingsUpdate {
                lead_days: Some(-1),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(bad_lead, Err(Error::Validation { .. })));

        let bad_template = update_settings(
            &db,
            SettingsUpdate {
                message_template: Some("Hi {nickname}".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(bad_template, Err(Error::Template { .. })));

        let bad_cron = update_settings(
            &db,
            SettingsUpdate {
                schedule_expression: Some("every morning".to_string()),
                ..Default::default()
            },
        )
        .await;
        assert!(matches!(bad_cron, Err(Error::Config { .. })));

        // Nothing was persisted
        assert_eq!(get_settings(&db).await?.lead_days, 0);
        Ok(())
    }

    #[test]
    fn test_default_settings_are_valid() {
        assert!(validate_settings(&default_settings()).is_ok());
    }
}
