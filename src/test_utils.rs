//! Shared test utilities.
//!
//! This module provides helpers for setting up in-memory test databases, seeding alumni
//! profiles with sensible defaults, and a recording transport double.

use crate::{
    entities::alumni_profile,
    errors::{Error, Result},
    transport::MessageTransport,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    init_test_tracing();
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Builds a date, panicking on invalid input. Tests only.
#[allow(clippy::unwrap_used)]
#[must_use]
pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// Profile fields for seeding.
#[derive(Debug, Clone)]
pub struct ProfileSeed {
    pub full_name: String,
    pub alumni_cohort: Option<String>,
    pub phone_number: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub is_active: bool,
    pub birthday_excluded: bool,
}

impl ProfileSeed {
    /// Active, not excluded, cohort `"2012"`, phone `+6281200000000`.
    #[must_use]
    pub fn born(name: &str, birth_date: NaiveDate) -> Self {
        Self {
            full_name: name.to_string(),
            alumni_cohort: Some("2012".to_string()),
            phone_number: Some("+6281200000000".to_string()),
            birth_date: Some(birth_date),
            is_active: true,
            birthday_excluded: false,
        }
    }

    /// Like [`ProfileSeed::born`] but without a birth date.
    #[must_use]
    pub fn undated(name: &str) -> Self {
        Self {
            birth_date: None,
            ..Self::born(name, date(2000, 1, 1))
        }
    }
}

/// Inserts a profile row directly into the profile store.
pub async fn create_profile(
    db: &DatabaseConnection,
    seed: ProfileSeed,
) -> Result<alumni_profile::Model> {
    let profile = alumni_profile::ActiveModel {
        full_name: Set(seed.full_name),
        alumni_cohort: Set(seed.alumni_cohort),
        phone_number: Set(seed.phone_number),
        birth_date: Set(seed.birth_date),
        is_active: Set(seed.is_active),
        birthday_excluded: Set(seed.birthday_excluded),
        ..Default::default()
    };
    Ok(profile.insert(db).await?)
}

/// One call seen by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub phone_number: String,
    pub message: String,
    pub attachment_url: Option<String>,
}

/// Transport double that records every call.
///
/// Can be told to fail every send or to stall for a while before answering.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    calls: AtomicUsize,
    fail_with: Option<String>,
    delay: Option<Duration>,
}

impl RecordingTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails with `reason`.
    #[must_use]
    pub fn failing(reason: &str) -> Self {
        Self {
            fail_with: Some(reason.to_string()),
            ..Self::default()
        }
    }

    /// Every send sleeps for `delay` first.
    #[must_use]
    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Number of times `send` was entered.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Messages recorded so far.
    #[allow(clippy::unwrap_used)]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    #[allow(clippy::unwrap_used)]
    async fn send(
        &self,
        phone_number: &str,
        message: &str,
        attachment_url: Option<&str>,
    ) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = &self.fail_with {
            return Err(Error::Transport {
                reason: reason.clone(),
            });
        }
        self.sent.lock().unwrap().push(SentMessage {
            phone_number: phone_number.to_string(),
            message: message.to_string(),
            attachment_url: attachment_url.map(str::to_string),
        });
        Ok(())
    }
}
