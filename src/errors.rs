//! Unified error type for the birthday notification engine.
//!
//! Batch jobs (generation, dispatch) swallow per-record failures into their summaries,
//! so every variant here is something a single-record operation hands back to its caller.

use thiserror::Error;

/// All errors produced by the engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or unusable configuration (config file, settings row, cron, timezone).
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// The message template could not be parsed or rendered.
    #[error("Invalid message template: {message}")]
    Template {
        /// Parser diagnostic
        message: String,
    },

    /// Caller supplied an invalid value.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the rejected input
        message: String,
    },

    /// The profile store has no such person.
    #[error("Profile {profile_id} not found")]
    ProfileNotFound {
        /// Requested profile id
        profile_id: i64,
    },

    /// No notification record with this id.
    #[error("Notification record {record_id} not found")]
    NotificationNotFound {
        /// Requested record id
        record_id: i64,
    },

    /// No notification record for this person in this year.
    #[error("No birthday notification for profile {profile_id} in {year}")]
    NoNotificationForYear {
        /// Profile the lookup was for
        profile_id: i64,
        /// Calendar year the lookup was for
        year: i32,
    },

    /// A second record for the same (person, year) was attempted outside the upsert path.
    #[error("Birthday notification for profile {profile_id} in {year} already exists")]
    DuplicateNotification {
        /// Profile of the existing record
        profile_id: i64,
        /// Year of the existing record
        year: i32,
    },

    /// The person has no phone number on file, so nothing can be sent.
    #[error("Cannot send to profile {profile_id}: no phone number on file")]
    MissingPhoneNumber {
        /// Profile without a phone number
        profile_id: i64,
    },

    /// The outbound transport reported a failure or timed out.
    #[error("Transport error: {reason}")]
    Transport {
        /// Reason reported by the transport
        reason: String,
    },

    /// Database error from `SeaORM`.
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// I/O error (config file, listener socket).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
