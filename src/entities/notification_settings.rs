//! Notification settings entity - the single process-wide configuration row.
//!
//! A single typed row (id 1), inserted lazily with built-in defaults the first time it is
//! read.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Notification settings database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "notification_settings")]
pub struct Model {
    /// Always 1
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    /// Master switch for the dispatch job
    pub enabled: bool,
    /// Five-field cron expression evaluated in `timezone`
    pub schedule_expression: String,
    /// IANA timezone name used to resolve "today"
    pub timezone: String,
    /// Days before the birthday the message goes out
    pub lead_days: i32,
    /// Whether rendered messages mention the age
    pub include_age: bool,
    /// Message body template
    pub message_template: String,
    /// Optional media attached to every message
    pub attachment_image_url: Option<String>,
    /// When the settings were last modified
    pub updated_at: DateTimeUtc,
}

/// Settings have no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
