//! Birthday notification entity - one row per person per calendar year.
//!
//! Each row snapshots the birth date at generation time and carries the lifecycle status
//! of that year's message. `(profile_id, year)` is unique; the index is created alongside
//! the table in [`crate::config::database::create_tables`].

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a yearly notification.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationStatus {
    /// Waiting for its send day
    #[sea_orm(string_value = "PENDING")]
    Pending,
    /// Delivered by the transport
    #[sea_orm(string_value = "SENT")]
    Sent,
    /// The transport rejected or timed out; needs an operator resend
    #[sea_orm(string_value = "FAILED")]
    Failed,
    /// The person opted out (or an operator excluded them)
    #[sea_orm(string_value = "EXCLUDED")]
    Excluded,
}

impl std::str::FromStr for NotificationStatus {
    type Err = String;

    /// Parses the stored name, ignoring case.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            "EXCLUDED" => Ok(Self::Excluded),
            other => Err(format!(
                "unknown status '{other}', expected PENDING, SENT, FAILED or EXCLUDED"
            )),
        }
    }
}

/// Birthday notification database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "birthday_notifications")]
pub struct Model {
    /// Unique identifier for the record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Profile this notification is for
    pub profile_id: i64,
    /// Calendar year covered by this record
    pub year: i32,
    /// Birth date copied from the profile at generation time
    pub birth_date: Date,
    /// Birthday mapped into `year`
    pub occurrence_date: Date,
    /// Current lifecycle status
    pub status: NotificationStatus,
    /// Mirror of the profile's exclusion flag
    pub is_excluded: bool,
    /// When the transport accepted the message
    pub sent_at: Option<DateTimeUtc>,
    /// Last transport failure
    pub last_error: Option<String>,
    /// Set while a dispatcher owns the row
    pub claim_token: Option<String>,
    /// When the current claim was taken
    pub claimed_at: Option<DateTimeUtc>,
    /// When the row was generated
    pub created_at: DateTimeUtc,
    /// When the row last changed
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between notifications and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each notification belongs to one profile
    #[sea_orm(
        belongs_to = "super::alumni_profile::Entity",
        from = "Column::ProfileId",
        to = "super::alumni_profile::Column::Id"
    )]
    AlumniProfile,
}

impl Related<super::alumni_profile::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AlumniProfile.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
