//! Alumni profile entity - the portal's profile store.
//!
//! The engine does not own these rows. It reads birth dates, names and phone numbers,
//! and writes only the permanent birthday exclusion flag.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Alumni profile database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "alumni_profiles")]
pub struct Model {
    /// Unique identifier for the person
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name used in rendered messages
    pub full_name: String,
    /// Graduation cohort (e.g. `"2012"`), if known
    pub alumni_cohort: Option<String>,
    /// Phone number the transport delivers to
    pub phone_number: Option<String>,
    /// Birth date, if the person filled it in
    pub birth_date: Option<Date>,
    /// Inactive profiles never get birthday notifications generated
    pub is_active: bool,
    /// Permanent opt-out from birthday notifications
    pub birthday_excluded: bool,
}

/// Defines relationships between profiles and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One profile has one birthday notification per year
    #[sea_orm(has_many = "super::birthday_notification::Entity")]
    BirthdayNotifications,
}

impl Related<super::birthday_notification::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BirthdayNotifications.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
