//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The one constraint entities cannot
//! express, uniqueness of `(profile_id, year)` on notifications, is added as an explicit index.

use crate::entities::{
    AlumniProfile, BirthdayNotification, NotificationSettings, birthday_notification,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema};
use std::path::Path;
use tracing::{debug, info, instrument};

/// Default database location when neither the config file nor `DATABASE_URL` set one.
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/birthday_notifier.sqlite?mode=rwc";

/// Name of the unique index guarding one record per person per year.
pub const UNIQUE_PROFILE_YEAR_INDEX: &str = "uq_birthday_notifications_profile_year";

/// Establishes a connection to the database at `database_url`.
///
/// For file-backed `SQLite` URLs the parent directory is created first.
#[instrument]
pub async fn create_connection(database_url: &str) -> Result<DatabaseConnection> {
    if let Some(parent) = sqlite_file_path(database_url).and_then(|p| p.parent().map(Path::to_path_buf)) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(&parent)?;
            debug!("Ensured database directory {}", parent.display());
        }
    }
    Database::connect(database_url).await.map_err(Into::into)
}

/// File path inside a `sqlite://` URL, or `None` for in-memory and non-SQLite URLs.
fn sqlite_file_path(database_url: &str) -> Option<&Path> {
    let rest = database_url
        .strip_prefix("sqlite://")
        .or_else(|| database_url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.contains(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

/// Creates all tables (if missing) using `SeaORM`'s schema generation from entity definitions.
///
/// Safe to call on every start-up.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut profile_table = schema.create_table_from_entity(AlumniProfile);
    let mut notification_table = schema.create_table_from_entity(BirthdayNotification);
    let mut settings_table = schema.create_table_from_entity(NotificationSettings);

    profile_table.if_not_exists();
    notification_table.if_not_exists();
    settings_table.if_not_exists();

    db.execute(builder.build(&profile_table)).await?;
    db.execute(builder.build(&notification_table)).await?;
    db.execute(builder.build(&settings_table)).await?;

    let unique_profile_year = Index::create()
        .if_not_exists()
        .name(UNIQUE_PROFILE_YEAR_INDEX)
        .table(BirthdayNotification)
        .col(birthday_notification::Column::ProfileId)
        .col(birthday_notification::Column::Year)
        .unique()
        .to_owned();
    db.execute(builder.build(&unique_profile_year)).await?;

    info!("Database tables ensured");
    Ok(())
}
