//! Entity module - Contains all SeaORM entity definitions for the database.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod alumni_profile;
pub mod birthday_notification;
pub mod notification_settings;

// Re-export specific types to avoid conflicts
pub use alumni_profile::{
    Column as AlumniProfileColumn, Entity as AlumniProfile, Model as AlumniProfileModel,
};
pub use birthday_notification::{
    Column as BirthdayNotificationColumn, Entity as BirthdayNotification,
    Model as BirthdayNotificationModel, NotificationStatus,
};
pub use notification_settings::{
    Column as NotificationSettingsColumn, Entity as NotificationSettings,
    Model as NotificationSettingsModel,
};
