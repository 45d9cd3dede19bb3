//! Core business logic - framework-agnostic jobs, overrides and queries.
//!
//! Nothing in here knows about HTTP or the background timer; the API layer and the
//! scheduler are both plain callers of these functions.

/// Dispatch job: sends the notifications due today
pub mod dispatch;
/// Generation job: one record per person per year
pub mod generation;
/// Operator overrides: exclusion, reset, resend, test-send
pub mod overrides;
/// Profile store interface
pub mod profiles;
/// Filtered, paginated record listing
pub mod query;
/// Notification record store
pub mod records;
/// Birthday occurrence arithmetic
pub mod recurrence;
/// Upcoming/past views and statistics
pub mod report;
/// Notification settings singleton
pub mod settings;
/// Message templates
pub mod template;
