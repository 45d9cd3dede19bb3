//! Filtered, paginated listing of notification records joined with their profiles.

use crate::{
    entities::{
        AlumniProfile, BirthdayNotification, NotificationStatus, alumni_profile,
        birthday_notification,
    },
    errors::{Error, Result},
};
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{Condition, Order, QueryOrder, prelude::*};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Default page size.
pub const DEFAULT_PER_PAGE: u64 = 25;

/// Largest page size a caller may ask for.
pub const MAX_PER_PAGE: u64 = 200;

/// List filter. Absent or empty fields are ignored, except `year` which defaults to the
/// current year.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationFilter {
    /// Occurrence year
    #[serde(default, deserialize_with = "empty_as_none")]
    pub year: Option<i32>,
    /// Exact cohort
    #[serde(default, deserialize_with = "empty_as_none")]
    pub alumni_cohort: Option<String>,
    /// Record status
    #[serde(default, deserialize_with = "empty_as_none")]
    pub status: Option<NotificationStatus>,
    /// Exclusion mirror on the record
    #[serde(default, deserialize_with = "empty_as_none")]
    pub is_excluded: Option<bool>,
    /// Occurrence date lower bound (inclusive)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub notification_from: Option<NaiveDate>,
    /// Occurrence date upper bound (inclusive)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub notification_to: Option<NaiveDate>,
    /// Birth date lower bound (inclusive)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub birth_from: Option<NaiveDate>,
    /// Birth date upper bound (inclusive)
    #[serde(default, deserialize_with = "empty_as_none")]
    pub birth_to: Option<NaiveDate>,
    /// Substring of the person's name
    #[serde(default, deserialize_with = "empty_as_none")]
    pub name: Option<String>,
}

/// Reads a query-string value, treating a missing or blank value as `None`.
pub(crate) fn empty_as_none<'de, D, T>(
    deserializer: D,
) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Sortable columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    /// Record id
    Id,
    /// Profile id
    ProfileId,
    /// Person's name
    FullName,
    /// Cohort
    AlumniCohort,
    /// Occurrence year
    Year,
    /// Birth date snapshot
    BirthDate,
    /// Occurrence date
    #[default]
    OccurrenceDate,
    /// Status
    Status,
    /// Exclusion mirror
    IsExcluded,
    /// Delivery time
    SentAt,
    /// Last failure
    LastError,
    /// Creation time
    CreatedAt,
    /// Last change
    UpdatedAt,
}

impl SortColumn {
    fn apply<S: QueryOrder>(self, select: S, order: Order) -> S {
        use birthday_notification::Column as N;
        match self {
            Self::Id => select.order_by(N::Id, order),
            Self::ProfileId => select.order_by(N::ProfileId, order),
            Self::FullName => select.order_by(alumni_profile::Column::FullName, order),
            Self::AlumniCohort => select.order_by(alumni_profile::Column::AlumniCohort, order),
            Self::Year => select.order_by(N::Year, order),
            Self::BirthDate => select.order_by(N::BirthDate, order),
            Self::OccurrenceDate => select.order_by(N::OccurrenceDate, order),
            Self::Status => select.order_by(N::Status, order),
            Self::IsExcluded => select.order_by(N::IsExcluded, order),
            Self::SentAt => select.order_by(N::SentAt, order),
            Self::LastError => select.order_by(N::LastError, order),
            Self::CreatedAt => select.order_by(N::CreatedAt, order),
            Self::UpdatedAt => select.order_by(N::UpdatedAt, order),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl From<SortDirection> for Order {
    fn from(direction: SortDirection) -> Self {
        match direction {
            SortDirection::Asc => Self::Asc,
            SortDirection::Desc => Self::Desc,
        }
    }
}

/// Page and ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    /// 1-based page number
    #[serde(default = "default_page")]
    pub page: u64,
    /// Rows per page
    #[serde(default = "default_per_page")]
    pub per_page: u64,
    /// Sort column
    #[serde(default)]
    pub sort_by: SortColumn,
    /// Sort direction
    #[serde(default)]
    pub direction: SortDirection,
}

const fn default_page() -> u64 {
    1
}

const fn default_per_page() -> u64 {
    DEFAULT_PER_PAGE
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
            sort_by: SortColumn::default(),
            direction: SortDirection::default(),
        }
    }
}

/// One listed record with the profile fields an operator needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRow {
    /// Record id
    pub id: i64,
    /// Profile id
    pub profile_id: i64,
    /// Person's name (empty if the profile is gone)
    pub full_name: String,
    /// Cohort
    pub alumni_cohort: Option<String>,
    /// Phone number on file
    pub phone_number: Option<String>,
    /// Occurrence year
    pub year: i32,
    /// Birth date snapshot
    pub birth_date: NaiveDate,
    /// Occurrence date
    pub occurrence_date: NaiveDate,
    /// Status
    pub status: NotificationStatus,
    /// Exclusion mirror
    pub is_excluded: bool,
    /// Delivery time
    pub sent_at: Option<DateTime<Utc>>,
    /// Last failure
    pub last_error: Option<String>,
}

impl NotificationRow {
    fn from_pair(
        record: birthday_notification::Model,
        profile: Option<alumni_profile::Model>,
    ) -> Self {
        let (full_name, alumni_cohort, phone_number) = profile
            .map(|p| (p.full_name, p.alumni_cohort, p.phone_number))
            .unwrap_or_default();
        Self {
            id: record.id,
            profile_id: record.profile_id,
            full_name,
            alumni_cohort,
            phone_number,
            year: record.year,
            birth_date: record.birth_date,
            occurrence_date: record.occurrence_date,
            status: record.status,
            is_excluded: record.is_excluded,
            sent_at: record.sent_at,
            last_error: record.last_error,
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paginated<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// 1-based page number
    pub page: u64,
    /// Requested page size
    pub per_page: u64,
    /// Rows matching the filter
    pub total_items: u64,
    /// Pages available
    pub total_pages: u64,
}

fn build_condition(filter: &NotificationFilter, current_year: i32) -> Condition {
    use birthday_notification::Column as N;

    let mut condition = Condition::all().add(N::Year.eq(filter.year.unwrap_or(current_year)));

    if let Some(cohort) = filter.alumni_cohort.as_deref().filter(|c| !c.trim().is_empty()) {
        condition = condition.add(alumni_profile::Column::AlumniCohort.eq(cohort.trim()));
    }
    if let Some(status) = filter.status {
        condition = condition.add(N::Status.eq(status));
    }
    if let Some(is_excluded) = filter.is_excluded {
        condition = condition.add(N::IsExcluded.eq(is_excluded));
    }
    if let Some(from) = filter.notification_from {
        condition = condition.add(N::OccurrenceDate.gte(from));
    }
    if let Some(to) = filter.notification_to {
        condition = condition.add(N::OccurrenceDate.lte(to));
    }
    if let Some(from) = filter.birth_from {
        condition = condition.add(N::BirthDate.gte(from));
    }
    if let Some(to) = filter.birth_to {
        condition = condition.add(N::BirthDate.lte(to));
    }
    if let Some(name) = filter.name.as_deref().filter(|n| !n.trim().is_empty()) {
        condition = condition.add(alumni_profile::Column::FullName.contains(name.trim()));
    }
    condition
}

/// Lists records matching `filter`, one page at a time.
pub async fn list_notifications<C>(
    db: &C,
    filter: &NotificationFilter,
    page: PageRequest,
    current_year: i32,
) -> Result<Paginated<NotificationRow>>
where
    C: ConnectionTrait,
{
    if page.page == 0 {
        return Err(Error::Validation {
            message: "page numbers start at 1".to_string(),
        });
    }
    if !(1..=MAX_PER_PAGE).contains(&page.per_page) {
        return Err(Error::Validation {
            message: format!("per_page must be between 1 and {MAX_PER_PAGE}"),
        });
    }

    let select = BirthdayNotification::find()
        .find_also_related(AlumniProfile)
        .filter(build_condition(filter, current_year));
    let paginator = page
        .sort_by
        .apply(select, page.direction.into())
        .order_by_asc(birthday_notification::Column::Id)
        .paginate(db, page.per_page);

    let totals = paginator.num_items_and_pages().await?;
    let items = paginator
        .fetch_page(page.page - 1)
        .await?
        .into_iter()
        .map(|(record, profile)| NotificationRow::from_pair(record, profile))
        .collect();

    Ok(Paginated {
        items,
        page: page.page,
        per_page: page.per_page,
        total_items: totals.number_of_items,
        total_pages: totals.number_of_pages,
    })
}
