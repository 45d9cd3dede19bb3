//! Axum handlers for the admin API. Each one is a thin shell over a `core` operation.

use super::{
    AppState,
    error::ApiResult,
    extract::{ApiJson, ApiPath, ApiQuery},
};
use crate::{
    core::{
        dispatch::{DispatchSummary, Dispatcher},
        generation::{self, GenerationSummary},
        overrides::{self, ExclusionChange, TestSendReport},
        query::{
            self, NotificationFilter, NotificationRow, PageRequest, Paginated, empty_as_none,
        },
        report::{self, BirthdayEntry, Statistics},
        settings::{self, SettingsUpdate},
    },
    entities::{birthday_notification, notification_settings},
};
use axum::{Json, extract::State};
use chrono::{Datelike, NaiveDate};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{Value, json};

/// Window used by `/upcoming` and `/past` when `days` is absent.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// `?year=` override.
#[derive(Debug, Deserialize)]
pub struct YearParam {
    /// Defaults to the current year in the configured timezone
    #[serde(default, deserialize_with = "empty_as_none")]
    pub year: Option<i32>,
}

/// `?days=` window.
#[derive(Debug, Deserialize)]
pub struct WindowParam {
    /// Defaults to [`DEFAULT_WINDOW_DAYS`]
    #[serde(default, deserialize_with = "empty_as_none")]
    pub days: Option<i64>,
}

/// Body of `PUT /profiles/{id}/exclusion`.
#[derive(Debug, Deserialize)]
pub struct ExclusionBody {
    /// New exclusion flag
    pub excluded: bool,
}

/// Body of `POST /profiles/{id}/test-send`.
#[derive(Debug, Deserialize)]
pub struct TestSendBody {
    /// Where to send the sample
    pub phone_number: String,
}

impl AppState {
    fn dispatcher(&self) -> Dispatcher<'_, DatabaseConnection> {
        Dispatcher::new(
            &self.db,
            self.transport.as_ref(),
            self.config.transport.timeout(),
        )
    }
}

/// Today in the configured timezone.
async fn local_today(db: &DatabaseConnection) -> ApiResult<NaiveDate> {
    let settings = settings::get_settings(db).await?;
    settings::today_in(&settings)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn generate(
    State(state): State<AppState>,
    ApiPath(year): ApiPath<i32>,
) -> ApiResult<Json<GenerationSummary>> {
    Ok(Json(generation::generate_for_year(&state.db, year).await?))
}

pub async fn send_due(State(state): State<AppState>) -> ApiResult<Json<DispatchSummary>> {
    Ok(Json(state.dispatcher().send_due_now().await?))
}

pub async fn resend(
    State(state): State<AppState>,
    ApiPath(record_id): ApiPath<i64>,
) -> ApiResult<Json<birthday_notification::Model>> {
    Ok(Json(overrides::resend(&state.dispatcher(), record_id).await?))
}

pub async fn reset_to_pending(
    State(state): State<AppState>,
    ApiPath(profile_id): ApiPath<i64>,
    ApiQuery(params): ApiQuery<YearParam>,
) -> ApiResult<Json<birthday_notification::Model>> {
    let year = match params.year {
        Some(year) => year,
        None => local_today(&state.db).await?.year(),
    };
    Ok(Json(
        overrides::reset_to_pending(&state.db, profile_id, year).await?,
    ))
}

pub async fn set_exclusion(
    State(state): State<AppState>,
    ApiPath(profile_id): ApiPath<i64>,
    ApiJson(body): ApiJson<ExclusionBody>,
) -> ApiResult<Json<ExclusionChange>> {
    let current_year = local_today(&state.db).await?.year();
    Ok(Json(
        overrides::set_exclusion(&state.db, profile_id, body.excluded, current_year).await?,
    ))
}

pub async fn test_send(
    State(state): State<AppState>,
    ApiPath(profile_id): ApiPath<i64>,
    ApiJson(body): ApiJson<TestSendBody>,
) -> ApiResult<Json<TestSendReport>> {
    Ok(Json(
        overrides::test_send(&state.dispatcher(), profile_id, &body.phone_number).await?,
    ))
}

pub async fn get_settings(
    State(state): State<AppState>,
) -> ApiResult<Json<notification_settings::Model>> {
    Ok(Json(settings::get_settings(&state.db).await?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    ApiJson(update): ApiJson<SettingsUpdate>,
) -> ApiResult<Json<notification_settings::Model>> {
    Ok(Json(settings::update_settings(&state.db, update).await?))
}

pub async fn list_notifications(
    State(state): State<AppState>,
    ApiQuery(filter): ApiQuery<NotificationFilter>,
    ApiQuery(page): ApiQuery<PageRequest>,
) -> ApiResult<Json<Paginated<NotificationRow>>> {
    let current_year = local_today(&state.db).await?.year();
    Ok(Json(
        query::list_notifications(&state.db, &filter, page, current_year).await?,
    ))
}

pub async fn upcoming(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<WindowParam>,
) -> ApiResult<Json<Vec<BirthdayEntry>>> {
    let today = local_today(&state.db).await?;
    let days = params.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    Ok(Json(report::upcoming(&state.db, today, days).await?))
}

pub async fn past(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<WindowParam>,
) -> ApiResult<Json<Vec<BirthdayEntry>>> {
    let today = local_today(&state.db).await?;
    let days = params.days.unwrap_or(DEFAULT_WINDOW_DAYS);
    Ok(Json(report::past(&state.db, today, days).await?))
}

pub async fn statistics(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<YearParam>,
) -> ApiResult<Json<Statistics>> {
    let year = match params.year {
        Some(year) => year,
        None => local_today(&state.db).await?.year(),
    };
    Ok(Json(report::statistics(&state.db, year).await?))
}
