//! Administrative HTTP API.
//!
//! All routes live under `/api/v1/birthdays` and speak JSON. Errors come back as
//! `{ "error": ..., "code": ... }` with a status derived from [`crate::errors::Error`].

mod error;
mod extract;
mod handlers;

pub use error::ApiResult;

use crate::{config::AppConfig, transport::MessageTransport};
use axum::{
    Router,
    routing::{get, post, put},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: DatabaseConnection,
    /// Outbound transport
    pub transport: Arc<dyn MessageTransport>,
    /// Process configuration
    pub config: Arc<AppConfig>,
}

fn birthday_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/generate/{year}", post(handlers::generate))
        .route("/send-due", post(handlers::send_due))
        .route("/notifications", get(handlers::list_notifications))
        .route("/notifications/{id}/resend", post(handlers::resend))
        .route("/profiles/{id}/reset", post(handlers::reset_to_pending))
        .route("/profiles/{id}/exclusion", put(handlers::set_exclusion))
        .route("/profiles/{id}/test-send", post(handlers::test_send))
        .route(
            "/settings",
            get(handlers::get_settings).put(handlers::update_settings),
        )
        .route("/upcoming", get(handlers::upcoming))
        .route("/past", get(handlers::past))
        .route("/statistics", get(handlers::statistics))
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1/birthdays", birthday_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
