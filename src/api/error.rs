use crate::errors::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Handler result.
pub type ApiResult<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status and stable error code for this error.
    #[must_use]
    pub const fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::ProfileNotFound { .. }
            | Self::NotificationNotFound { .. }
            | Self::NoNotificationForYear { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation { .. } | Self::Template { .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            Self::Config { .. } => (StatusCode::BAD_REQUEST, "CONFIG_ERROR"),
            Self::MissingPhoneNumber { .. } => (StatusCode::BAD_REQUEST, "MISSING_PHONE_NUMBER"),
            Self::DuplicateNotification { .. } => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Transport { .. } => (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR"),
            Self::Database(_) | Self::Io(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::NotificationNotFound { record_id: 1 }
                .status_and_code()
                .0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::MissingPhoneNumber { profile_id: 1 }
                .status_and_code()
                .0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::DuplicateNotification {
                profile_id: 1,
                year: 2025
            }
            .status_and_code()
            .0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            Error::Transport {
                reason: "down".to_string()
            }
            .status_and_code()
            .0,
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_internal_errors_are_sanitised() {
        let response = Error::Database(sea_orm::DbErr::Custom("disk I/O error".to_string()))
            .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
