use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Telegram error: {0}")]
    Telegram(String),
}

/// Failures of a single notification (or review request) inside a sweep.
///
/// Everything except `Persistence` ends as a FAILED row with the `Display` text
/// stored in `notifications.error`; `Delivery` keeps the transport reason verbatim.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("unsupported notification kind: {0}")]
    UnsupportedKind(String),

    #[error("{0}")]
    Delivery(String),

    #[error("{0}")]
    BookingUnavailable(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("stuck in processing since {0}")]
    StuckProcessing(NaiveDateTime),
}

impl NotificationError {
    /// Whether the opt-in retry pass may put the row back to PENDING.
    pub fn is_retryable(&self) -> bool {
        match self {
            NotificationError::UnsupportedKind(_) => false,
            NotificationError::Delivery(_) => true,
            NotificationError::BookingUnavailable(_) => false,
            NotificationError::Persistence(_) => true,
            NotificationError::StuckProcessing(_) => true,
        }
    }
}

impl From<AppError> for NotificationError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Database(e) => NotificationError::Persistence(e),
            other => NotificationError::Delivery(other.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Telegram(msg) => {
                tracing::error!("Telegram error: {}", msg);
                (StatusCode::BAD_GATEWAY, "TELEGRAM_ERROR", msg.clone())
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivery_error_displays_reason_verbatim() {
        let err = NotificationError::Delivery("recipient blocked".to_string());
        assert_eq!(err.to_string(), "recipient blocked");
        assert!(err.is_retryable());
    }

    #[test]
    fn unsupported_kind_is_not_retryable() {
        let err = NotificationError::UnsupportedKind("booking_2h".to_string());
        assert_eq!(err.to_string(), "unsupported notification kind: booking_2h");
        assert!(!err.is_retryable());
    }

    #[test]
    fn app_error_maps_to_notification_error() {
        let err: NotificationError = AppError::Telegram("chat not found".to_string()).into();
        match err {
            NotificationError::Delivery(msg) => assert_eq!(msg, "Telegram error: chat not found"),
            other => panic!("expected Delivery, got: {:?}", other),
        }
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = AppError::NotFound("Notification not found".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
