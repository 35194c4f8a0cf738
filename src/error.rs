use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

pub const INVALID_LINK_MESSAGE: &str = "This link is invalid or has expired";
pub const REAUTH_MESSAGE: &str = "Calendar access expired, please reconnect";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Application {0} not found")]
    ApplicationNotFound(String),

    #[error("Calendar integration is not connected")]
    CredentialMissing,

    #[error("Calendar credential expired: {0}")]
    CredentialExpired(String),

    #[error("Calendar credential refresh failed: {0}")]
    CredentialRefreshFailed(String),

    #[error("Calendar authentication expired: {0}")]
    AuthenticationExpired(String),

    #[error("Calendar write failed: {0}")]
    CalendarWriteFailed(String),

    #[error("Secure random source unavailable: {0}")]
    EntropySourceUnavailable(String),

    #[error("Notification failed: {0}")]
    NotificationFailed(String),

    #[error("Interview token not found")]
    TokenNotFound,

    #[error("Interview token expired")]
    TokenExpired,

    #[error("Interview token is already {0}")]
    TokenAlreadyTerminal(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Credential-class failures; the caller should prompt a calendar reconnect.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Error::CredentialExpired(_)
                | Error::CredentialRefreshFailed(_)
                | Error::AuthenticationExpired(_)
        )
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message) = match &self {
            Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            Error::Validation(err) => (StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "validation_error", err.to_string()),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Error::ApplicationNotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            Error::CredentialMissing => (
                StatusCode::PRECONDITION_FAILED,
                "calendar_not_connected",
                "Connect a calendar integration before scheduling interviews".to_string(),
            ),
            Error::CredentialExpired(_)
            | Error::CredentialRefreshFailed(_)
            | Error::AuthenticationExpired(_) => (
                StatusCode::UNAUTHORIZED,
                "calendar_reauth_required",
                REAUTH_MESSAGE.to_string(),
            ),
            Error::CalendarWriteFailed(_) => (
                StatusCode::BAD_GATEWAY,
                "calendar_write_failed",
                "The calendar provider rejected the interview hold".to_string(),
            ),
            Error::NotificationFailed(_) => (
                StatusCode::BAD_GATEWAY,
                "notification_failed",
                "The invitation email could not be sent".to_string(),
            ),
            // Not-found and expired links are indistinguishable to the caller.
            Error::TokenNotFound | Error::TokenExpired => (
                StatusCode::NOT_FOUND,
                "invalid_link",
                INVALID_LINK_MESSAGE.to_string(),
            ),
            Error::TokenAlreadyTerminal(_) => (
                StatusCode::CONFLICT,
                "link_already_used",
                "This interview link can no longer be used".to_string(),
            ),
            Error::Config(_)
            | Error::EntropySourceUnavailable(_)
            | Error::Database(_)
            | Error::Internal(_) => {
                tracing::error!(error = %self, "request failed with internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An unexpected error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": code, "message": message }));
        (status, body).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("Resource not found".to_string()),
            other => Error::Database(other),
        }
    }
}
