//! Calendar provider contract and its Google / Microsoft adapters.
//!
//! An adapter knows how to exchange a refresh token and how to create a
//! private busy hold. Deciding *when* to refresh and persisting the result is
//! shared by every adapter and lives in [`credentials::CredentialRefresher`].

pub mod credentials;
pub mod google;
pub mod microsoft;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::models::calendar_credential::{CalendarCredential, CalendarProviderKind};

pub use credentials::CredentialRefresher;
pub use google::GoogleCalendarProvider;
pub use microsoft::MicrosoftCalendarProvider;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    #[error("credential expired: {0}")]
    CredentialExpired(String),

    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),

    #[error("authentication expired: {0}")]
    AuthenticationExpired(String),

    #[error("calendar write failed: {0}")]
    WriteFailed(String),
}

impl From<CalendarError> for Error {
    fn from(err: CalendarError) -> Self {
        match err {
            CalendarError::CredentialExpired(msg) => Error::CredentialExpired(msg),
            CalendarError::RefreshFailed(msg) => Error::CredentialRefreshFailed(msg),
            CalendarError::AuthenticationExpired(msg) => Error::AuthenticationExpired(msg),
            CalendarError::WriteFailed(msg) => Error::CalendarWriteFailed(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttendee {
    pub name: String,
    pub email: String,
}

/// Everything an adapter needs to create an interview hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub title: String,
    pub description: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub timezone: String,
    pub location: Option<String>,
    /// Internal interviewers only.
    pub attendees: Vec<EventAttendee>,
    pub private: bool,
    pub request_meeting_link: bool,
    /// Idempotency key for provider-side conference creation.
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub html_link: Option<String>,
    pub meeting_link: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Result of exchanging a refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub access_token: String,
    pub expires_in: i64,
    /// Present when the provider rotated the refresh token.
    pub refresh_token: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    fn kind(&self) -> CalendarProviderKind;

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, CalendarError>;

    /// Create a private, busy event visible to internal attendees only.
    async fn create_hold_event(
        &self,
        credential: &CalendarCredential,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, CalendarError>;
}

/// Adapters keyed by the provider a credential belongs to.
#[derive(Clone, Default)]
pub struct CalendarProviders {
    providers: HashMap<CalendarProviderKind, Arc<dyn CalendarProvider>>,
}

impl CalendarProviders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: Arc<dyn CalendarProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    pub fn get(&self, kind: CalendarProviderKind) -> Option<Arc<dyn CalendarProvider>> {
        self.providers.get(&kind).cloned()
    }

    pub fn from_config(config: &crate::config::Config) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.calendar_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build calendar HTTP client: {}", e)))?;

        let mut providers = Self::new();
        if let Some(google) = &config.google {
            tracing::info!("Google Calendar integration enabled");
            providers = providers.with(Arc::new(GoogleCalendarProvider::new(
                client.clone(),
                google.clone(),
            )));
        }
        if let Some(microsoft) = &config.microsoft {
            tracing::info!(tenant = %config.microsoft_tenant, "Microsoft Graph integration enabled");
            providers = providers.with(Arc::new(MicrosoftCalendarProvider::new(
                client,
                microsoft.clone(),
                &config.microsoft_tenant,
            )));
        }
        Ok(providers)
    }
}

/// 401s and `invalid_grant` mean the user must reconnect; anything else is a
/// plain write failure.
pub(crate) fn classify_write_failure(provider: &str, status: StatusCode, body: &str) -> CalendarError {
    if status == StatusCode::UNAUTHORIZED || body.contains("invalid_grant") {
        CalendarError::AuthenticationExpired(format!("{} rejected credentials ({})", provider, status))
    } else {
        CalendarError::WriteFailed(format!("{} API error ({}): {}", provider, status, body))
    }
}

pub(crate) fn classify_refresh_failure(provider: &str, status: StatusCode, body: &str) -> CalendarError {
    if status == StatusCode::UNAUTHORIZED || body.contains("invalid_grant") {
        CalendarError::CredentialExpired(format!("{} refresh token rejected ({})", provider, status))
    } else {
        CalendarError::RefreshFailed(format!("{} token refresh failed ({}): {}", provider, status, body))
    }
}

pub(crate) fn transport_failure(provider: &str, err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("{} request timed out", provider)
    } else {
        format!("{} request failed: {}", provider, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_distinct_from_write_failure() {
        assert!(matches!(
            classify_write_failure("Google", StatusCode::UNAUTHORIZED, "{}"),
            CalendarError::AuthenticationExpired(_)
        ));
        assert!(matches!(
            classify_write_failure("Google", StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#),
            CalendarError::AuthenticationExpired(_)
        ));
        assert!(matches!(
            classify_write_failure("Google", StatusCode::FORBIDDEN, "quota"),
            CalendarError::WriteFailed(_)
        ));
    }

    #[test]
    fn refresh_rejections_map_to_expired_credential() {
        assert!(matches!(
            classify_refresh_failure("Microsoft", StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#),
            CalendarError::CredentialExpired(_)
        ));
        assert!(matches!(
            classify_refresh_failure("Microsoft", StatusCode::SERVICE_UNAVAILABLE, "down"),
            CalendarError::RefreshFailed(_)
        ));
    }

    #[test]
    fn calendar_errors_convert_to_taxonomy() {
        let err: Error = CalendarError::AuthenticationExpired("x".into()).into();
        assert!(err.requires_reauth());
        let err: Error = CalendarError::WriteFailed("x".into()).into();
        assert!(matches!(err, Error::CalendarWriteFailed(_)));
    }
}
