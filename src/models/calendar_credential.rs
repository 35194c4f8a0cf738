use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// External calendar service backing a user's integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarProviderKind {
    Google,
    Microsoft,
}

impl CalendarProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarProviderKind::Google => "google",
            CalendarProviderKind::Microsoft => "microsoft",
        }
    }
}

impl fmt::Display for CalendarProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalendarProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(CalendarProviderKind::Google),
            "microsoft" => Ok(CalendarProviderKind::Microsoft),
            other => Err(format!("unknown calendar provider '{}'", other)),
        }
    }
}

/// OAuth credential a user granted for their calendar.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarCredential {
    pub user_id: String,
    pub provider: CalendarProviderKind,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub calendar_id: String,
    pub enabled: bool,
}

impl CalendarCredential {
    /// True when the access token is already expired or expires within `window`.
    pub fn expires_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.expires_at <= now + window
    }
}

// Token values stay out of logs.
impl fmt::Debug for CalendarCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarCredential")
            .field("user_id", &self.user_id)
            .field("provider", &self.provider)
            .field("expires_at", &self.expires_at)
            .field("calendar_id", &self.calendar_id)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct CalendarCredentialRow {
    pub user_id: String,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub calendar_id: String,
    pub enabled: bool,
}

impl TryFrom<CalendarCredentialRow> for CalendarCredential {
    type Error = crate::error::Error;

    fn try_from(row: CalendarCredentialRow) -> Result<Self, Self::Error> {
        Ok(CalendarCredential {
            user_id: row.user_id,
            provider: row.provider.parse().map_err(crate::error::Error::Internal)?,
            access_token: row.access_token,
            refresh_token: row.refresh_token,
            expires_at: row.expires_at,
            calendar_id: row.calendar_id,
            enabled: row.enabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: DateTime<Utc>) -> CalendarCredential {
        CalendarCredential {
            user_id: "u1".into(),
            provider: CalendarProviderKind::Google,
            access_token: "secret-access".into(),
            refresh_token: "secret-refresh".into(),
            expires_at,
            calendar_id: "primary".into(),
            enabled: true,
        }
    }

    #[test]
    fn expiry_window_is_inclusive() {
        let now = Utc::now();
        let window = Duration::minutes(5);
        assert!(credential(now + Duration::minutes(5)).expires_within(now, window));
        assert!(credential(now - Duration::minutes(1)).expires_within(now, window));
        assert!(!credential(now + Duration::minutes(6)).expires_within(now, window));
    }

    #[test]
    fn debug_output_hides_tokens() {
        let rendered = format!("{:?}", credential(Utc::now()));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }
}
