use chrono::Duration;
use std::sync::Arc;

use super::{CalendarError, CalendarProvider};
use crate::database::CredentialStore;
use crate::error::{Error, Result};
use crate::models::calendar_credential::CalendarCredential;
use crate::utils::time::Clock;

/// Credentials expiring within this window are refreshed before use.
pub const REFRESH_WINDOW_MINUTES: i64 = 5;

/// Keeps stored calendar credentials usable.
///
/// Concurrent refreshes of the same credential are resolved by a
/// compare-and-swap on `expires_at`: the loser discards its grant and uses
/// whatever the winner stored.
#[derive(Clone)]
pub struct CredentialRefresher {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    window: Duration,
}

impl CredentialRefresher {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            window: Duration::minutes(REFRESH_WINDOW_MINUTES),
        }
    }

    pub async fn ensure_fresh_credentials(
        &self,
        provider: &dyn CalendarProvider,
        credential: CalendarCredential,
    ) -> Result<CalendarCredential> {
        let now = self.clock.now();
        if !credential.expires_within(now, self.window) {
            return Ok(credential);
        }

        if credential.refresh_token.trim().is_empty() {
            tracing::warn!(user_id = %credential.user_id, "Calendar credential has no refresh token");
            return Err(CalendarError::CredentialExpired(format!(
                "{} credential for user {} cannot be refreshed",
                credential.provider, credential.user_id
            ))
            .into());
        }

        tracing::debug!(
            user_id = %credential.user_id,
            provider = %credential.provider,
            expires_at = %credential.expires_at,
            "Refreshing calendar access token"
        );

        let grant = provider
            .refresh_access_token(&credential.refresh_token)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %credential.user_id, error = %e, "Calendar token refresh failed");
                Error::from(e)
            })?;

        let refreshed = CalendarCredential {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| credential.refresh_token.clone()),
            expires_at: now + Duration::seconds(grant.expires_in),
            ..credential.clone()
        };

        if self
            .store
            .replace_calendar_credential(credential.expires_at, &refreshed)
            .await?
        {
            tracing::info!(
                user_id = %refreshed.user_id,
                expires_at = %refreshed.expires_at,
                "Calendar credential refreshed"
            );
            return Ok(refreshed);
        }

        tracing::debug!(user_id = %credential.user_id, "Concurrent refresh won; using stored credential");
        self.store
            .get_calendar_credential(&credential.user_id)
            .await?
            .filter(|c| c.enabled)
            .ok_or(Error::CredentialMissing)
    }
}
