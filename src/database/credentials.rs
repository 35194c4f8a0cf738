use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::Result;
use crate::models::calendar_credential::{CalendarCredential, CalendarCredentialRow};
use crate::models::user::User;

/// Users and the calendar credentials they connected.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    async fn get_calendar_credential(&self, user_id: &str) -> Result<Option<CalendarCredential>>;

    /// Insert or overwrite the user's credential, e.g. after an OAuth connect.
    async fn save_calendar_credential(&self, credential: &CalendarCredential) -> Result<()>;

    /// Store a refreshed credential only if the stored expiry still equals
    /// `previous_expires_at`. Returns `false` when another refresh won.
    async fn replace_calendar_credential(
        &self,
        previous_expires_at: DateTime<Utc>,
        credential: &CalendarCredential,
    ) -> Result<bool>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(r#"SELECT id, name, email FROM users WHERE id = $1"#)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn get_calendar_credential(&self, user_id: &str) -> Result<Option<CalendarCredential>> {
        let row = sqlx::query_as::<_, CalendarCredentialRow>(
            r#"
            SELECT user_id, provider, access_token, refresh_token, expires_at, calendar_id, enabled
            FROM calendar_credentials
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(CalendarCredential::try_from).transpose()
    }

    async fn save_calendar_credential(&self, credential: &CalendarCredential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO calendar_credentials
                (user_id, provider, access_token, refresh_token, expires_at, calendar_id, enabled)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id) DO UPDATE SET
                provider = EXCLUDED.provider,
                access_token = EXCLUDED.access_token,
                refresh_token = EXCLUDED.refresh_token,
                expires_at = EXCLUDED.expires_at,
                calendar_id = EXCLUDED.calendar_id,
                enabled = EXCLUDED.enabled,
                updated_at = NOW()
            "#,
        )
        .bind(&credential.user_id)
        .bind(credential.provider.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.calendar_id)
        .bind(credential.enabled)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn replace_calendar_credential(
        &self,
        previous_expires_at: DateTime<Utc>,
        credential: &CalendarCredential,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE calendar_credentials
            SET access_token = $1, refresh_token = $2, expires_at = $3, updated_at = NOW()
            WHERE user_id = $4 AND expires_at = $5
            "#,
        )
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(&credential.user_id)
        .bind(previous_expires_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}
