use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::interview_token::{
    InterviewStatus, InterviewToken, InterviewTokenRow, RescheduleRequest,
};

const TOKEN_COLUMNS: &str = r#"
    id, application_id, created_by, acceptance_token, reschedule_token, scheduled_at, timezone,
    duration_minutes, interview_type, interviewers, location, agenda, notes, calendar_event_id,
    meeting_link, meeting_provider, status, expires_at, responded_at, reschedule_request, created_at
"#;

/// Fields written by a status transition. `None` leaves the stored value as is.
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub status: InterviewStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub reschedule_request: Option<RescheduleRequest>,
}

impl StatusUpdate {
    pub fn to(status: InterviewStatus) -> Self {
        Self {
            status,
            responded_at: None,
            reschedule_request: None,
        }
    }

    pub fn responded_at(mut self, at: DateTime<Utc>) -> Self {
        self.responded_at = Some(at);
        self
    }

    pub fn with_request(mut self, request: RescheduleRequest) -> Self {
        self.reschedule_request = Some(request);
        self
    }

    /// Rejects updates the interview state machine does not allow from any of `from`.
    pub fn check_allowed_from(&self, from: &[InterviewStatus]) -> Result<()> {
        match from.iter().find(|s| !s.can_transition_to(self.status)) {
            Some(illegal) => Err(Error::Internal(format!(
                "illegal interview transition {} -> {}",
                illegal, self.status
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
pub trait InterviewTokenRepository: Send + Sync {
    /// Cancel every active token of the same application, then insert `token`,
    /// as one step. Returns the ids that were cancelled.
    async fn insert_superseding(&self, token: &InterviewToken) -> Result<Vec<Uuid>>;

    async fn get(&self, id: Uuid) -> Result<Option<InterviewToken>>;

    async fn find_by_acceptance_token(&self, value: &str) -> Result<Option<InterviewToken>>;

    async fn find_by_reschedule_token(&self, value: &str) -> Result<Option<InterviewToken>>;

    async fn list_for_application(&self, application_id: &str) -> Result<Vec<InterviewToken>>;

    /// Compare-and-swap on status: applies `update` only while the stored status
    /// is one of `from`. `None` means the swap lost.
    async fn transition(
        &self,
        id: Uuid,
        from: &[InterviewStatus],
        update: StatusUpdate,
    ) -> Result<Option<InterviewToken>>;

    /// Mark respondable tokens whose `expires_at` is before `now` as expired.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct PgInterviewTokenRepository {
    pool: PgPool,
}

impl PgInterviewTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by(&self, column: &str, value: &str) -> Result<Option<InterviewToken>> {
        let sql = format!(
            "SELECT {} FROM interview_tokens WHERE {} = $1",
            TOKEN_COLUMNS, column
        );
        let row = sqlx::query_as::<_, InterviewTokenRow>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(InterviewToken::try_from).transpose()
    }
}

fn status_names(statuses: &[InterviewStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl InterviewTokenRepository for PgInterviewTokenRepository {
    async fn insert_superseding(&self, token: &InterviewToken) -> Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;

        let cancelled: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE interview_tokens
            SET status = 'cancelled', updated_at = NOW()
            WHERE application_id = $1 AND status = ANY($2)
            RETURNING id
            "#,
        )
        .bind(&token.application_id)
        .bind(status_names(&InterviewStatus::ACTIVE))
        .fetch_all(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO interview_tokens (
                id, application_id, created_by, acceptance_token, reschedule_token,
                scheduled_at, timezone, duration_minutes, interview_type, interviewers,
                location, agenda, notes, calendar_event_id, meeting_link, meeting_provider,
                status, expires_at, responded_at, reschedule_request, created_at
            ) VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8, $9, $10,
                $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21
            )
            "#,
        )
        .bind(token.id)
        .bind(&token.application_id)
        .bind(&token.created_by)
        .bind(&token.acceptance_token)
        .bind(&token.reschedule_token)
        .bind(token.scheduled_at)
        .bind(&token.timezone)
        .bind(token.duration_minutes)
        .bind(token.interview_type.as_str())
        .bind(Json(&token.interviewers))
        .bind(&token.location)
        .bind(&token.agenda)
        .bind(&token.notes)
        .bind(&token.calendar_event_id)
        .bind(&token.meeting_link)
        .bind(token.meeting_provider.as_str())
        .bind(token.status.as_str())
        .bind(token.expires_at)
        .bind(token.responded_at)
        .bind(token.reschedule_request.as_ref().map(Json))
        .bind(token.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(cancelled)
    }

    async fn get(&self, id: Uuid) -> Result<Option<InterviewToken>> {
        let sql = format!("SELECT {} FROM interview_tokens WHERE id = $1", TOKEN_COLUMNS);
        let row = sqlx::query_as::<_, InterviewTokenRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(InterviewToken::try_from).transpose()
    }

    async fn find_by_acceptance_token(&self, value: &str) -> Result<Option<InterviewToken>> {
        self.find_by("acceptance_token", value).await
    }

    async fn find_by_reschedule_token(&self, value: &str) -> Result<Option<InterviewToken>> {
        self.find_by("reschedule_token", value).await
    }

    async fn list_for_application(&self, application_id: &str) -> Result<Vec<InterviewToken>> {
        let sql = format!(
            "SELECT {} FROM interview_tokens WHERE application_id = $1 ORDER BY created_at DESC",
            TOKEN_COLUMNS
        );
        let rows = sqlx::query_as::<_, InterviewTokenRow>(&sql)
            .bind(application_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(InterviewToken::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[InterviewStatus],
        update: StatusUpdate,
    ) -> Result<Option<InterviewToken>> {
        update.check_allowed_from(from)?;
        let sql = format!(
            r#"
            UPDATE interview_tokens
            SET status = $2,
                responded_at = COALESCE($3, responded_at),
                reschedule_request = COALESCE($4, reschedule_request),
                updated_at = NOW()
            WHERE id = $1 AND status = ANY($5)
            RETURNING {}
            "#,
            TOKEN_COLUMNS
        );
        let row = sqlx::query_as::<_, InterviewTokenRow>(&sql)
            .bind(id)
            .bind(update.status.as_str())
            .bind(update.responded_at)
            .bind(update.reschedule_request.map(Json))
            .bind(status_names(from))
            .fetch_optional(&self.pool)
            .await?;
        row.map(InterviewToken::try_from).transpose()
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE interview_tokens
            SET status = 'expired', updated_at = NOW()
            WHERE status = ANY($1) AND expires_at < $2
            "#,
        )
        .bind(status_names(&InterviewStatus::RESPONDABLE))
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
