use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::models::application::{Application, ApplicationRow, ApplicationStatus};

/// Access to the job application aggregate owned by the admin CRUD side.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn get_application(&self, id: &str) -> Result<Option<Application>>;

    async fn update_application_status(&self, id: &str, status: ApplicationStatus) -> Result<()>;

    async fn append_application_note(
        &self,
        id: &str,
        author_id: Option<&str>,
        note: &str,
    ) -> Result<()>;
}

#[derive(Clone)]
pub struct PgApplicationRepository {
    pool: PgPool,
}

impl PgApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationRepository for PgApplicationRepository {
    async fn get_application(&self, id: &str) -> Result<Option<Application>> {
        let row = sqlx::query_as::<_, ApplicationRow>(
            r#"SELECT id, name, email, job_title, status FROM applications WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Application::try_from).transpose()
    }

    async fn update_application_status(&self, id: &str, status: ApplicationStatus) -> Result<()> {
        let result = sqlx::query(
            r#"UPDATE applications SET status = $1, updated_at = NOW() WHERE id = $2"#,
        )
        .bind(status.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::ApplicationNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn append_application_note(
        &self,
        id: &str,
        author_id: Option<&str>,
        note: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO application_notes (application_id, author_id, body) VALUES ($1, $2, $3)"#,
        )
        .bind(id)
        .bind(author_id)
        .bind(note)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
