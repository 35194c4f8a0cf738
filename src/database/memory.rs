//! In-process implementation of every repository trait.
//!
//! Mirrors the PostgreSQL constraints that matter to the scheduling flow:
//! unique token values, one active token per application, and
//! compare-and-swap status/credential updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

use super::applications::ApplicationRepository;
use super::credentials::CredentialStore;
use super::interviews::{InterviewTokenRepository, StatusUpdate};
use crate::error::{Error, Result};
use crate::models::application::{Application, ApplicationNote, ApplicationStatus};
use crate::models::calendar_credential::CalendarCredential;
use crate::models::interview_token::{InterviewStatus, InterviewToken};
use crate::models::user::User;

#[derive(Default)]
struct State {
    applications: HashMap<String, Application>,
    notes: Vec<ApplicationNote>,
    users: HashMap<String, User>,
    credentials: HashMap<String, CalendarCredential>,
    tokens: Vec<InterviewToken>,
    fail_token_writes: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_application(&self, application: Application) {
        self.lock()
            .applications
            .insert(application.id.clone(), application);
    }

    pub fn insert_user(&self, user: User) {
        self.lock().users.insert(user.id.clone(), user);
    }

    pub fn insert_credential(&self, credential: CalendarCredential) {
        self.lock()
            .credentials
            .insert(credential.user_id.clone(), credential);
    }

    /// Store a token row as is, bypassing supersede logic.
    pub fn insert_token(&self, token: InterviewToken) {
        self.lock().tokens.push(token);
    }

    pub fn application(&self, id: &str) -> Option<Application> {
        self.lock().applications.get(id).cloned()
    }

    pub fn credential(&self, user_id: &str) -> Option<CalendarCredential> {
        self.lock().credentials.get(user_id).cloned()
    }

    pub fn tokens(&self) -> Vec<InterviewToken> {
        self.lock().tokens.clone()
    }

    pub fn notes(&self, application_id: &str) -> Vec<ApplicationNote> {
        self.lock()
            .notes
            .iter()
            .filter(|n| n.application_id == application_id)
            .cloned()
            .collect()
    }

    /// Make subsequent token inserts fail like a lost database connection.
    pub fn fail_token_writes(&self, fail: bool) {
        self.lock().fail_token_writes = fail;
    }
}

fn unavailable() -> Error {
    Error::Database(sqlx::Error::Protocol(
        "in-memory store configured to fail".to_string(),
    ))
}

#[async_trait]
impl ApplicationRepository for InMemoryStore {
    async fn get_application(&self, id: &str) -> Result<Option<Application>> {
        Ok(self.lock().applications.get(id).cloned())
    }

    async fn update_application_status(&self, id: &str, status: ApplicationStatus) -> Result<()> {
        let mut state = self.lock();
        let application = state
            .applications
            .get_mut(id)
            .ok_or_else(|| Error::ApplicationNotFound(id.to_string()))?;
        application.status = status;
        Ok(())
    }

    async fn append_application_note(
        &self,
        id: &str,
        author_id: Option<&str>,
        note: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        if !state.applications.contains_key(id) {
            return Err(Error::ApplicationNotFound(id.to_string()));
        }
        state.notes.push(ApplicationNote {
            id: Uuid::new_v4(),
            application_id: id.to_string(),
            author_id: author_id.map(str::to_string),
            body: note.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.lock().users.get(user_id).cloned())
    }

    async fn get_calendar_credential(&self, user_id: &str) -> Result<Option<CalendarCredential>> {
        Ok(self.lock().credentials.get(user_id).cloned())
    }

    async fn save_calendar_credential(&self, credential: &CalendarCredential) -> Result<()> {
        self.insert_credential(credential.clone());
        Ok(())
    }

    async fn replace_calendar_credential(
        &self,
        previous_expires_at: DateTime<Utc>,
        credential: &CalendarCredential,
    ) -> Result<bool> {
        let mut state = self.lock();
        match state.credentials.get_mut(&credential.user_id) {
            Some(stored) if stored.expires_at == previous_expires_at => {
                stored.access_token = credential.access_token.clone();
                stored.refresh_token = credential.refresh_token.clone();
                stored.expires_at = credential.expires_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl InterviewTokenRepository for InMemoryStore {
    async fn insert_superseding(&self, token: &InterviewToken) -> Result<Vec<Uuid>> {
        let mut state = self.lock();
        if state.fail_token_writes {
            return Err(unavailable());
        }
        let duplicate = state.tokens.iter().any(|t| {
            t.id == token.id
                || [&t.acceptance_token, &t.reschedule_token]
                    .iter()
                    .any(|v| **v == token.acceptance_token || **v == token.reschedule_token)
        });
        if duplicate {
            return Err(Error::Database(sqlx::Error::Protocol(
                "duplicate interview token value".to_string(),
            )));
        }

        let mut cancelled = Vec::new();
        for existing in state.tokens.iter_mut().filter(|t| {
            t.application_id == token.application_id
                && InterviewStatus::ACTIVE.contains(&t.status)
        }) {
            existing.status = InterviewStatus::Cancelled;
            cancelled.push(existing.id);
        }
        state.tokens.push(token.clone());
        Ok(cancelled)
    }

    async fn get(&self, id: Uuid) -> Result<Option<InterviewToken>> {
        Ok(self.lock().tokens.iter().find(|t| t.id == id).cloned())
    }

    async fn find_by_acceptance_token(&self, value: &str) -> Result<Option<InterviewToken>> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .find(|t| t.acceptance_token == value)
            .cloned())
    }

    async fn find_by_reschedule_token(&self, value: &str) -> Result<Option<InterviewToken>> {
        Ok(self
            .lock()
            .tokens
            .iter()
            .find(|t| t.reschedule_token == value)
            .cloned())
    }

    async fn list_for_application(&self, application_id: &str) -> Result<Vec<InterviewToken>> {
        let mut tokens: Vec<InterviewToken> = self
            .lock()
            .tokens
            .iter()
            .filter(|t| t.application_id == application_id)
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[InterviewStatus],
        update: StatusUpdate,
    ) -> Result<Option<InterviewToken>> {
        update.check_allowed_from(from)?;
        let mut state = self.lock();
        let Some(token) = state
            .tokens
            .iter_mut()
            .find(|t| t.id == id && from.contains(&t.status))
        else {
            return Ok(None);
        };
        token.status = update.status;
        if let Some(at) = update.responded_at {
            token.responded_at = Some(at);
        }
        if let Some(request) = update.reschedule_request {
            token.reschedule_request = Some(request);
        }
        Ok(Some(token.clone()))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.lock();
        let mut expired = 0;
        for token in state
            .tokens
            .iter_mut()
            .filter(|t| t.status.is_respondable() && t.expires_at < now)
        {
            token.status = InterviewStatus::Expired;
            expired += 1;
        }
        Ok(expired)
    }
}
