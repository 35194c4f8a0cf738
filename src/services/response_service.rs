use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::database::{Repositories, StatusUpdate};
use crate::error::{Error, Result};
use crate::models::interview_token::{InterviewStatus, InterviewToken, RescheduleRequest};
use crate::services::email_service::{response_email, NotificationSender};
use crate::services::token_service::looks_like_token;
use crate::utils::time::{format_in_zone, Clock};

/// A status swap only loses when another response moved the token first, and
/// statuses only move forward, so a handful of retries always settles.
const MAX_TRANSITION_ATTEMPTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseAction {
    Accept,
    Reschedule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseOutcome {
    Accepted,
    /// The link was used before; nothing changed.
    AlreadyAccepted,
    RescheduleRequested,
    /// Repeat reschedule without new details; nothing changed.
    RescheduleAlreadyRequested,
}

#[derive(Debug, Clone)]
pub struct ResponseResult {
    pub outcome: ResponseOutcome,
    pub interview: InterviewToken,
}

#[derive(Clone)]
pub struct ResponseHandler {
    repos: Repositories,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    email_timeout: Duration,
}

impl ResponseHandler {
    pub fn new(
        repos: Repositories,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        email_timeout: Duration,
    ) -> Self {
        Self {
            repos,
            notifier,
            clock,
            email_timeout,
        }
    }

    pub async fn respond(
        &self,
        token_value: &str,
        action: ResponseAction,
        payload: Option<RescheduleRequest>,
    ) -> Result<ResponseResult> {
        let mut token = self.lookup(token_value, action).await?;

        for _ in 0..MAX_TRANSITION_ATTEMPTS {
            let now = self.clock.now();

            if token.is_expired_at(now) {
                self.expire_lazily(&token).await;
                return Err(Error::TokenExpired);
            }

            let (from, update, outcome) = match (action, token.status) {
                (ResponseAction::Accept, InterviewStatus::Accepted) => {
                    return Ok(ResponseResult {
                        outcome: ResponseOutcome::AlreadyAccepted,
                        interview: token,
                    });
                }
                (ResponseAction::Accept, status @ (InterviewStatus::Pending | InterviewStatus::RescheduleRequested)) => (
                    status,
                    StatusUpdate::to(InterviewStatus::Accepted).responded_at(now),
                    ResponseOutcome::Accepted,
                ),
                (ResponseAction::Reschedule, InterviewStatus::Pending) => (
                    InterviewStatus::Pending,
                    StatusUpdate::to(InterviewStatus::RescheduleRequested)
                        .responded_at(now)
                        .with_request(payload.clone().unwrap_or_default()),
                    ResponseOutcome::RescheduleRequested,
                ),
                (ResponseAction::Reschedule, InterviewStatus::RescheduleRequested) => {
                    match payload.as_ref().filter(|p| !p.is_empty()) {
                        // New details replace the stored ones; responded_at keeps the first answer.
                        Some(request) => (
                            InterviewStatus::RescheduleRequested,
                            StatusUpdate::to(InterviewStatus::RescheduleRequested)
                                .with_request(request.clone()),
                            ResponseOutcome::RescheduleRequested,
                        ),
                        None => {
                            return Ok(ResponseResult {
                                outcome: ResponseOutcome::RescheduleAlreadyRequested,
                                interview: token,
                            });
                        }
                    }
                }
                (_, InterviewStatus::Expired) => return Err(Error::TokenExpired),
                (_, status) => return Err(Error::TokenAlreadyTerminal(status.to_string())),
            };

            match self.repos.interviews.transition(token.id, &[from], update).await? {
                Some(updated) => {
                    tracing::info!(
                        interview_id = %updated.id,
                        application_id = %updated.application_id,
                        from = %from,
                        to = %updated.status,
                        "Candidate responded to interview invitation"
                    );
                    self.after_response(&updated).await;
                    return Ok(ResponseResult {
                        outcome,
                        interview: updated,
                    });
                }
                None => {
                    tracing::debug!(interview_id = %token.id, "Concurrent response won; re-reading token");
                    token = self.reload(token.id).await?;
                }
            }
        }

        Err(Error::Internal(format!(
            "interview {} kept changing while responding",
            token.id
        )))
    }

    /// Expire every respondable token whose deadline has passed.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let expired = self.repos.interviews.expire_overdue(self.clock.now()).await?;
        if expired > 0 {
            tracing::info!(count = expired, "Expired unanswered interview invitations");
        }
        Ok(expired)
    }

    async fn lookup(&self, value: &str, action: ResponseAction) -> Result<InterviewToken> {
        if !looks_like_token(value) {
            return Err(Error::TokenNotFound);
        }
        let found = match action {
            ResponseAction::Accept => self.repos.interviews.find_by_acceptance_token(value).await?,
            ResponseAction::Reschedule => {
                self.repos.interviews.find_by_reschedule_token(value).await?
            }
        };
        found.ok_or(Error::TokenNotFound)
    }

    async fn reload(&self, id: Uuid) -> Result<InterviewToken> {
        self.repos
            .interviews
            .get(id)
            .await?
            .ok_or(Error::TokenNotFound)
    }

    async fn expire_lazily(&self, token: &InterviewToken) {
        if !token.status.is_respondable() {
            return;
        }
        match self
            .repos
            .interviews
            .transition(
                token.id,
                &InterviewStatus::RESPONDABLE,
                StatusUpdate::to(InterviewStatus::Expired),
            )
            .await
        {
            Ok(Some(_)) => {
                tracing::info!(interview_id = %token.id, "Interview invitation expired on use")
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(interview_id = %token.id, error = %e, "Failed to mark invitation expired")
            }
        }
    }

    async fn after_response(&self, token: &InterviewToken) {
        let application = match self
            .repos
            .applications
            .get_application(&token.application_id)
            .await
        {
            Ok(Some(application)) => application,
            Ok(None) => {
                tracing::warn!(application_id = %token.application_id, "Responded interview has no application");
                return;
            }
            Err(e) => {
                tracing::warn!(application_id = %token.application_id, error = %e, "Failed to load application after response");
                return;
            }
        };

        let when = format_in_zone(token.scheduled_at, &token.timezone);
        let note = match token.status {
            InterviewStatus::Accepted => format!("Candidate accepted the interview on {}.", when),
            _ => {
                let mut note = format!("Candidate asked to reschedule the interview on {}.", when);
                if let Some(reason) = token
                    .reschedule_request
                    .as_ref()
                    .and_then(|r| r.reason.as_deref())
                    .filter(|r| !r.trim().is_empty())
                {
                    note.push_str(&format!(" Reason: {}", reason.trim()));
                }
                note
            }
        };
        if let Err(e) = self
            .repos
            .applications
            .append_application_note(&application.id, None, &note)
            .await
        {
            tracing::warn!(application_id = %application.id, error = %e, "Failed to record response note");
        }

        let Some(creator) = token.creator() else {
            return;
        };
        let message = response_email(&application, token, creator);
        match tokio::time::timeout(self.email_timeout, self.notifier.send(&message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(interview_id = %token.id, error = %e, "Failed to notify interviewer of response")
            }
            Err(_) => {
                tracing::warn!(interview_id = %token.id, "Interviewer notification timed out")
            }
        }
    }
}
