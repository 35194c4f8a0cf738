//! Interview scheduling.
//!
//! `schedule` runs its side effects in a fixed order: calendar hold, then the
//! token row, then the candidate email. A failed hold leaves nothing behind.
//! A failed email is reported in [`NotificationOutcome`] and never undoes the
//! hold or the token.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::database::Repositories;
use crate::error::{Error, Result};
use crate::models::application::{Application, ApplicationStatus};
use crate::models::calendar_credential::CalendarProviderKind;
use crate::models::interview_token::{
    InterviewStatus, InterviewToken, InterviewType, Interviewer, MeetingProvider,
};
use crate::models::user::User;
use crate::services::calendar::{
    CalendarEvent, CalendarProviders, CredentialRefresher, EventAttendee, EventSpec,
};
use crate::services::email_service::{invitation_email, NotificationSender, ResponseLinks};
use crate::services::token_service::TokenIssuer;
use crate::utils::time::{format_in_zone, Clock, TimeSlot};

/// Longest interview a single hold may cover.
pub const MAX_DURATION_MINUTES: i32 = 8 * 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterviewFormat {
    Video { meeting_link: Option<String> },
    Phone,
    InPerson { location: String },
}

impl InterviewFormat {
    pub fn interview_type(&self) -> InterviewType {
        match self {
            InterviewFormat::Video { .. } => InterviewType::Video,
            InterviewFormat::Phone => InterviewType::Phone,
            InterviewFormat::InPerson { .. } => InterviewType::InPerson,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterviewParams {
    pub format: InterviewFormat,
    pub duration_minutes: i32,
    pub interviewers: Vec<Interviewer>,
    pub agenda: Option<String>,
    pub notes: Option<String>,
}

impl InterviewParams {
    pub fn validate(&self) -> Result<()> {
        if self.duration_minutes <= 0 || self.duration_minutes > MAX_DURATION_MINUTES {
            return Err(Error::BadRequest(format!(
                "Duration must be between 1 and {} minutes",
                MAX_DURATION_MINUTES
            )));
        }
        if self.interviewers.is_empty() {
            return Err(Error::BadRequest(
                "At least one interviewer is required".to_string(),
            ));
        }
        if self
            .interviewers
            .iter()
            .any(|i| i.name.trim().is_empty() || !i.email.contains('@'))
        {
            return Err(Error::BadRequest(
                "Every interviewer needs a name and an email address".to_string(),
            ));
        }
        match &self.format {
            InterviewFormat::InPerson { location } if location.trim().is_empty() => Err(
                Error::BadRequest("In-person interviews require a location".to_string()),
            ),
            InterviewFormat::Video {
                meeting_link: Some(link),
            } if Url::parse(link).is_err() => {
                Err(Error::BadRequest("Meeting link must be a valid URL".to_string()))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleRequest {
    pub application_id: String,
    pub time_slot: TimeSlot,
    pub params: InterviewParams,
    pub notify_candidate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent,
    /// The caller chose not to email the candidate.
    Skipped,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEventSummary {
    pub provider: CalendarProviderKind,
    pub event_id: String,
    pub html_link: Option<String>,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResult {
    pub interview_id: Uuid,
    pub status: InterviewStatus,
    pub scheduled_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub calendar_event: CalendarEventSummary,
    pub notification: NotificationOutcome,
    pub superseded: Vec<Uuid>,
    pub application_status: ApplicationStatus,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub public_base_url: Url,
    pub token_ttl: Duration,
    pub calendar_timeout: std::time::Duration,
    pub email_timeout: std::time::Duration,
    pub company_name: String,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            public_base_url: config.public_base_url.clone(),
            token_ttl: Duration::days(config.token_ttl_days),
            calendar_timeout: config.calendar_timeout,
            email_timeout: config.email_timeout,
            company_name: config.company_name.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InterviewScheduler {
    repos: Repositories,
    providers: CalendarProviders,
    refresher: CredentialRefresher,
    notifier: Arc<dyn NotificationSender>,
    issuer: TokenIssuer,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
}

impl InterviewScheduler {
    pub fn new(
        repos: Repositories,
        providers: CalendarProviders,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            refresher: CredentialRefresher::new(repos.credentials.clone(), clock.clone()),
            repos,
            providers,
            notifier,
            issuer: TokenIssuer::default(),
            clock,
            settings,
        }
    }

    pub fn with_token_issuer(mut self, issuer: TokenIssuer) -> Self {
        self.issuer = issuer;
        self
    }

    pub async fn schedule(&self, user_id: &str, request: ScheduleRequest) -> Result<ScheduleResult> {
        request.params.validate()?;
        let start = request.time_slot.start_utc()?;
        let end = start + Duration::minutes(i64::from(request.params.duration_minutes));
        let now = self.clock.now();
        if start <= now {
            return Err(Error::BadRequest(
                "Interview time must be in the future".to_string(),
            ));
        }

        let application = self
            .repos
            .applications
            .get_application(&request.application_id)
            .await?
            .ok_or_else(|| Error::ApplicationNotFound(request.application_id.clone()))?;

        let user = self
            .repos
            .credentials
            .get_user(user_id)
            .await?
            .ok_or_else(|| Error::Unauthorized(format!("Unknown user {}", user_id)))?;

        let credential = self
            .repos
            .credentials
            .get_calendar_credential(user_id)
            .await?
            .filter(|c| c.enabled)
            .ok_or(Error::CredentialMissing)?;

        let provider = self.providers.get(credential.provider).ok_or_else(|| {
            Error::Config(format!(
                "{} calendar integration is not configured",
                credential.provider
            ))
        })?;

        let credential = tokio::time::timeout(
            self.settings.calendar_timeout,
            self.refresher
                .ensure_fresh_credentials(provider.as_ref(), credential),
        )
        .await
        .map_err(|_| {
            Error::CredentialRefreshFailed(format!(
                "token refresh timed out after {}s",
                self.settings.calendar_timeout.as_secs()
            ))
        })??;

        let interviewers = merge_interviewers(&user, &request.params.interviewers);
        let interview_id = Uuid::new_v4();
        // Issued before the hold so a broken random source leaves nothing to clean up.
        let tokens = self.issuer.issue()?;

        let spec = build_event_spec(
            interview_id,
            &application,
            &request,
            &interviewers,
            start,
            end,
        );

        let event = tokio::time::timeout(
            self.settings.calendar_timeout,
            provider.create_hold_event(&credential, &spec),
        )
        .await
        .map_err(|_| {
            Error::CalendarWriteFailed(format!(
                "{} calendar timed out after {}s",
                credential.provider,
                self.settings.calendar_timeout.as_secs()
            ))
        })?
        .map_err(|e| {
            tracing::warn!(
                application_id = %application.id,
                provider = %credential.provider,
                error = %e,
                "Calendar hold was not created"
            );
            Error::from(e)
        })?;

        let (meeting_link, meeting_provider) = match &request.params.format {
            InterviewFormat::Video {
                meeting_link: Some(link),
            } => (Some(link.clone()), MeetingProvider::Manual),
            _ => (event.meeting_link.clone(), credential.provider.into()),
        };

        let (status, responded_at) = if request.notify_candidate {
            (InterviewStatus::Pending, None)
        } else {
            (InterviewStatus::Accepted, Some(now))
        };

        let token = InterviewToken {
            id: interview_id,
            application_id: application.id.clone(),
            created_by: user.id.clone(),
            acceptance_token: tokens.acceptance_token,
            reschedule_token: tokens.reschedule_token,
            scheduled_at: start,
            timezone: request.time_slot.timezone.name().to_string(),
            duration_minutes: request.params.duration_minutes,
            interview_type: request.params.format.interview_type(),
            interviewers,
            location: match &request.params.format {
                InterviewFormat::InPerson { location } => Some(location.trim().to_string()),
                _ => None,
            },
            agenda: request.params.agenda.clone(),
            notes: request.params.notes.clone(),
            calendar_event_id: event.id.clone(),
            meeting_link,
            meeting_provider,
            status,
            expires_at: now + self.settings.token_ttl,
            responded_at,
            reschedule_request: None,
            created_at: now,
        };

        let superseded = match self.repos.interviews.insert_superseding(&token).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(
                    application_id = %application.id,
                    provider = %credential.provider,
                    calendar_event_id = %event.id,
                    error = %e,
                    "Interview token not persisted; calendar hold is orphaned and needs manual cleanup"
                );
                return Err(e);
            }
        };
        if !superseded.is_empty() {
            tracing::info!(
                application_id = %application.id,
                superseded = ?superseded,
                "Cancelled earlier interview invitations"
            );
        }

        self.record_note(&application, &user, &token, &event).await;

        let notification = if request.notify_candidate {
            self.send_invitation(&application, &token).await
        } else {
            NotificationOutcome::Skipped
        };

        let application_status = self.advance_application(&application).await;

        tracing::info!(
            interview_id = %token.id,
            application_id = %application.id,
            scheduled_by = %user.id,
            status = %token.status,
            "Interview scheduled"
        );

        Ok(ScheduleResult {
            interview_id: token.id,
            status: token.status,
            scheduled_at: token.scheduled_at,
            ends_at: token.ends_at(),
            expires_at: token.expires_at,
            calendar_event: CalendarEventSummary {
                provider: credential.provider,
                event_id: event.id,
                html_link: event.html_link,
                meeting_link: token.meeting_link.clone(),
            },
            notification,
            superseded,
            application_status,
        })
    }

    /// Send the invitation again for a token the candidate can still answer.
    /// Unlike during `schedule`, a delivery failure is an error here.
    pub async fn resend_invitation(&self, interview_id: Uuid) -> Result<InterviewToken> {
        let token = self.get_interview(interview_id).await?;
        if !token.status.is_respondable() {
            return Err(Error::TokenAlreadyTerminal(token.status.to_string()));
        }
        if token.is_expired_at(self.clock.now()) {
            return Err(Error::BadRequest(
                "The invitation has expired; schedule a new interview".to_string(),
            ));
        }

        let application = self
            .repos
            .applications
            .get_application(&token.application_id)
            .await?
            .ok_or_else(|| Error::ApplicationNotFound(token.application_id.clone()))?;

        match self.send_invitation(&application, &token).await {
            NotificationOutcome::Failed { reason } => Err(Error::NotificationFailed(reason)),
            _ => {
                tracing::info!(interview_id = %token.id, "Interview invitation resent");
                Ok(token)
            }
        }
    }

    pub async fn get_interview(&self, interview_id: Uuid) -> Result<InterviewToken> {
        self.repos
            .interviews
            .get(interview_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Interview {} not found", interview_id)))
    }

    pub async fn list_for_application(&self, application_id: &str) -> Result<Vec<InterviewToken>> {
        if self
            .repos
            .applications
            .get_application(application_id)
            .await?
            .is_none()
        {
            return Err(Error::ApplicationNotFound(application_id.to_string()));
        }
        self.repos.interviews.list_for_application(application_id).await
    }

    async fn send_invitation(
        &self,
        application: &Application,
        token: &InterviewToken,
    ) -> NotificationOutcome {
        let links = ResponseLinks::for_token(&self.settings.public_base_url, token);
        let message = invitation_email(application, token, &links, &self.settings.company_name);

        let reason = match tokio::time::timeout(
            self.settings.email_timeout,
            self.notifier.send(&message),
        )
        .await
        {
            Ok(Ok(())) => return NotificationOutcome::Sent,
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "email delivery timed out after {}s",
                self.settings.email_timeout.as_secs()
            ),
        };

        tracing::warn!(
            interview_id = %token.id,
            application_id = %application.id,
            reason = %reason,
            "Interview invitation email was not sent"
        );
        NotificationOutcome::Failed { reason }
    }

    async fn record_note(
        &self,
        application: &Application,
        user: &User,
        token: &InterviewToken,
        event: &CalendarEvent,
    ) {
        let note = format!(
            "{} scheduled a {} interview ({} minutes) for {} with {}. Calendar event {}.",
            user.name,
            token.interview_type.label().to_lowercase(),
            token.duration_minutes,
            format_in_zone(token.scheduled_at, &token.timezone),
            token
                .interviewers
                .iter()
                .map(|i| i.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            event.id
        );
        if let Err(e) = self
            .repos
            .applications
            .append_application_note(&application.id, Some(&user.id), &note)
            .await
        {
            tracing::warn!(application_id = %application.id, error = %e, "Failed to record scheduling note");
        }
    }

    async fn advance_application(&self, application: &Application) -> ApplicationStatus {
        if application.status == ApplicationStatus::Interview {
            return application.status;
        }
        match self
            .repos
            .applications
            .update_application_status(&application.id, ApplicationStatus::Interview)
            .await
        {
            Ok(()) => ApplicationStatus::Interview,
            Err(e) => {
                tracing::warn!(
                    application_id = %application.id,
                    error = %e,
                    "Failed to move application to Interview"
                );
                application.status
            }
        }
    }
}

/// Creator first and flagged; later entries with the same email are dropped.
pub fn merge_interviewers(creator: &User, supplied: &[Interviewer]) -> Vec<Interviewer> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(supplied.len() + 1);

    seen.insert(creator.email.trim().to_lowercase());
    merged.push(Interviewer {
        name: creator.name.clone(),
        email: creator.email.trim().to_string(),
        is_creator: true,
    });

    for interviewer in supplied {
        if seen.insert(interviewer.email.trim().to_lowercase()) {
            merged.push(Interviewer {
                name: interviewer.name.trim().to_string(),
                email: interviewer.email.trim().to_string(),
                is_creator: false,
            });
        }
    }
    merged
}

fn build_event_spec(
    interview_id: Uuid,
    application: &Application,
    request: &ScheduleRequest,
    interviewers: &[Interviewer],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> EventSpec {
    let candidate_email = application.email.trim().to_lowercase();
    let attendees = interviewers
        .iter()
        .filter(|i| i.email.trim().to_lowercase() != candidate_email)
        .map(|i| EventAttendee {
            name: i.name.clone(),
            email: i.email.clone(),
        })
        .collect();

    let params = &request.params;
    let mut description = format!(
        "{} interview with {} for {}.\nDuration: {} minutes",
        params.format.interview_type().label(),
        application.name,
        application.job_title,
        params.duration_minutes
    );
    if let InterviewFormat::Video {
        meeting_link: Some(link),
    } = &params.format
    {
        description.push_str(&format!("\nMeeting link: {}", link));
    }
    if let Some(agenda) = &params.agenda {
        description.push_str(&format!("\n\nAgenda:\n{}", agenda));
    }
    if let Some(notes) = &params.notes {
        description.push_str(&format!("\n\nNotes:\n{}", notes));
    }

    EventSpec {
        title: format!("Interview: {} for {}", application.name, application.job_title),
        description,
        start,
        end,
        timezone: request.time_slot.timezone.name().to_string(),
        location: match &params.format {
            InterviewFormat::InPerson { location } => Some(location.trim().to_string()),
            _ => None,
        },
        attendees,
        private: true,
        request_meeting_link: matches!(params.format, InterviewFormat::Video { meeting_link: None }),
        request_id: interview_id.to_string(),
    }
}
