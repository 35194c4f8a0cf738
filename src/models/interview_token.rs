use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterviewType {
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "phone")]
    Phone,
    #[serde(rename = "in-person")]
    InPerson,
}

impl InterviewType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewType::Video => "video",
            InterviewType::Phone => "phone",
            InterviewType::InPerson => "in-person",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InterviewType::Video => "Video call",
            InterviewType::Phone => "Phone call",
            InterviewType::InPerson => "In person",
        }
    }
}

impl FromStr for InterviewType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "video" => Ok(InterviewType::Video),
            "phone" => Ok(InterviewType::Phone),
            "in-person" => Ok(InterviewType::InPerson),
            other => Err(format!("unknown interview type '{}'", other)),
        }
    }
}

/// Where the meeting link came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingProvider {
    Google,
    Microsoft,
    Manual,
}

impl MeetingProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingProvider::Google => "google",
            MeetingProvider::Microsoft => "microsoft",
            MeetingProvider::Manual => "manual",
        }
    }
}

impl From<crate::models::calendar_credential::CalendarProviderKind> for MeetingProvider {
    fn from(kind: crate::models::calendar_credential::CalendarProviderKind) -> Self {
        match kind {
            crate::models::calendar_credential::CalendarProviderKind::Google => {
                MeetingProvider::Google
            }
            crate::models::calendar_credential::CalendarProviderKind::Microsoft => {
                MeetingProvider::Microsoft
            }
        }
    }
}

impl FromStr for MeetingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(MeetingProvider::Google),
            "microsoft" => Ok(MeetingProvider::Microsoft),
            "manual" => Ok(MeetingProvider::Manual),
            other => Err(format!("unknown meeting provider '{}'", other)),
        }
    }
}

/// Lifecycle of an interview token.
///
/// `pending` moves forward to `accepted`, `reschedule_requested` or `expired`.
/// `reschedule_requested` still accepts, and still expires. Any active token
/// becomes `cancelled` when a newer interview supersedes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewStatus {
    Pending,
    Accepted,
    RescheduleRequested,
    Expired,
    Cancelled,
}

impl InterviewStatus {
    /// Statuses that still hold the application's interview slot.
    pub const ACTIVE: [InterviewStatus; 3] = [
        InterviewStatus::Pending,
        InterviewStatus::RescheduleRequested,
        InterviewStatus::Accepted,
    ];

    /// Statuses a candidate can still respond from.
    pub const RESPONDABLE: [InterviewStatus; 2] =
        [InterviewStatus::Pending, InterviewStatus::RescheduleRequested];

    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewStatus::Pending => "pending",
            InterviewStatus::Accepted => "accepted",
            InterviewStatus::RescheduleRequested => "reschedule_requested",
            InterviewStatus::Expired => "expired",
            InterviewStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            InterviewStatus::Accepted | InterviewStatus::Expired | InterviewStatus::Cancelled
        )
    }

    pub fn is_respondable(&self) -> bool {
        Self::RESPONDABLE.contains(self)
    }

    pub fn can_transition_to(&self, next: InterviewStatus) -> bool {
        use InterviewStatus::*;
        match (self, next) {
            (Pending, Accepted) | (Pending, RescheduleRequested) | (Pending, Expired) => true,
            (RescheduleRequested, Accepted) | (RescheduleRequested, Expired) => true,
            // New reschedule details replace the stored ones.
            (RescheduleRequested, RescheduleRequested) => true,
            (Pending | RescheduleRequested | Accepted, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InterviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InterviewStatus::Pending),
            "accepted" => Ok(InterviewStatus::Accepted),
            "reschedule_requested" => Ok(InterviewStatus::RescheduleRequested),
            "expired" => Ok(InterviewStatus::Expired),
            "cancelled" => Ok(InterviewStatus::Cancelled),
            other => Err(format!("unknown interview status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interviewer {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub is_creator: bool,
}

/// What a candidate sent along with a reschedule request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleRequest {
    pub reason: Option<String>,
    #[serde(default)]
    pub preferred_times: Vec<String>,
}

impl RescheduleRequest {
    pub fn is_empty(&self) -> bool {
        self.reason.as_deref().map_or(true, |r| r.trim().is_empty())
            && self.preferred_times.iter().all(|t| t.trim().is_empty())
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct InterviewToken {
    pub id: Uuid,
    pub application_id: String,
    pub created_by: String,
    pub acceptance_token: String,
    pub reschedule_token: String,
    pub scheduled_at: DateTime<Utc>,
    pub timezone: String,
    pub duration_minutes: i32,
    pub interview_type: InterviewType,
    pub interviewers: Vec<Interviewer>,
    pub location: Option<String>,
    pub agenda: Option<String>,
    pub notes: Option<String>,
    pub calendar_event_id: String,
    pub meeting_link: Option<String>,
    pub meeting_provider: MeetingProvider,
    pub status: InterviewStatus,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub reschedule_request: Option<RescheduleRequest>,
    pub created_at: DateTime<Utc>,
}

impl InterviewToken {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn creator(&self) -> Option<&Interviewer> {
        self.interviewers.iter().find(|i| i.is_creator)
    }
}

impl fmt::Debug for InterviewToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterviewToken")
            .field("id", &self.id)
            .field("application_id", &self.application_id)
            .field("scheduled_at", &self.scheduled_at)
            .field("interview_type", &self.interview_type)
            .field("calendar_event_id", &self.calendar_event_id)
            .field("status", &self.status)
            .field("expires_at", &self.expires_at)
            .field("responded_at", &self.responded_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, FromRow)]
pub(crate) struct InterviewTokenRow {
    pub id: Uuid,
    pub application_id: String,
    pub created_by: String,
    pub acceptance_token: String,
    pub reschedule_token: String,
    pub scheduled_at: DateTime<Utc>,
    pub timezone: String,
    pub duration_minutes: i32,
    pub interview_type: String,
    pub interviewers: Json<Vec<Interviewer>>,
    pub location: Option<String>,
    pub agenda: Option<String>,
    pub notes: Option<String>,
    pub calendar_event_id: String,
    pub meeting_link: Option<String>,
    pub meeting_provider: String,
    pub status: String,
    pub expires_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub reschedule_request: Option<Json<RescheduleRequest>>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<InterviewTokenRow> for InterviewToken {
    type Error = crate::error::Error;

    fn try_from(row: InterviewTokenRow) -> Result<Self, Self::Error> {
        use crate::error::Error;
        Ok(InterviewToken {
            id: row.id,
            application_id: row.application_id,
            created_by: row.created_by,
            acceptance_token: row.acceptance_token,
            reschedule_token: row.reschedule_token,
            scheduled_at: row.scheduled_at,
            timezone: row.timezone,
            duration_minutes: row.duration_minutes,
            interview_type: row.interview_type.parse().map_err(Error::Internal)?,
            interviewers: row.interviewers.0,
            location: row.location,
            agenda: row.agenda,
            notes: row.notes,
            calendar_event_id: row.calendar_event_id,
            meeting_link: row.meeting_link,
            meeting_provider: row.meeting_provider.parse().map_err(Error::Internal)?,
            status: row.status.parse().map_err(Error::Internal)?,
            expires_at: row.expires_at,
            responded_at: row.responded_at,
            reschedule_request: row.reschedule_request.map(|r| r.0),
            created_at: row.created_at,
        })
    }
}
