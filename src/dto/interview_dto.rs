use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result};
use crate::models::interview_token::{
    InterviewStatus, InterviewToken, InterviewType, Interviewer, MeetingProvider, RescheduleRequest,
};
use crate::services::response_service::{ResponseOutcome, ResponseResult};
use crate::services::scheduler_service::{
    InterviewFormat, InterviewParams, ScheduleRequest,
};
use crate::utils::time::{format_in_zone, parse_timezone, TimeSlot};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TimeSlotPayload {
    pub date: NaiveDate,
    /// `HH:MM` or `HH:MM:SS`, local to `timezone`.
    #[validate(length(min = 4, max = 8))]
    pub time: String,
    #[validate(length(min = 1))]
    pub timezone: String,
}

impl TimeSlotPayload {
    fn to_slot(&self) -> Result<TimeSlot> {
        let time = NaiveTime::parse_from_str(self.time.trim(), "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(self.time.trim(), "%H:%M:%S"))
            .map_err(|_| Error::BadRequest(format!("Invalid time '{}'", self.time)))?;
        Ok(TimeSlot::new(self.date, time, parse_timezone(&self.timezone)?))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InterviewerPayload {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InterviewDataPayload {
    #[serde(rename = "type")]
    pub interview_type: InterviewType,
    #[serde(alias = "duration_minutes")]
    #[validate(range(min = 1, max = 480, message = "Duration must be between 1 and 480 minutes"))]
    pub duration: i32,
    #[validate(length(min = 1, message = "At least one interviewer is required"), nested)]
    pub interviewers: Vec<InterviewerPayload>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(min = 1, max = 500))]
    pub location: Option<String>,
    #[serde(default, alias = "meetingLink", deserialize_with = "blank_as_none")]
    #[validate(url)]
    pub meeting_link: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 5000))]
    pub agenda: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

impl InterviewDataPayload {
    /// Location is required for in-person interviews and refused otherwise;
    /// a meeting link only makes sense for video.
    fn to_params(&self) -> Result<InterviewParams> {
        let location = self
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());
        let meeting_link = self
            .meeting_link
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let format = match (self.interview_type, location, meeting_link) {
            (InterviewType::Video, None, link) => InterviewFormat::Video {
                meeting_link: link.map(str::to_string),
            },
            (InterviewType::Phone, None, None) => InterviewFormat::Phone,
            (InterviewType::InPerson, Some(location), None) => InterviewFormat::InPerson {
                location: location.to_string(),
            },
            (InterviewType::InPerson, None, _) => {
                return Err(Error::BadRequest(
                    "In-person interviews require a location".to_string(),
                ))
            }
            (_, Some(_), _) => {
                return Err(Error::BadRequest(
                    "Location is only allowed for in-person interviews".to_string(),
                ))
            }
            (_, None, Some(_)) => {
                return Err(Error::BadRequest(
                    "Meeting link is only allowed for video interviews".to_string(),
                ))
            }
        };

        Ok(InterviewParams {
            format,
            duration_minutes: self.duration,
            interviewers: self
                .interviewers
                .iter()
                .map(|i| Interviewer {
                    name: i.name.clone(),
                    email: i.email.clone(),
                    is_creator: false,
                })
                .collect(),
            agenda: non_blank(&self.agenda),
            notes: non_blank(&self.notes),
        })
    }
}

/// Form clients send `""` for fields that do not apply; treat those as absent.
fn blank_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty()))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleInterviewPayload {
    #[serde(alias = "applicationId")]
    #[validate(length(min = 1))]
    pub application_id: String,
    #[serde(alias = "selectedTimeSlot")]
    #[validate(nested)]
    pub selected_time_slot: TimeSlotPayload,
    #[serde(alias = "interviewData")]
    #[validate(nested)]
    pub interview_data: InterviewDataPayload,
    #[serde(alias = "sendEmailNotification", default = "default_true")]
    pub send_email_notification: bool,
}

fn default_true() -> bool {
    true
}

impl ScheduleInterviewPayload {
    pub fn into_request(self) -> Result<ScheduleRequest> {
        self.validate()?;
        Ok(ScheduleRequest {
            time_slot: self.selected_time_slot.to_slot()?,
            params: self.interview_data.to_params()?,
            application_id: self.application_id.trim().to_string(),
            notify_candidate: self.send_email_notification,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ReschedulePayload {
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(length(max = 2000))]
    pub reason: Option<String>,
    #[serde(default, alias = "preferredTimes")]
    #[validate(length(max = 10))]
    pub preferred_times: Vec<String>,
}

impl ReschedulePayload {
    pub fn into_request(self) -> Result<RescheduleRequest> {
        self.validate()?;
        if self.preferred_times.iter().any(|t| t.len() > 200) {
            return Err(Error::BadRequest("Preferred time entries are too long".to_string()));
        }
        Ok(RescheduleRequest {
            reason: non_blank(&self.reason),
            preferred_times: self
                .preferred_times
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        })
    }
}

/// Interview record as shown to staff. Token values are never included.
#[derive(Debug, Clone, Serialize)]
pub struct InterviewView {
    pub id: Uuid,
    pub application_id: String,
    pub created_by: String,
    pub scheduled_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
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

impl From<&InterviewToken> for InterviewView {
    fn from(token: &InterviewToken) -> Self {
        Self {
            id: token.id,
            application_id: token.application_id.clone(),
            created_by: token.created_by.clone(),
            scheduled_at: token.scheduled_at,
            ends_at: token.ends_at(),
            timezone: token.timezone.clone(),
            duration_minutes: token.duration_minutes,
            interview_type: token.interview_type,
            interviewers: token.interviewers.clone(),
            location: token.location.clone(),
            agenda: token.agenda.clone(),
            notes: token.notes.clone(),
            calendar_event_id: token.calendar_event_id.clone(),
            meeting_link: token.meeting_link.clone(),
            meeting_provider: token.meeting_provider,
            status: token.status,
            expires_at: token.expires_at,
            responded_at: token.responded_at,
            reschedule_request: token.reschedule_request.clone(),
            created_at: token.created_at,
        }
    }
}

/// What the candidate sees after following a link. Internal notes, the
/// calendar event id and interviewer emails stay private.
#[derive(Debug, Clone, Serialize)]
pub struct PublicResponseView {
    pub outcome: ResponseOutcome,
    pub status: InterviewStatus,
    pub message: String,
    pub scheduled_at: DateTime<Utc>,
    pub when: String,
    pub duration_minutes: i32,
    pub interview_type: InterviewType,
    pub location: Option<String>,
    pub meeting_link: Option<String>,
}

impl From<&ResponseResult> for PublicResponseView {
    fn from(result: &ResponseResult) -> Self {
        let token = &result.interview;
        let message = match result.outcome {
            ResponseOutcome::Accepted => "Thank you, your interview is confirmed.",
            ResponseOutcome::AlreadyAccepted => "Your interview was already confirmed.",
            ResponseOutcome::RescheduleRequested => {
                "Thank you, we will get in touch to find a new time."
            }
            ResponseOutcome::RescheduleAlreadyRequested => {
                "We already received your request and will get in touch to find a new time."
            }
        };
        Self {
            outcome: result.outcome,
            status: token.status,
            message: message.to_string(),
            scheduled_at: token.scheduled_at,
            when: format_in_zone(token.scheduled_at, &token.timezone),
            duration_minutes: token.duration_minutes,
            interview_type: token.interview_type,
            location: token.location.clone(),
            meeting_link: token.meeting_link.clone(),
        }
    }
}
