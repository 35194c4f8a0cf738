//! Google Calendar adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{
    classify_refresh_failure, classify_write_failure, transport_failure, CalendarError,
    CalendarEvent, CalendarProvider, EventSpec, TokenGrant,
};
use crate::config::OAuthClientConfig;
use crate::models::calendar_credential::{CalendarCredential, CalendarProviderKind};

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

const PROVIDER: &str = "Google";

#[derive(Clone)]
pub struct GoogleCalendarProvider {
    client: Client,
    oauth: OAuthClientConfig,
    api_base: String,
    token_url: String,
}

impl GoogleCalendarProvider {
    pub fn new(client: Client, oauth: OAuthClientConfig) -> Self {
        Self {
            client,
            oauth,
            api_base: GOOGLE_CALENDAR_API_BASE.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }

    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.token_url = token_url.into();
        self
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, CalendarError> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| CalendarError::WriteFailed(format!("invalid Google API base: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::WriteFailed("Google API base cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["calendars", calendar_id, "events"]);
        Ok(url)
    }
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    fn kind(&self) -> CalendarProviderKind {
        CalendarProviderKind::Google
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenGrant, CalendarError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::RefreshFailed(transport_failure(PROVIDER, &e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_refresh_failure(PROVIDER, status, &error_text));
        }

        let grant: GoogleTokenResponse = response.json().await.map_err(|e| {
            CalendarError::RefreshFailed(format!("Failed to parse Google token response: {}", e))
        })?;

        Ok(TokenGrant {
            access_token: grant.access_token,
            expires_in: grant.expires_in,
            refresh_token: grant.refresh_token,
        })
    }

    async fn create_hold_event(
        &self,
        credential: &CalendarCredential,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, CalendarError> {
        let url = self.events_url(&credential.calendar_id)?;
        let body = GoogleEventRequest::from_spec(spec);

        let mut request = self
            .client
            .post(url)
            .bearer_auth(&credential.access_token)
            .query(&[("sendUpdates", "none")])
            .json(&body);
        if spec.request_meeting_link {
            request = request.query(&[("conferenceDataVersion", "1")]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CalendarError::WriteFailed(transport_failure(PROVIDER, &e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_write_failure(PROVIDER, status, &error_text));
        }

        let created: GoogleEventResponse = response.json().await.map_err(|e| {
            CalendarError::WriteFailed(format!("Failed to parse Google event response: {}", e))
        })?;

        let meeting_link = created.hangout_link.clone().or_else(|| {
            created.conference_data.as_ref().and_then(|data| {
                data.entry_points
                    .iter()
                    .find(|p| p.entry_point_type == "video")
                    .map(|p| p.uri.clone())
            })
        });

        Ok(CalendarEvent {
            start: parse_event_time(&created.start).unwrap_or(spec.start),
            end: parse_event_time(&created.end).unwrap_or(spec.end),
            id: created.id,
            html_link: created.html_link,
            meeting_link,
        })
    }
}

fn parse_event_time(value: &Option<EventDateTime>) -> Option<DateTime<Utc>> {
    let raw = value.as_ref()?.date_time.as_deref()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventRequest {
    summary: String,
    description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    start: EventDateTime,
    end: EventDateTime,
    attendees: Vec<GoogleAttendee>,
    visibility: &'static str,
    transparency: &'static str,
    guests_can_see_other_guests: bool,
    guests_can_invite_others: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    conference_data: Option<ConferenceRequest>,
}

impl GoogleEventRequest {
    fn from_spec(spec: &EventSpec) -> Self {
        Self {
            summary: spec.title.clone(),
            description: spec.description.clone(),
            location: spec.location.clone(),
            start: EventDateTime::at(spec.start, &spec.timezone),
            end: EventDateTime::at(spec.end, &spec.timezone),
            attendees: spec
                .attendees
                .iter()
                .map(|a| GoogleAttendee {
                    email: a.email.clone(),
                    display_name: Some(a.name.clone()),
                })
                .collect(),
            visibility: if spec.private { "private" } else { "default" },
            transparency: "opaque",
            guests_can_see_other_guests: true,
            guests_can_invite_others: false,
            conference_data: spec.request_meeting_link.then(|| ConferenceRequest {
                create_request: CreateConferenceRequest {
                    request_id: spec.request_id.clone(),
                    conference_solution_key: ConferenceSolutionKey {
                        solution_type: "hangoutsMeet",
                    },
                },
            }),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_zone: Option<String>,
}

impl EventDateTime {
    fn at(instant: DateTime<Utc>, timezone: &str) -> Self {
        Self {
            date_time: Some(instant.to_rfc3339()),
            time_zone: Some(timezone.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAttendee {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceRequest {
    create_request: CreateConferenceRequest,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConferenceRequest {
    request_id: String,
    conference_solution_key: ConferenceSolutionKey,
}

#[derive(Debug, Serialize)]
struct ConferenceSolutionKey {
    #[serde(rename = "type")]
    solution_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventResponse {
    id: String,
    html_link: Option<String>,
    hangout_link: Option<String>,
    conference_data: Option<ConferenceData>,
    start: Option<EventDateTime>,
    end: Option<EventDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConferenceData {
    #[serde(default)]
    entry_points: Vec<EntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryPoint {
    entry_point_type: String,
    uri: String,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}
