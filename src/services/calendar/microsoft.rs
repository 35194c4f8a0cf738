//! Microsoft Graph calendar adapter

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{
    classify_refresh_failure, classify_write_failure, transport_failure, CalendarError,
    CalendarEvent, CalendarProvider, EventSpec, TokenGrant,
};
use crate::config::OAuthClientConfig;
use crate::models::calendar_credential::{CalendarCredential, CalendarProviderKind};

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const LOGIN_BASE: &str = "https://login.microsoftonline.com";
const GRAPH_SCOPE: &str = "offline_access https://graph.microsoft.com/Calendars.ReadWrite";
const GRAPH_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

const PROVIDER: &str = "Microsoft";

#[derive(Clone)]
pub struct MicrosoftCalendarProvider {
    client: Client,
    oauth: OAuthClientConfig,
    api_base: String,
    token_url: String,
}

impl MicrosoftCalendarProvider {
    pub fn new(client: Client, oauth: OAuthClientConfig, tenant: &str) -> Self {
        Self {
            client,
            oauth,
            api_base: GRAPH_API_BASE.to_string(),
            token_url: format!("{}/{}/oauth2/v2.0/token", LOGIN_BASE, tenant),
        }
    }

    pub fn with_endpoints(mut self, api_base: impl Into<String>, token_url: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.token_url = token_url.into();
        self
    }

    fn events_url(&self, calendar_id: &str) -> String {
        let base = self.api_base.trim_end_matches('/');
        if calendar_id.is_empty() || calendar_id == "primary" {
            format!("{}/me/events", base)
        } else {
            format!("{}/me/calendars/{}/events", base, calendar_id)
        }
    }
}

#[async_trait]
impl CalendarProvider for MicrosoftCalendarProvider {
    fn kind(&self) -> CalendarProviderKind {
        CalendarProviderKind::Microsoft
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
                ("scope", GRAPH_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| CalendarError::RefreshFailed(transport_failure(PROVIDER, &e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_refresh_failure(PROVIDER, status, &error_text));
        }

        let grant: GraphTokenResponse = response.json().await.map_err(|e| {
            CalendarError::RefreshFailed(format!("Failed to parse Microsoft token response: {}", e))
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
        let body = GraphEventRequest::from_spec(spec);

        let response = self
            .client
            .post(self.events_url(&credential.calendar_id))
            .bearer_auth(&credential.access_token)
            .header("Prefer", r#"outlook.timezone="UTC""#)
            .json(&body)
            .send()
            .await
            .map_err(|e| CalendarError::WriteFailed(transport_failure(PROVIDER, &e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_write_failure(PROVIDER, status, &error_text));
        }

        let created: GraphEventResponse = response.json().await.map_err(|e| {
            CalendarError::WriteFailed(format!("Failed to parse Microsoft event response: {}", e))
        })?;

        Ok(CalendarEvent {
            start: parse_graph_time(created.start.as_ref()).unwrap_or(spec.start),
            end: parse_graph_time(created.end.as_ref()).unwrap_or(spec.end),
            id: created.id,
            html_link: created.web_link,
            meeting_link: created.online_meeting.and_then(|m| m.join_url),
        })
    }
}

/// Graph returns zone-less timestamps in the zone named by `Prefer`.
fn parse_graph_time(value: Option<&GraphDateTime>) -> Option<DateTime<Utc>> {
    let value = value?;
    if !value.time_zone.eq_ignore_ascii_case("UTC") {
        return None;
    }
    NaiveDateTime::parse_from_str(&value.date_time, GRAPH_DATETIME_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphEventRequest {
    subject: String,
    body: GraphBody,
    start: GraphDateTime,
    end: GraphDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<GraphLocation>,
    attendees: Vec<GraphAttendee>,
    sensitivity: &'static str,
    show_as: &'static str,
    is_reminder_on: bool,
    is_online_meeting: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    online_meeting_provider: Option<&'static str>,
    transaction_id: String,
}

impl GraphEventRequest {
    fn from_spec(spec: &EventSpec) -> Self {
        Self {
            subject: spec.title.clone(),
            body: GraphBody {
                content_type: "text",
                content: spec.description.clone(),
            },
            start: GraphDateTime::utc(spec.start),
            end: GraphDateTime::utc(spec.end),
            location: spec.location.as_ref().map(|l| GraphLocation {
                display_name: l.clone(),
            }),
            attendees: spec
                .attendees
                .iter()
                .map(|a| GraphAttendee {
                    email_address: GraphEmailAddress {
                        address: a.email.clone(),
                        name: a.name.clone(),
                    },
                    attendee_type: "required",
                })
                .collect(),
            sensitivity: if spec.private { "private" } else { "normal" },
            show_as: "busy",
            is_reminder_on: true,
            is_online_meeting: spec.request_meeting_link,
            online_meeting_provider: spec.request_meeting_link.then_some("teamsForBusiness"),
            transaction_id: spec.request_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphBody {
    content_type: &'static str,
    content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphDateTime {
    date_time: String,
    time_zone: String,
}

impl GraphDateTime {
    fn utc(instant: DateTime<Utc>) -> Self {
        Self {
            date_time: instant.format("%Y-%m-%dT%H:%M:%S").to_string(),
            time_zone: "UTC".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphLocation {
    display_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttendee {
    email_address: GraphEmailAddress,
    #[serde(rename = "type")]
    attendee_type: &'static str,
}

#[derive(Debug, Serialize)]
struct GraphEmailAddress {
    address: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphEventResponse {
    id: String,
    web_link: Option<String>,
    online_meeting: Option<GraphOnlineMeeting>,
    start: Option<GraphDateTime>,
    end: Option<GraphDateTime>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphOnlineMeeting {
    join_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphTokenResponse {
    access_token: String,
    expires_in: i64,
    refresh_token: Option<String>,
}
