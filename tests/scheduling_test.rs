mod common;

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::America::New_York;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use common::{Harness, CANDIDATE_EMAIL, USER_ID};
use interview_scheduler::database::CredentialStore;
use interview_scheduler::error::Error;
use interview_scheduler::models::application::ApplicationStatus;
use interview_scheduler::models::interview_token::{InterviewStatus, Interviewer, MeetingProvider};
use interview_scheduler::services::calendar::CalendarError;
use interview_scheduler::services::scheduler_service::{
    InterviewFormat, InterviewParams, NotificationOutcome, ScheduleRequest,
};
use interview_scheduler::services::token_service::{looks_like_token, EntropySource, TokenIssuer};
use interview_scheduler::utils::time::TimeSlot;

fn interviewer(name: &str, email: &str) -> Interviewer {
    Interviewer {
        name: name.into(),
        email: email.into(),
        is_creator: false,
    }
}

/// 2025-03-01 10:00 New York, video, 45 minutes, Bob.
fn request(notify: bool) -> ScheduleRequest {
    ScheduleRequest {
        application_id: "A1".into(),
        time_slot: TimeSlot::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            New_York,
        ),
        params: InterviewParams {
            format: InterviewFormat::Video { meeting_link: None },
            duration_minutes: 45,
            interviewers: vec![interviewer("Bob", "bob@co.com")],
            agenda: Some("Intro and system design".into()),
            notes: None,
        },
        notify_candidate: notify,
    }
}

#[tokio::test]
async fn end_to_end_schedule_creates_pending_interview() {
    let h = Harness::new();
    let result = h.scheduler().schedule(USER_ID, request(true)).await.unwrap();

    let events = h.calendar.events();
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.start, Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap());
    assert_eq!(
        event.end.with_timezone(&New_York).format("%H:%M %Z").to_string(),
        "10:45 EST"
    );
    assert!(event.private);

    let tokens = h.store.tokens();
    assert_eq!(tokens.len(), 1);
    let token = &tokens[0];
    assert_eq!(token.status, InterviewStatus::Pending);
    assert_eq!(token.expires_at, common::start_of_test() + Duration::days(7));
    assert_eq!(token.responded_at, None);
    assert_eq!(token.calendar_event_id, "evt-1");
    assert_eq!(token.meeting_provider, MeetingProvider::Google);
    assert!(looks_like_token(&token.acceptance_token));
    assert!(looks_like_token(&token.reschedule_token));
    assert_ne!(token.acceptance_token, token.reschedule_token);

    assert_eq!(result.interview_id, token.id);
    assert_eq!(result.status, InterviewStatus::Pending);
    assert_eq!(result.notification, NotificationOutcome::Sent);
    assert_eq!(result.application_status, ApplicationStatus::Interview);
    assert_eq!(
        h.store.application("A1").unwrap().status,
        ApplicationStatus::Interview
    );

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, CANDIDATE_EMAIL);
    assert!(sent[0]
        .text_body
        .contains(&format!("https://jobs.example.com/interview/accept/{}", token.acceptance_token)));
    assert!(sent[0].text_body.contains(&format!(
        "https://jobs.example.com/interview/reschedule/{}",
        token.reschedule_token
    )));

    let notes = h.store.notes("A1");
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].author_id.as_deref(), Some(USER_ID));
}

#[tokio::test]
async fn failed_calendar_write_leaves_no_token() {
    let h = Harness::new();
    h.calendar
        .fail_with(CalendarError::WriteFailed("Google API error (500)".into()));

    let err = h.scheduler().schedule(USER_ID, request(true)).await.unwrap_err();

    assert!(matches!(err, Error::CalendarWriteFailed(_)));
    assert!(h.store.tokens().is_empty());
    assert!(h.mailer.sent().is_empty());
    assert!(h.store.notes("A1").is_empty());
    assert_eq!(
        h.store.application("A1").unwrap().status,
        ApplicationStatus::Reviewing
    );
}

#[tokio::test]
async fn candidate_is_never_a_calendar_attendee() {
    let h = Harness::new();
    let mut req = request(true);
    req.params
        .interviewers
        .push(interviewer("Ann (candidate)", "Ann@Example.com"));

    h.scheduler().schedule(USER_ID, req).await.unwrap();

    let event = &h.calendar.events()[0];
    assert!(event
        .attendees
        .iter()
        .all(|a| !a.email.eq_ignore_ascii_case(CANDIDATE_EMAIL)));
    let emails: Vec<&str> = event.attendees.iter().map(|a| a.email.as_str()).collect();
    assert_eq!(emails, vec!["carol@co.com", "bob@co.com"]);
}

#[tokio::test]
async fn without_notification_interview_is_confirmed_immediately() {
    let h = Harness::new();
    let result = h.scheduler().schedule(USER_ID, request(false)).await.unwrap();

    let token = &h.store.tokens()[0];
    assert_eq!(token.status, InterviewStatus::Accepted);
    assert_eq!(token.responded_at, Some(common::start_of_test()));
    assert_eq!(result.notification, NotificationOutcome::Skipped);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn creator_is_listed_once_and_first() {
    let h = Harness::new();
    let mut req = request(true);
    req.params.interviewers = vec![
        interviewer("Bob", "bob@co.com"),
        interviewer("Someone Else", "CAROL@co.com"),
    ];

    h.scheduler().schedule(USER_ID, req).await.unwrap();

    let token = &h.store.tokens()[0];
    assert_eq!(token.interviewers.len(), 2);
    assert_eq!(token.interviewers[0].name, "Carol");
    assert!(token.interviewers[0].is_creator);
    assert_eq!(token.interviewers.iter().filter(|i| i.is_creator).count(), 1);
}

#[tokio::test]
async fn rescheduling_supersedes_the_previous_invitation() {
    let h = Harness::new();
    let scheduler = h.scheduler();
    let first = scheduler.schedule(USER_ID, request(true)).await.unwrap();

    let mut second_req = request(true);
    second_req.time_slot.date = NaiveDate::from_ymd_opt(2025, 3, 3).unwrap();
    let second = scheduler.schedule(USER_ID, second_req).await.unwrap();

    assert_eq!(second.superseded, vec![first.interview_id]);
    let tokens = h.store.tokens();
    let old = tokens.iter().find(|t| t.id == first.interview_id).unwrap();
    let new = tokens.iter().find(|t| t.id == second.interview_id).unwrap();
    assert_eq!(old.status, InterviewStatus::Cancelled);
    assert_eq!(new.status, InterviewStatus::Pending);
}

#[tokio::test]
async fn email_failure_is_reported_but_not_fatal() {
    let h = Harness::new();
    h.mailer.set_failing(true);

    let result = h.scheduler().schedule(USER_ID, request(true)).await.unwrap();

    assert!(matches!(result.notification, NotificationOutcome::Failed { .. }));
    assert_eq!(h.store.tokens().len(), 1);
    assert_eq!(h.calendar.events().len(), 1);
    assert_eq!(
        h.store.application("A1").unwrap().status,
        ApplicationStatus::Interview
    );
}

#[tokio::test]
async fn resend_recovers_from_failed_email() {
    let h = Harness::new();
    h.mailer.set_failing(true);
    let scheduler = h.scheduler();
    let result = scheduler.schedule(USER_ID, request(true)).await.unwrap();

    let err = scheduler.resend_invitation(result.interview_id).await.unwrap_err();
    assert!(matches!(err, Error::NotificationFailed(_)));

    h.mailer.set_failing(false);
    scheduler.resend_invitation(result.interview_id).await.unwrap();
    assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test]
async fn resend_refuses_answered_interview() {
    let h = Harness::new();
    let scheduler = h.scheduler();
    let result = scheduler.schedule(USER_ID, request(false)).await.unwrap();

    let err = scheduler.resend_invitation(result.interview_id).await.unwrap_err();
    assert!(matches!(err, Error::TokenAlreadyTerminal(_)));
}

#[tokio::test]
async fn missing_or_disabled_credential_is_reported() {
    let h = Harness::new();
    let mut credential = h.store.credential(USER_ID).unwrap();
    credential.enabled = false;
    h.store.save_calendar_credential(&credential).await.unwrap();

    let err = h.scheduler().schedule(USER_ID, request(true)).await.unwrap_err();
    assert!(matches!(err, Error::CredentialMissing));
    assert!(h.calendar.events().is_empty());
}

#[tokio::test]
async fn expired_authorization_is_distinct_from_write_failure() {
    let h = Harness::new();
    h.calendar
        .fail_with(CalendarError::AuthenticationExpired("Google rejected credentials (401)".into()));

    let err = h.scheduler().schedule(USER_ID, request(true)).await.unwrap_err();
    assert!(err.requires_reauth());
    assert!(h.store.tokens().is_empty());
}

#[tokio::test]
async fn unknown_application_is_not_found() {
    let h = Harness::new();
    let mut req = request(true);
    req.application_id = "missing".into();

    let err = h.scheduler().schedule(USER_ID, req).await.unwrap_err();
    assert!(matches!(err, Error::ApplicationNotFound(id) if id == "missing"));
    assert!(h.calendar.events().is_empty());
}

#[tokio::test]
async fn slot_in_the_past_is_rejected() {
    let h = Harness::new();
    h.clock.advance(Duration::days(30));

    let err = h.scheduler().schedule(USER_ID, request(true)).await.unwrap_err();
    assert!(matches!(err, Error::BadRequest(_)));
    assert!(h.calendar.events().is_empty());
}

#[tokio::test]
async fn persistence_failure_after_calendar_write_is_surfaced() {
    let h = Harness::new();
    h.store.fail_token_writes(true);

    let err = h.scheduler().schedule(USER_ID, request(true)).await.unwrap_err();

    assert!(matches!(err, Error::Database(_)));
    assert_eq!(h.calendar.events().len(), 1);
    assert!(h.store.tokens().is_empty());
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn near_expiry_credential_is_refreshed_before_writing() {
    let h = Harness::new();
    let mut credential = h.store.credential(USER_ID).unwrap();
    credential.expires_at = common::start_of_test() + Duration::minutes(2);
    h.store.insert_credential(credential);

    h.scheduler().schedule(USER_ID, request(true)).await.unwrap();

    let stored = h.store.credential(USER_ID).unwrap();
    assert_eq!(stored.access_token, "refreshed-access");
    assert_eq!(stored.expires_at, common::start_of_test() + Duration::hours(1));
}

#[tokio::test]
async fn listing_never_exposes_other_applications() {
    let h = Harness::new();
    let scheduler = h.scheduler();
    scheduler.schedule(USER_ID, request(true)).await.unwrap();

    let listed = scheduler.list_for_application("A1").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(matches!(
        scheduler.list_for_application("nope").await.unwrap_err(),
        Error::ApplicationNotFound(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn stalled_calendar_write_fails_without_a_token() {
    let h = Harness::new();
    h.calendar.stall_writes(StdDuration::from_secs(60));

    let err = h.scheduler().schedule(USER_ID, request(true)).await.unwrap_err();

    assert!(matches!(err, Error::CalendarWriteFailed(msg) if msg.contains("timed out")));
    assert!(h.store.tokens().is_empty());
    assert!(h.mailer.sent().is_empty());
    assert_eq!(
        h.store.application("A1").unwrap().status,
        ApplicationStatus::Reviewing
    );
}

#[tokio::test(start_paused = true)]
async fn stalled_token_refresh_needs_reconnect() {
    let h = Harness::new();
    let mut credential = h.store.credential(USER_ID).unwrap();
    credential.expires_at = common::start_of_test() + Duration::minutes(2);
    h.store.insert_credential(credential);
    h.calendar.stall_refreshes(StdDuration::from_secs(60));

    let err = h.scheduler().schedule(USER_ID, request(true)).await.unwrap_err();

    assert!(matches!(err, Error::CredentialRefreshFailed(_)));
    assert!(err.requires_reauth());
    assert_eq!(h.calendar.refresh_count(), 1);
    assert!(h.calendar.events().is_empty());
    assert!(h.store.tokens().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stalled_email_is_a_soft_failure() {
    let h = Harness::new();
    h.mailer.stall_sends(StdDuration::from_secs(60));

    let result = h.scheduler().schedule(USER_ID, request(true)).await.unwrap();

    match result.notification {
        NotificationOutcome::Failed { reason } => assert!(reason.contains("timed out")),
        other => panic!("expected a failed notification, got {:?}", other),
    }
    assert_eq!(h.store.tokens().len(), 1);
    assert_eq!(h.store.tokens()[0].status, InterviewStatus::Pending);
    assert_eq!(result.application_status, ApplicationStatus::Interview);
}

struct BrokenEntropy;

impl EntropySource for BrokenEntropy {
    fn fill(&self, _dest: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            "getrandom unavailable",
        )))
    }
}

#[tokio::test]
async fn entropy_failure_stops_before_the_calendar_write() {
    let h = Harness::new();
    let scheduler = h
        .scheduler()
        .with_token_issuer(TokenIssuer::new(Arc::new(BrokenEntropy)));

    let err = scheduler.schedule(USER_ID, request(true)).await.unwrap_err();

    assert!(matches!(err, Error::EntropySourceUnavailable(_)));
    assert!(h.calendar.events().is_empty());
    assert!(h.store.tokens().is_empty());
    assert!(h.mailer.sent().is_empty());
}
