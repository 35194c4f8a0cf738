#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;
use url::Url;

use interview_scheduler::config::Config;
use interview_scheduler::database::{InMemoryStore, Repositories};
use interview_scheduler::models::application::{Application, ApplicationStatus};
use interview_scheduler::models::calendar_credential::{CalendarCredential, CalendarProviderKind};
use interview_scheduler::models::user::User;
use interview_scheduler::services::calendar::{
    CalendarError, CalendarEvent, CalendarProvider, CalendarProviders, EventSpec, TokenGrant,
};
use interview_scheduler::services::email_service::{
    EmailMessage, NotificationError, NotificationSender,
};
use interview_scheduler::services::response_service::ResponseHandler;
use interview_scheduler::services::scheduler_service::{InterviewScheduler, SchedulerSettings};
use interview_scheduler::utils::time::Clock;
use interview_scheduler::AppState;

pub const USER_ID: &str = "u1";
pub const CANDIDATE_EMAIL: &str = "ann@example.com";
pub const JWT_SECRET: &str = "test_secret_key";

/// 2025-02-20 12:00 UTC, a week before the interview slots used in tests.
pub fn start_of_test() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 20, 12, 0, 0).unwrap()
}

pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    pub fn new(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(now),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now = *now + by;
    }
}

impl Clock for TestClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Records every hold request; fails with `failure` when set and sleeps
/// for the configured stall before answering.
#[derive(Default)]
pub struct FakeCalendar {
    pub events: Mutex<Vec<EventSpec>>,
    pub failure: Mutex<Option<CalendarError>>,
    pub write_stall: Mutex<Option<StdDuration>>,
    pub refresh_stall: Mutex<Option<StdDuration>>,
    pub refreshes: Mutex<u32>,
}

impl FakeCalendar {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_with(&self, err: CalendarError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn events(&self) -> Vec<EventSpec> {
        self.events.lock().unwrap().clone()
    }

    pub fn stall_writes(&self, by: StdDuration) {
        *self.write_stall.lock().unwrap() = Some(by);
    }

    pub fn stall_refreshes(&self, by: StdDuration) {
        *self.refresh_stall.lock().unwrap() = Some(by);
    }

    pub fn refresh_count(&self) -> u32 {
        *self.refreshes.lock().unwrap()
    }
}

async fn stall(delay: &Mutex<Option<StdDuration>>) {
    let delay = *delay.lock().unwrap();
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

#[async_trait]
impl CalendarProvider for FakeCalendar {
    fn kind(&self) -> CalendarProviderKind {
        CalendarProviderKind::Google
    }

    async fn refresh_access_token(&self, _refresh_token: &str) -> Result<TokenGrant, CalendarError> {
        *self.refreshes.lock().unwrap() += 1;
        stall(&self.refresh_stall).await;
        Ok(TokenGrant {
            access_token: "refreshed-access".into(),
            expires_in: 3600,
            refresh_token: None,
        })
    }

    async fn create_hold_event(
        &self,
        _credential: &CalendarCredential,
        spec: &EventSpec,
    ) -> Result<CalendarEvent, CalendarError> {
        stall(&self.write_stall).await;
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let mut events = self.events.lock().unwrap();
        events.push(spec.clone());
        Ok(CalendarEvent {
            id: format!("evt-{}", events.len()),
            html_link: Some(format!("https://calendar.example.com/evt-{}", events.len())),
            meeting_link: spec
                .request_meeting_link
                .then(|| "https://meet.google.com/abc-defg-hij".to_string()),
            start: spec.start,
            end: spec.end,
        })
    }
}

#[derive(Default)]
pub struct FakeMailer {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub failing: Mutex<bool>,
    pub stall: Mutex<Option<StdDuration>>,
}

impl FakeMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn stall_sends(&self, by: StdDuration) {
        *self.stall.lock().unwrap() = Some(by);
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSender for FakeMailer {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        stall(&self.stall).await;
        if *self.failing.lock().unwrap() {
            return Err(NotificationError::Transport("connection refused".into()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn test_config() -> Config {
    Config {
        server_address: "127.0.0.1:0".into(),
        database_url: "postgres://unused".into(),
        jwt_secret: JWT_SECRET.into(),
        public_base_url: Url::parse("https://jobs.example.com").unwrap(),
        integration_rps: 1000,
        public_rps: 1000,
        google: None,
        microsoft: None,
        microsoft_tenant: "common".into(),
        calendar_timeout: StdDuration::from_secs(5),
        email_timeout: StdDuration::from_secs(5),
        token_ttl_days: 7,
        expiry_sweep_interval: StdDuration::from_secs(300),
        company_name: "Acme".into(),
        smtp: None,
    }
}

pub fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    store.insert_application(Application {
        id: "A1".into(),
        name: "Ann Lee".into(),
        email: CANDIDATE_EMAIL.into(),
        job_title: "Engineer".into(),
        status: ApplicationStatus::Reviewing,
    });
    store.insert_user(User {
        id: USER_ID.into(),
        name: "Carol".into(),
        email: "carol@co.com".into(),
    });
    store.insert_credential(CalendarCredential {
        user_id: USER_ID.into(),
        provider: CalendarProviderKind::Google,
        access_token: "access".into(),
        refresh_token: "refresh".into(),
        expires_at: start_of_test() + Duration::hours(1),
        calendar_id: "primary".into(),
        enabled: true,
    });
    store
}

pub struct Harness {
    pub store: InMemoryStore,
    pub calendar: Arc<FakeCalendar>,
    pub mailer: Arc<FakeMailer>,
    pub clock: Arc<TestClock>,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: seeded_store(),
            calendar: FakeCalendar::new(),
            mailer: FakeMailer::new(),
            clock: TestClock::new(start_of_test()),
            config: test_config(),
        }
    }

    pub fn scheduler(&self) -> InterviewScheduler {
        InterviewScheduler::new(
            Repositories::in_memory(&self.store),
            CalendarProviders::new().with(self.calendar.clone()),
            self.mailer.clone(),
            self.clock.clone(),
            SchedulerSettings::from_config(&self.config),
        )
    }

    pub fn responses(&self) -> ResponseHandler {
        ResponseHandler::new(
            Repositories::in_memory(&self.store),
            self.mailer.clone(),
            self.clock.clone(),
            self.config.email_timeout,
        )
    }

    pub fn app_state(&self) -> AppState {
        AppState::from_parts(
            Repositories::in_memory(&self.store),
            CalendarProviders::new().with(self.calendar.clone()),
            self.mailer.clone(),
            self.clock.clone(),
            &self.config,
        )
    }
}
