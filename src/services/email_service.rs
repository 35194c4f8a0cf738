//! Candidate and interviewer emails.
//!
//! [`NotificationSender`] is the delivery seam; the scheduler and the
//! response handler only build an [`EmailMessage`] and hand it over. SMTP
//! delivery uses `lettre`; without `SMTP_HOST` the [`DisabledNotificationSender`]
//! is installed and every send reports [`NotificationError::Disabled`].

use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use url::Url;

use crate::models::application::Application;
use crate::models::interview_token::{InterviewStatus, InterviewToken, Interviewer};
use crate::utils::html::escape;
use crate::utils::time::format_in_zone;

const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_FROM_ADDRESS: &str = "noreply@localhost";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("email delivery is not configured")]
    Disabled,

    #[error("invalid email address: {0}")]
    Address(String),

    #[error("could not build email: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
}

impl EmailConfig {
    /// `None` when `SMTP_HOST` is unset; email is then disabled.
    pub fn from_env() -> Option<Self> {
        let smtp_host = std::env::var("SMTP_HOST")
            .ok()
            .filter(|h| !h.trim().is_empty())?;
        Some(Self {
            smtp_host,
            smtp_port: std::env::var("SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_SMTP_PORT),
            from_address: std::env::var("SMTP_FROM")
                .unwrap_or_else(|_| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: std::env::var("SMTP_USER").ok(),
            smtp_password: std::env::var("SMTP_PASSWORD").ok(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError>;
}

pub struct SmtpNotificationSender {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpNotificationSender {
    pub fn new(config: &EmailConfig) -> Result<Self, NotificationError> {
        let from: Mailbox = config
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| NotificationError::Address(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| NotificationError::Transport(e.to_string()))?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }

    fn build(&self, message: &EmailMessage) -> Result<Message, NotificationError> {
        let address: Address = message
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| NotificationError::Address(e.to_string()))?;
        let to = Mailbox::new(message.to_name.clone(), address);

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(message.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(message.html_body.clone()),
                    ),
            )
            .map_err(|e| NotificationError::Build(e.to_string()))
    }
}

#[async_trait]
impl NotificationSender for SmtpNotificationSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| NotificationError::Transport(e.to_string()))?;
        tracing::info!(to = %message.to, subject = %message.subject, "Email sent");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotificationSender;

#[async_trait]
impl NotificationSender for DisabledNotificationSender {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotificationError> {
        tracing::debug!(to = %message.to, "Email delivery disabled; message dropped");
        Err(NotificationError::Disabled)
    }
}

/// Public URLs a candidate uses to answer an invitation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLinks {
    pub accept_url: String,
    pub reschedule_url: String,
}

impl ResponseLinks {
    pub fn for_token(base: &Url, token: &InterviewToken) -> Self {
        let base = base.as_str().trim_end_matches('/');
        Self {
            accept_url: format!("{}/interview/accept/{}", base, token.acceptance_token),
            reschedule_url: format!("{}/interview/reschedule/{}", base, token.reschedule_token),
        }
    }
}

fn interviewer_names(interviewers: &[Interviewer]) -> String {
    interviewers
        .iter()
        .map(|i| i.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Detail rows shared by the text and HTML bodies, unescaped.
fn detail_rows(token: &InterviewToken) -> Vec<(&'static str, String)> {
    let mut rows = vec![
        ("When", format_in_zone(token.scheduled_at, &token.timezone)),
        ("Duration", format!("{} minutes", token.duration_minutes)),
        ("Format", token.interview_type.label().to_string()),
        ("Interviewers", interviewer_names(&token.interviewers)),
    ];
    if let Some(location) = &token.location {
        rows.push(("Location", location.clone()));
    }
    if let Some(link) = &token.meeting_link {
        rows.push(("Meeting link", link.clone()));
    }
    if let Some(agenda) = &token.agenda {
        rows.push(("Agenda", agenda.clone()));
    }
    rows
}

pub fn invitation_email(
    application: &Application,
    token: &InterviewToken,
    links: &ResponseLinks,
    company_name: &str,
) -> EmailMessage {
    let rows = detail_rows(token);
    let expires = format_in_zone(token.expires_at, &token.timezone);

    let mut text = format!(
        "Hi {},\n\nYou are invited to interview for the {} position at {}.\n\n",
        application.name, application.job_title, company_name
    );
    for (label, value) in &rows {
        text.push_str(&format!("{}: {}\n", label, value));
    }
    text.push_str(&format!(
        "\nConfirm your attendance: {}\nRequest a different time: {}\n\nThese links expire on {}.\n\n{}\n",
        links.accept_url, links.reschedule_url, expires, company_name
    ));

    let mut html = format!(
        "<p>Hi {},</p><p>You are invited to interview for the <strong>{}</strong> position at {}.</p><table>",
        escape(&application.name),
        escape(&application.job_title),
        escape(company_name)
    );
    for (label, value) in &rows {
        html.push_str(&format!(
            "<tr><td><strong>{}</strong></td><td>{}</td></tr>",
            label,
            escape(value)
        ));
    }
    html.push_str(&format!(
        "</table><p><a href=\"{}\">Accept interview</a> &nbsp; <a href=\"{}\">Request reschedule</a></p><p>These links expire on {}.</p><p>{}</p>",
        escape(&links.accept_url),
        escape(&links.reschedule_url),
        escape(&expires),
        escape(company_name)
    ));

    EmailMessage {
        to: application.email.clone(),
        to_name: Some(application.name.clone()),
        subject: format!("Interview invitation: {} at {}", application.job_title, company_name),
        html_body: html,
        text_body: text,
    }
}

/// Tells the scheduling interviewer how the candidate answered.
pub fn response_email(
    application: &Application,
    token: &InterviewToken,
    recipient: &Interviewer,
) -> EmailMessage {
    let when = format_in_zone(token.scheduled_at, &token.timezone);
    let (subject, headline) = match token.status {
        InterviewStatus::Accepted => (
            format!("{} accepted the interview", application.name),
            format!("{} accepted the interview on {}.", application.name, when),
        ),
        _ => (
            format!("{} asked to reschedule the interview", application.name),
            format!(
                "{} asked to reschedule the interview planned for {}.",
                application.name, when
            ),
        ),
    };

    let mut text = format!("Hi {},\n\n{}\n", recipient.name, headline);
    let mut html = format!(
        "<p>Hi {},</p><p>{}</p>",
        escape(&recipient.name),
        escape(&headline)
    );

    if let Some(request) = token.reschedule_request.as_ref().filter(|r| !r.is_empty()) {
        if let Some(reason) = request.reason.as_deref().filter(|r| !r.trim().is_empty()) {
            text.push_str(&format!("\nReason: {}\n", reason));
            html.push_str(&format!("<p><strong>Reason:</strong> {}</p>", escape(reason)));
        }
        let preferred: Vec<&str> = request
            .preferred_times
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .collect();
        if !preferred.is_empty() {
            text.push_str("\nPreferred times:\n");
            html.push_str("<p><strong>Preferred times:</strong></p><ul>");
            for time in preferred {
                text.push_str(&format!("- {}\n", time));
                html.push_str(&format!("<li>{}</li>", escape(time)));
            }
            html.push_str("</ul>");
        }
    }

    text.push_str(&format!(
        "\nApplication: {} ({})\n",
        application.job_title, application.id
    ));
    html.push_str(&format!(
        "<p>Application: {} ({})</p>",
        escape(&application.job_title),
        escape(&application.id)
    ));

    EmailMessage {
        to: recipient.email.clone(),
        to_name: Some(recipient.name.clone()),
        subject,
        html_body: html,
        text_body: text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::application::ApplicationStatus;
    use crate::models::interview_token::{InterviewType, MeetingProvider, RescheduleRequest};
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn application() -> Application {
        Application {
            id: "A1".into(),
            name: "Ann <Lee>".into(),
            email: "ann@example.com".into(),
            job_title: "Engineer".into(),
            status: ApplicationStatus::Reviewing,
        }
    }

    fn token() -> InterviewToken {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap();
        InterviewToken {
            id: Uuid::new_v4(),
            application_id: "A1".into(),
            created_by: "u1".into(),
            acceptance_token: "a".repeat(64),
            reschedule_token: "b".repeat(64),
            scheduled_at: start,
            timezone: "America/New_York".into(),
            duration_minutes: 45,
            interview_type: InterviewType::Video,
            interviewers: vec![Interviewer {
                name: "Bob".into(),
                email: "bob@co.com".into(),
                is_creator: true,
            }],
            location: None,
            agenda: Some("System design & coding".into()),
            notes: Some("internal only".into()),
            calendar_event_id: "evt-1".into(),
            meeting_link: Some("https://meet.google.com/abc".into()),
            meeting_provider: MeetingProvider::Google,
            status: InterviewStatus::Pending,
            expires_at: start + Duration::days(7),
            responded_at: None,
            reschedule_request: None,
            created_at: start - Duration::days(1),
        }
    }

    #[test]
    fn links_are_distinct_and_rooted_at_base() {
        let base = Url::parse("https://jobs.example.com/").unwrap();
        let links = ResponseLinks::for_token(&base, &token());
        assert_eq!(
            links.accept_url,
            format!("https://jobs.example.com/interview/accept/{}", "a".repeat(64))
        );
        assert_eq!(
            links.reschedule_url,
            format!("https://jobs.example.com/interview/reschedule/{}", "b".repeat(64))
        );
    }

    #[test]
    fn invitation_contains_links_and_escaped_details() {
        let token = token();
        let links = ResponseLinks::for_token(&Url::parse("https://jobs.example.com").unwrap(), &token);
        let email = invitation_email(&application(), &token, &links, "Acme");

        assert_eq!(email.to, "ann@example.com");
        assert!(email.html_body.contains(&links.accept_url));
        assert!(email.html_body.contains(&links.reschedule_url));
        assert!(email.html_body.contains("Ann &lt;Lee&gt;"));
        assert!(email.html_body.contains("System design &amp; coding"));
        assert!(email.text_body.contains("Saturday, March 1, 2025 at 10:00 AM EST"));
        assert!(email.text_body.contains("45 minutes"));
        assert!(!email.text_body.contains("internal only"));
    }

    #[test]
    fn reschedule_notice_lists_reason_and_times() {
        let mut token = token();
        token.status = InterviewStatus::RescheduleRequested;
        token.reschedule_request = Some(RescheduleRequest {
            reason: Some("Travelling".into()),
            preferred_times: vec!["Mon 9am".into(), " ".into()],
        });
        let creator = token.interviewers[0].clone();
        let email = response_email(&application(), &token, &creator);

        assert_eq!(email.to, "bob@co.com");
        assert!(email.subject.contains("reschedule"));
        assert!(email.text_body.contains("Reason: Travelling"));
        assert!(email.text_body.contains("- Mon 9am"));
        assert_eq!(email.html_body.matches("<li>").count(), 1);
    }

    #[tokio::test]
    async fn disabled_sender_reports_disabled() {
        let message = invitation_email(
            &application(),
            &token(),
            &ResponseLinks::for_token(&Url::parse("https://x.test").unwrap(), &token()),
            "Acme",
        );
        assert_eq!(
            DisabledNotificationSender.send(&message).await,
            Err(NotificationError::Disabled)
        );
    }

    #[test]
    fn smtp_sender_rejects_bad_from_address() {
        let config = EmailConfig {
            smtp_host: "smtp.example.com".into(),
            smtp_port: 587,
            from_address: "not-an-address".into(),
            smtp_user: None,
            smtp_password: None,
        };
        assert!(matches!(
            SmtpNotificationSender::new(&config),
            Err(NotificationError::Address(_))
        ));
    }
}
