pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::database::Repositories;
use crate::error::Result;
use crate::middleware::auth::AuthKeys;
use crate::services::calendar::CalendarProviders;
use crate::services::email_service::{
    DisabledNotificationSender, NotificationSender, SmtpNotificationSender,
};
use crate::services::response_service::ResponseHandler;
use crate::services::scheduler_service::{InterviewScheduler, SchedulerSettings};
use crate::utils::time::Clock;
use sqlx::PgPool;

#[derive(Debug, Clone, Copy)]
pub struct RateLimits {
    pub integration_rps: u32,
    pub public_rps: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub scheduler: InterviewScheduler,
    pub responses: ResponseHandler,
    pub auth_keys: AuthKeys,
    pub limits: RateLimits,
}

impl AppState {
    pub fn new(pool: PgPool, config: &Config) -> Result<Self> {
        let notifier: Arc<dyn NotificationSender> = match &config.smtp {
            Some(smtp) => {
                tracing::info!(host = %smtp.smtp_host, port = smtp.smtp_port, "SMTP email delivery enabled");
                Arc::new(
                    SmtpNotificationSender::new(smtp)
                        .map_err(|e| crate::error::Error::Config(format!("SMTP: {}", e)))?,
                )
            }
            None => {
                tracing::warn!("SMTP_HOST not set; interview emails will not be delivered");
                Arc::new(DisabledNotificationSender)
            }
        };

        Ok(Self::from_parts(
            Repositories::postgres(pool),
            CalendarProviders::from_config(config)?,
            notifier,
            crate::utils::time::system_clock(),
            config,
        ))
    }

    /// Wire the services over arbitrary collaborators.
    pub fn from_parts(
        repos: Repositories,
        providers: CalendarProviders,
        notifier: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let scheduler = InterviewScheduler::new(
            repos.clone(),
            providers,
            notifier.clone(),
            clock.clone(),
            SchedulerSettings::from_config(config),
        );
        let responses = ResponseHandler::new(repos, notifier, clock, config.email_timeout);

        Self {
            scheduler,
            responses,
            auth_keys: AuthKeys::from_secret(&config.jwt_secret),
            limits: RateLimits {
                integration_rps: config.integration_rps,
                public_rps: config.public_rps,
            },
        }
    }
}
