use crate::error::{Error, Result};
use crate::services::email_service::EmailConfig;
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub public_base_url: Url,
    pub integration_rps: u32,
    pub public_rps: u32,
    pub google: Option<OAuthClientConfig>,
    pub microsoft: Option<OAuthClientConfig>,
    pub microsoft_tenant: String,
    pub calendar_timeout: Duration,
    pub email_timeout: Duration,
    pub token_ttl_days: i64,
    pub expiry_sweep_interval: Duration,
    pub company_name: String,
    pub smtp: Option<EmailConfig>,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let public_base_url = get_env("PUBLIC_BASE_URL")?;
        let public_base_url = Url::parse(&public_base_url)
            .map_err(|e| Error::Config(format!("Invalid value for PUBLIC_BASE_URL: {}", e)))?;

        let token_ttl_days: i64 = get_env_parse_or("INTERVIEW_TOKEN_TTL_DAYS", 7)?;
        if token_ttl_days <= 0 {
            return Err(Error::Config(
                "INTERVIEW_TOKEN_TTL_DAYS must be positive".to_string(),
            ));
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            public_base_url,
            integration_rps: get_env_parse_or("INTEGRATION_RPS", 100)?,
            public_rps: get_env_parse_or("PUBLIC_RPS", 20)?,
            google: oauth_client("GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET"),
            microsoft: oauth_client("MICROSOFT_CLIENT_ID", "MICROSOFT_CLIENT_SECRET"),
            microsoft_tenant: env::var("MICROSOFT_TENANT").unwrap_or_else(|_| "common".to_string()),
            calendar_timeout: Duration::from_secs(get_env_parse_or("CALENDAR_TIMEOUT_SECS", 10)?),
            email_timeout: Duration::from_secs(get_env_parse_or("EMAIL_TIMEOUT_SECS", 10)?),
            token_ttl_days,
            expiry_sweep_interval: Duration::from_secs(get_env_parse_or(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                300,
            )?),
            company_name: env::var("COMPANY_NAME").unwrap_or_else(|_| "Hiring Team".to_string()),
            smtp: EmailConfig::from_env(),
        })
    }
}

fn oauth_client(id_var: &str, secret_var: &str) -> Option<OAuthClientConfig> {
    let client_id = env::var(id_var).ok().filter(|v| !v.trim().is_empty())?;
    let client_secret = env::var(secret_var).ok().filter(|v| !v.trim().is_empty())?;
    Some(OAuthClientConfig {
        client_id,
        client_secret,
    })
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> Result<&'static Config> {
    CONFIG
        .get()
        .ok_or_else(|| Error::Config("Configuration has not been initialized".to_string()))
}
