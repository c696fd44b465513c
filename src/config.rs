use std::env;

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::warn;

/// Process configuration, read once at startup and passed to component
/// constructors. The core never reads the environment directly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub cors_origin: String,
    pub session: SessionConfig,
    pub email: EmailConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    pub ttl: Duration,
    /// Absent secret degrades session issuance to a no-op; it never crashes
    /// the process.
    pub secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub base_url: String,
    pub project_id: String,
    pub api_key: String,
}

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .context("invalid PORT")?;

        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let cors_origin =
            env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        let session = SessionConfig::from_env()?;
        let email = EmailConfig::from_env();
        let oracle = OracleConfig::from_env()?;

        Ok(AppConfig {
            host,
            port,
            database_url,
            cors_origin,
            session,
            email,
            oracle,
        })
    }
}

impl SessionConfig {
    fn from_env() -> Result<Self> {
        let cookie_name =
            env::var("SESSION_COOKIE_NAME").unwrap_or_else(|_| "session".to_string());

        let ttl_seconds = env::var("SESSION_TTL_SECONDS")
            .ok()
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("invalid SESSION_TTL_SECONDS")?
            .unwrap_or(DEFAULT_SESSION_TTL_SECONDS);

        let secret = env::var("SESSION_SECRET").ok().filter(|s| !s.is_empty());
        if secret.is_none() {
            warn!("SESSION_SECRET not set; session issuance is disabled");
        }

        Ok(SessionConfig {
            cookie_name,
            ttl: Duration::seconds(ttl_seconds),
            secret,
        })
    }
}

impl EmailConfig {
    fn from_env() -> Self {
        EmailConfig {
            smtp_host: env::var("SMTP_HOST").ok().filter(|s| !s.is_empty()),
            smtp_port: env::var("SMTP_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(587),
            smtp_username: env::var("SMTP_USERNAME").unwrap_or_default(),
            smtp_password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_email: env::var("SMTP_FROM_EMAIL").unwrap_or_default(),
            from_name: env::var("SMTP_FROM_NAME").unwrap_or_else(|_| "Authgate".to_string()),
        }
    }
}

impl OracleConfig {
    fn from_env() -> Result<Self> {
        Ok(OracleConfig {
            base_url: env::var("ORACLE_BASE_URL").context("ORACLE_BASE_URL must be set")?,
            project_id: env::var("ORACLE_PROJECT_ID")
                .context("ORACLE_PROJECT_ID must be set")?,
            api_key: env::var("ORACLE_API_KEY").context("ORACLE_API_KEY must be set")?,
        })
    }
}
