use crate::config::SessionConfig;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Invalid session")]
    Invalid,
    #[error("Failed to sign session token: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
}

/// Mints and verifies the self-issued session credential: an HS256 token
/// binding an account id to a time box. Verification is pure computation;
/// it never touches the store.
///
/// Self-issued tokens carry no server-side revocation. A compromised token
/// stays valid until its horizon elapses; only oracle-delegated sessions
/// can be revoked early.
pub struct SessionService {
    cookie_name: String,
    ttl: Duration,
    secret: Option<String>,
}

impl SessionService {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            cookie_name: config.cookie_name,
            ttl: config.ttl,
            secret: config.secret,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a signed token for the account, or `None` when no signing
    /// secret is configured. Callers treat "no cookie set" as a valid
    /// degraded state.
    pub fn issue(&self, account_id: &str) -> Result<Option<String>, SessionError> {
        self.issue_at(account_id, Utc::now())
    }

    pub fn issue_at(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, SessionError> {
        let Some(secret) = &self.secret else {
            return Ok(None);
        };

        let claims = SessionClaims {
            sub: account_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(SessionError::Signing)?;

        Ok(Some(token))
    }

    /// Returns the embedded account id for a structurally valid, correctly
    /// signed, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, SessionError> {
        let Some(secret) = &self.secret else {
            return Err(SessionError::Invalid);
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map_err(|_| SessionError::Invalid)?;

        if data.claims.sub.is_empty() {
            return Err(SessionError::Invalid);
        }

        Ok(data.claims.sub)
    }

    pub fn build_cookie(&self, value: String, secure: bool) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(secure)
            .max_age(time::Duration::seconds(self.ttl.num_seconds()))
            .build()
    }

    /// Clearing cookie: same name, empty value, negative max-age. Emitted on
    /// logout whether or not a valid session existed.
    pub fn clear_cookie(&self, secure: bool) -> Cookie<'static> {
        Cookie::build((self.cookie_name.clone(), String::new()))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(secure)
            .max_age(time::Duration::seconds(-1))
            .build()
    }
}
