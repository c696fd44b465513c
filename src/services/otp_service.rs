use crate::models::OtpPurpose;
use crate::repositories::account_repository::{AccountRepository, RepositoryError};
use crate::services::email_service::Notifier;
use crate::services::identity_service::{IdentityError, IdentityOracle};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    #[error("{0}")]
    Validation(String),
    #[error("Email is already registered")]
    AlreadyRegistered,
    #[error("Account not found")]
    AccountNotFound,
    #[error("Invalid OTP")]
    InvalidOtp,
    #[error("OTP expired")]
    Expired,
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Identity oracle error: {0}")]
    Oracle(#[from] IdentityError),
}

/// Result of a successful verification: which account it was and which flow
/// the consumed code belonged to.
#[derive(Debug, Clone)]
pub struct VerifiedOtp {
    pub account_id: String,
    pub purpose: OtpPurpose,
}

const OTP_TTL_MINUTES: i64 = 10;
const OTP_LEN: usize = 6;

/// The OTP lifecycle engine: generates, persists and verifies one-time
/// codes and drives the pending → registered activation transition.
pub struct OtpService {
    repository: Arc<dyn AccountRepository>,
    notifier: Box<dyn Notifier>,
    oracle: Arc<dyn IdentityOracle>,
}

impl OtpService {
    pub fn new(
        repository: Arc<dyn AccountRepository>,
        notifier: Box<dyn Notifier>,
        oracle: Arc<dyn IdentityOracle>,
    ) -> Self {
        Self {
            repository,
            notifier,
            oracle,
        }
    }

    fn generate_code() -> String {
        let mut rng = rand::thread_rng();
        (0..OTP_LEN)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    /// Starts (or restarts) a signup flow. A fresh code is generated on
    /// every request; pending signups are simply superseded. Repeated
    /// requests are deliberately not rate limited.
    pub async fn request_signup_otp(&self, email: &str) -> Result<(), OtpError> {
        let email = Self::normalize_email(email);
        if email.is_empty() {
            return Err(OtpError::Validation("Email is required".to_string()));
        }

        let code = Self::generate_code();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(OTP_TTL_MINUTES);

        match self.repository.find_by_email(&email).await? {
            Some(account) if account.is_registered() => {
                return Err(OtpError::AlreadyRegistered);
            }
            Some(account) => {
                self.repository
                    .set_otp(&account.id, OtpPurpose::Signup, &code, expires_at, now)
                    .await?;
            }
            None => {
                self.repository
                    .create_pending(&email, &code, expires_at, now)
                    .await?;
            }
        }

        // The code is already persisted; delivery failure must not fail the
        // request or roll anything back.
        if let Err(e) = self.notifier.send_signup_code(&email, &code).await {
            tracing::error!("failed to send signup code to {}: {}", email, e);
        }

        Ok(())
    }

    /// Issues a login code for an existing account.
    pub async fn request_login_otp(&self, email: &str) -> Result<(), OtpError> {
        let email = Self::normalize_email(email);
        if email.is_empty() {
            return Err(OtpError::Validation("Email is required".to_string()));
        }

        let account = self
            .repository
            .find_by_email(&email)
            .await?
            .ok_or(OtpError::AccountNotFound)?;

        let code = Self::generate_code();
        let now = Utc::now();
        let expires_at = now + Duration::minutes(OTP_TTL_MINUTES);

        self.repository
            .set_otp(&account.id, OtpPurpose::Reset, &code, expires_at, now)
            .await?;

        if let Err(e) = self.notifier.send_login_code(&email, &code).await {
            tracing::error!("failed to send login code to {}: {}", email, e);
        }

        Ok(())
    }

    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<VerifiedOtp, OtpError> {
        self.verify_otp_at(email, code, Utc::now()).await
    }

    /// Verifies a presented code against the account's active slot.
    ///
    /// A missing account and a wrong code are indistinguishable to the
    /// caller so the endpoint cannot be used to enumerate accounts.
    pub async fn verify_otp_at(
        &self,
        email: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifiedOtp, OtpError> {
        let email = Self::normalize_email(email);
        let code = code.trim();
        if email.is_empty() || code.is_empty() {
            return Err(OtpError::Validation(
                "Email and OTP are required".to_string(),
            ));
        }
        if code.chars().count() != OTP_LEN {
            return Err(OtpError::Validation("OTP must be 6 digits".to_string()));
        }

        let account = self
            .repository
            .find_by_email(&email)
            .await?
            .ok_or(OtpError::InvalidOtp)?;

        let pending = account.active_otp().ok_or(OtpError::InvalidOtp)?;

        // Expiry is evaluated lazily at verification time. A code presented
        // at exactly its expiry instant is already dead.
        match pending.expires_at {
            Some(expires_at) if expires_at > now => {}
            _ => return Err(OtpError::Expired),
        }

        if pending.code != code {
            return Err(OtpError::InvalidOtp);
        }

        // Single conditional write: of two racing verifications exactly one
        // clears the slot, the other observes zero affected rows.
        let consumed = self
            .repository
            .consume_otp(&account.id, pending.purpose, &pending.code, now)
            .await?;
        if !consumed {
            return Err(OtpError::InvalidOtp);
        }

        if pending.purpose == OtpPurpose::Signup {
            // Activation also establishes the oracle principal so OAuth
            // flows can address the same subject later.
            self.oracle.ensure_principal(&account.id, &email).await?;
        }

        Ok(VerifiedOtp {
            account_id: account.id,
            purpose: pending.purpose,
        })
    }
}
