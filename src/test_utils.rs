pub mod test_helpers {
    use crate::config::SessionConfig;
    use crate::repositories::account_repository::SqliteAccountRepository;
    use crate::services::email_service::{Notifier, NotifyError};
    use crate::services::federation_service::FederationService;
    use crate::services::identity_service::{IdentityError, IdentityOracle, VerifiedIdentity};
    use crate::services::otp_service::OtpService;
    use crate::services::session_service::SessionService;
    use crate::AppState;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};
    use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
    use std::sync::{Arc, Mutex};

    /// Create a new in-memory SQLite database for testing
    pub async fn create_test_db() -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(pool)
    }

    /// Insert an account row with full control over the OTP slots.
    #[allow(clippy::too_many_arguments)]
    pub async fn insert_account(
        pool: &SqlitePool,
        id: &str,
        email: &str,
        role: Option<&str>,
        signup_otp: Option<(&str, DateTime<Utc>)>,
        reset_token: Option<(&str, DateTime<Utc>)>,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO accounts
                (id, email, role, status, provider,
                 signup_otp, signup_otp_expires_at, reset_token, reset_token_expires_at,
                 created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(role)
        .bind(role.map(|_| "reguler"))
        .bind(role.map(|_| "email"))
        .bind(signup_otp.map(|(code, _)| code.to_string()))
        .bind(signup_otp.map(|(_, expires)| expires))
        .bind(reset_token.map(|(code, _)| code.to_string()))
        .bind(reset_token.map(|(_, expires)| expires))
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Notifier double: records every dispatched code, optionally failing
    /// each send to exercise the best-effort delivery policy.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<(String, String)>>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                sent: Arc::default(),
                fail: true,
            }
        }

        pub fn last_code_for(&self, email: &str) -> Option<String> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, code)| code.clone())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_signup_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((to_email.to_string(), code.to_string()));
            if self.fail {
                return Err(NotifyError::SendFailed("simulated outage".to_string()));
            }
            Ok(())
        }

        async fn send_login_code(&self, to_email: &str, code: &str) -> Result<(), NotifyError> {
            self.send_signup_code(to_email, code).await
        }
    }

    /// Identity oracle double with canned answers and call recording.
    pub struct StubOracle {
        pub identity: Option<VerifiedIdentity>,
        pub session_subject: Option<String>,
        pub minted_cookie: Option<String>,
        pub principals: Mutex<Vec<(String, String)>>,
        pub revoked: Mutex<Vec<String>>,
    }

    impl Default for StubOracle {
        fn default() -> Self {
            Self {
                identity: None,
                session_subject: None,
                minted_cookie: Some("delegated-session".to_string()),
                principals: Mutex::new(Vec::new()),
                revoked: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl IdentityOracle for StubOracle {
        async fn verify_id_token(
            &self,
            _id_token: &str,
        ) -> Result<VerifiedIdentity, IdentityError> {
            self.identity
                .clone()
                .ok_or_else(|| IdentityError::Rejected("unknown identity token".to_string()))
        }

        async fn mint_session_cookie(
            &self,
            _id_token: &str,
            _ttl: Duration,
        ) -> Result<String, IdentityError> {
            self.minted_cookie
                .clone()
                .ok_or_else(|| IdentityError::Rejected("cannot mint session".to_string()))
        }

        async fn verify_session_cookie(&self, _cookie: &str) -> Result<String, IdentityError> {
            self.session_subject
                .clone()
                .ok_or_else(|| IdentityError::Rejected("unknown session cookie".to_string()))
        }

        async fn ensure_principal(
            &self,
            subject: &str,
            email: &str,
        ) -> Result<(), IdentityError> {
            self.principals
                .lock()
                .unwrap()
                .push((subject.to_string(), email.to_string()));
            Ok(())
        }

        async fn revoke_refresh_tokens(&self, subject: &str) -> Result<(), IdentityError> {
            self.revoked.lock().unwrap().push(subject.to_string());
            Ok(())
        }
    }

    /// Wires an AppState around in-memory storage and the doubles above.
    pub fn build_test_state(
        pool: SqlitePool,
        notifier: RecordingNotifier,
        oracle: Arc<StubOracle>,
        secret: Option<&str>,
    ) -> AppState {
        let repository = Arc::new(SqliteAccountRepository::new(pool));
        let oracle: Arc<dyn IdentityOracle> = oracle;

        AppState {
            otp_service: Arc::new(OtpService::new(
                repository.clone(),
                Box::new(notifier),
                oracle.clone(),
            )),
            session_service: Arc::new(SessionService::new(SessionConfig {
                cookie_name: "session".to_string(),
                ttl: Duration::days(7),
                secret: secret.map(str::to_string),
            })),
            federation_service: Arc::new(FederationService::new(repository.clone())),
            account_repository: repository,
            identity_oracle: oracle,
        }
    }
}
