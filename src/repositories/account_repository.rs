use crate::models::{Account, OtpPurpose, Provider};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Account not found")]
    NotFound,
    #[error("Account already exists")]
    AlreadyExists,
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Durable account store. Every mutation is a single SQL statement so that
/// concurrent requests against the same record cannot interleave partial
/// field writes.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait AccountRepository: Send + Sync {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Account>>;
    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Account>>;

    /// Creates a bare pending record carrying only the email, the signup OTP
    /// slot and timestamps. No role, no provider.
    async fn create_pending(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Account>;

    /// Overwrites one OTP slot with a fresh code and expiry.
    async fn set_otp(
        &self,
        id: &str,
        purpose: OtpPurpose,
        code: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Consumes a code, conditioned on the stored slot still holding it.
    /// Returns `false` when another request consumed it first; exactly one
    /// of two racing verifications wins. Consuming a signup code also runs
    /// the activation transition (provider/status/role) in the same
    /// statement.
    async fn consume_otp(
        &self,
        id: &str,
        purpose: OtpPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    /// Inserts or field-level-updates a federated account keyed by the
    /// oracle subject. Existing profile fields survive when the new claims
    /// carry none.
    #[allow(clippy::too_many_arguments)]
    async fn upsert_federated(
        &self,
        subject: &str,
        email: &str,
        provider: Provider,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()>;
}

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT
        id, email, role, status, provider, display_name, avatar_url,
        signup_otp, signup_otp_expires_at, reset_token, reset_token_expires_at,
        created_at, updated_at
    FROM accounts
"#;

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn find_by_email(&self, email: &str) -> RepositoryResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!("{SELECT_COLUMNS} WHERE email = ?"))
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_by_id(&self, id: &str) -> RepositoryResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn create_pending(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Account> {
        let id = Uuid::new_v4().to_string();
        let result = sqlx::query(
            r#"
            INSERT INTO accounts (id, email, signup_otp, signup_otp_expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(email)
        .bind(code)
        .bind(expires_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self.find_by_id(&id).await?.ok_or(RepositoryError::NotFound),
            Err(e) => {
                if e.to_string().contains("UNIQUE") {
                    Err(RepositoryError::AlreadyExists)
                } else {
                    Err(RepositoryError::Database(e))
                }
            }
        }
    }

    async fn set_otp(
        &self,
        id: &str,
        purpose: OtpPurpose,
        code: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let sql = match purpose {
            OtpPurpose::Signup => {
                r#"
                UPDATE accounts
                SET signup_otp = ?, signup_otp_expires_at = ?, updated_at = ?
                WHERE id = ?
                "#
            }
            OtpPurpose::Reset => {
                r#"
                UPDATE accounts
                SET reset_token = ?, reset_token_expires_at = ?, updated_at = ?
                WHERE id = ?
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(code)
            .bind(expires_at)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        Ok(())
    }

    async fn consume_otp(
        &self,
        id: &str,
        purpose: OtpPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        // The WHERE clause re-checks the stored code so the slot can only be
        // cleared once no matter how many requests race on it.
        let sql = match purpose {
            OtpPurpose::Signup => {
                r#"
                UPDATE accounts
                SET signup_otp = NULL,
                    signup_otp_expires_at = NULL,
                    provider = 'email',
                    status = 'reguler',
                    role = 'user',
                    updated_at = ?
                WHERE id = ? AND signup_otp = ?
                "#
            }
            OtpPurpose::Reset => {
                r#"
                UPDATE accounts
                SET reset_token = NULL,
                    reset_token_expires_at = NULL,
                    updated_at = ?
                WHERE id = ? AND reset_token = ?
                "#
            }
        };

        let result = sqlx::query(sql)
            .bind(now)
            .bind(id)
            .bind(code)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_federated(
        &self,
        subject: &str,
        email: &str,
        provider: Provider,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO accounts
                (id, email, provider, role, status, display_name, avatar_url, created_at, updated_at)
            VALUES (?, ?, ?, 'user', 'reguler', ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                provider = excluded.provider,
                role = excluded.role,
                status = excluded.status,
                display_name = COALESCE(excluded.display_name, accounts.display_name),
                avatar_url = COALESCE(excluded.avatar_url, accounts.avatar_url),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(subject)
        .bind(email)
        .bind(provider.as_str())
        .bind(display_name)
        .bind(avatar_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                if e.to_string().contains("UNIQUE") {
                    Err(RepositoryError::AlreadyExists)
                } else {
                    Err(RepositoryError::Database(e))
                }
            }
        }
    }
}
