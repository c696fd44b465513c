use crate::repositories::account_repository::{AccountRepository, RepositoryError};
use crate::services::identity_service::VerifiedIdentity;
use crate::services::otp_service::OtpService;
use chrono::Utc;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Reconciles an oracle-verified identity into the local account store. The
/// oracle subject is reused directly as the account id; there is no mapping
/// table.
pub struct FederationService {
    repository: Arc<dyn AccountRepository>,
}

impl FederationService {
    pub fn new(repository: Arc<dyn AccountRepository>) -> Self {
        Self { repository }
    }

    /// Idempotent: the first successful reconciliation wins. Once the
    /// account carries a role, later OAuth logins leave the profile alone.
    pub async fn reconcile(&self, identity: &VerifiedIdentity) -> Result<(), FederationError> {
        if let Some(account) = self.repository.find_by_id(&identity.subject).await? {
            if account.is_registered() {
                tracing::debug!(
                    "account {} already registered, skipping reconciliation",
                    identity.subject
                );
                return Ok(());
            }
        }

        let email = OtpService::normalize_email(&identity.email);
        let now = Utc::now();

        self.repository
            .upsert_federated(
                &identity.subject,
                &email,
                identity.provider,
                identity.display_name.as_deref(),
                identity.avatar_url.as_deref(),
                now,
            )
            .await?;

        Ok(())
    }
}
