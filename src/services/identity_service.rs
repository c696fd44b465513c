use crate::config::OracleConfig;
use crate::models::Provider;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity oracle request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Identity oracle rejected the request: {0}")]
    Rejected(String),
    #[error("Identity oracle returned a malformed response: {0}")]
    Malformed(String),
}

/// Claims the oracle vouches for after verifying an externally issued
/// identity token.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub provider: Provider,
}

/// External identity provider, treated as an oracle: it either returns
/// verified claims or fails closed.
#[async_trait]
pub trait IdentityOracle: Send + Sync {
    /// Verifies an identity token and returns its claims.
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError>;

    /// Exchanges a verified identity token for a provider-issued session
    /// cookie with the given lifetime.
    async fn mint_session_cookie(
        &self,
        id_token: &str,
        ttl: Duration,
    ) -> Result<String, IdentityError>;

    /// Verifies a provider-issued session cookie, including a revocation
    /// check, and returns the subject it was minted for.
    async fn verify_session_cookie(&self, cookie: &str) -> Result<String, IdentityError>;

    /// Creates the principal for a subject if the oracle does not know it
    /// yet, so later oracle flows address the same subject.
    async fn ensure_principal(&self, subject: &str, email: &str) -> Result<(), IdentityError>;

    /// Invalidates all outstanding refresh material for a subject.
    async fn revoke_refresh_tokens(&self, subject: &str) -> Result<(), IdentityError>;
}

/// REST client against an identity-toolkit style admin API.
pub struct HttpIdentityOracle {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    #[serde(default)]
    users: Vec<OracleUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OracleUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(default)]
    provider_user_info: Vec<ProviderUserInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProviderUserInfo {
    provider_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionCookieResponse {
    session_cookie: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyCookieResponse {
    local_id: String,
}

impl HttpIdentityOracle {
    pub fn new(config: &OracleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            api_key: config.api_key.clone(),
        }
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, IdentityError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected(format!("{}: {}", status, detail)));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| IdentityError::Malformed(e.to_string()))
    }

    fn claims_from_user(user: OracleUser) -> Result<VerifiedIdentity, IdentityError> {
        let email = user
            .email
            .filter(|e| !e.is_empty())
            .ok_or_else(|| IdentityError::Malformed("claims carry no email".to_string()))?;

        let provider = user
            .provider_user_info
            .first()
            .map(|info| Provider::from_oracle_marker(&info.provider_id))
            .unwrap_or(Provider::Email);

        Ok(VerifiedIdentity {
            subject: user.local_id,
            email,
            display_name: user.display_name.filter(|s| !s.is_empty()),
            avatar_url: user.photo_url.filter(|s| !s.is_empty()),
            provider,
        })
    }
}

#[async_trait]
impl IdentityOracle for HttpIdentityOracle {
    async fn verify_id_token(&self, id_token: &str) -> Result<VerifiedIdentity, IdentityError> {
        let response: LookupResponse = self
            .post_json("/v1/accounts:lookup", json!({ "idToken": id_token }))
            .await?;

        let user = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| IdentityError::Rejected("unknown identity token".to_string()))?;

        Self::claims_from_user(user)
    }

    async fn mint_session_cookie(
        &self,
        id_token: &str,
        ttl: Duration,
    ) -> Result<String, IdentityError> {
        let response: SessionCookieResponse = self
            .post_json(
                &format!("/v1/projects/{}:createSessionCookie", self.project_id),
                json!({ "idToken": id_token, "validDuration": ttl.num_seconds() }),
            )
            .await?;

        Ok(response.session_cookie)
    }

    async fn verify_session_cookie(&self, cookie: &str) -> Result<String, IdentityError> {
        let response: VerifyCookieResponse = self
            .post_json(
                &format!("/v1/projects/{}:verifySessionCookie", self.project_id),
                json!({ "sessionCookie": cookie, "checkRevoked": true }),
            )
            .await?;

        Ok(response.local_id)
    }

    async fn ensure_principal(&self, subject: &str, email: &str) -> Result<(), IdentityError> {
        let response: LookupResponse = self
            .post_json("/v1/accounts:lookup", json!({ "localId": [subject] }))
            .await?;

        if !response.users.is_empty() {
            return Ok(());
        }

        let _: serde_json::Value = self
            .post_json(
                &format!("/v1/projects/{}/accounts", self.project_id),
                json!({ "localId": subject, "email": email, "emailVerified": true }),
            )
            .await?;

        Ok(())
    }

    async fn revoke_refresh_tokens(&self, subject: &str) -> Result<(), IdentityError> {
        let _: serde_json::Value = self
            .post_json(
                &format!("/v1/projects/{}/accounts:update", self.project_id),
                json!({ "localId": subject, "validSince": Utc::now().timestamp() }),
            )
            .await?;

        Ok(())
    }
}
