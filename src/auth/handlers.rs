use crate::error::{AppError, Result};
use crate::models::AccountProfile;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub otp: String,
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default, rename = "idToken")]
    pub id_token: String,
}

/// Secure cookies are only set when the request was observed over TLS,
/// directly or via a trusted proxy's forwarded-proto signal.
fn request_is_tls(headers: &HeaderMap) -> bool {
    headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or(false)
}

/// POST /auth/signup — issue a signup OTP.
pub async fn request_signup(
    State(state): State<AppState>,
    body: std::result::Result<Json<EmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) = body.map_err(|_| AppError::Validation("Email is required".to_string()))?;

    state.otp_service.request_signup_otp(&body.email).await?;

    // Same acknowledgement whether the signup was fresh or pending.
    Ok(Json(json!({ "message": "Signup verification code sent" })))
}

/// POST /auth/verification — issue a login OTP for an existing account.
pub async fn request_login(
    State(state): State<AppState>,
    body: std::result::Result<Json<EmailRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) = body.map_err(|_| AppError::Validation("Email is required".to_string()))?;

    state.otp_service.request_login_otp(&body.email).await?;

    Ok(Json(json!({ "message": "Login code sent successfully" })))
}

/// POST /auth/verify-otp — verify a code; a valid one logs the caller in by
/// setting the session cookie.
pub async fn verify_otp(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: std::result::Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) =
        body.map_err(|_| AppError::Validation("Email and OTP are required".to_string()))?;

    let verified = state.otp_service.verify_otp(&body.email, &body.otp).await?;

    let jar = match state.session_service.issue(&verified.account_id) {
        Ok(Some(token)) => jar.add(
            state
                .session_service
                .build_cookie(token, request_is_tls(&headers)),
        ),
        // No signing secret configured: valid degraded state, no cookie.
        Ok(None) => jar,
        Err(e) => {
            tracing::error!("session issuance failed: {}", e);
            jar
        }
    };

    Ok((jar, Json(json!({ "message": "OTP is valid" }))))
}

/// POST /auth/session — exchange an oracle-verified identity token for a
/// delegated session cookie, reconciling OAuth identities on the way.
pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: std::result::Result<Json<CreateSessionRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let Json(body) = body.map_err(|_| AppError::Validation("idToken is required".to_string()))?;
    if body.id_token.is_empty() {
        return Err(AppError::Validation("idToken is required".to_string()));
    }

    let identity = state
        .identity_oracle
        .verify_id_token(&body.id_token)
        .await?;

    if identity.provider != crate::models::Provider::Email {
        state
            .federation_service
            .reconcile(&identity)
            .await
            .map_err(|e| AppError::Upstream(anyhow::Error::new(e)))?;
    }

    let cookie_value = state
        .identity_oracle
        .mint_session_cookie(&body.id_token, state.session_service.ttl())
        .await?;

    let jar = jar.add(
        state
            .session_service
            .build_cookie(cookie_value, request_is_tls(&headers)),
    );

    Ok((jar, Json(json!({ "authenticated": true }))))
}

/// GET /auth/session — who is the caller? Never an error: an absent or bad
/// cookie is simply unauthenticated, and a failed profile lookup still
/// reports the verified identity.
pub async fn get_session(State(state): State<AppState>, jar: CookieJar) -> Json<serde_json::Value> {
    let cookie_value = jar
        .get(state.session_service.cookie_name())
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty());

    let Some(cookie_value) = cookie_value else {
        return Json(json!({ "authenticated": false }));
    };

    // Self-issued token first; legacy delegated cookies go back to the
    // oracle for a revocation-checked verification.
    let account_id = match state.session_service.verify(&cookie_value) {
        Ok(id) => Some(id),
        Err(_) => match state
            .identity_oracle
            .verify_session_cookie(&cookie_value)
            .await
        {
            Ok(subject) => Some(subject),
            Err(e) => {
                tracing::debug!("session cookie rejected: {}", e);
                None
            }
        },
    };

    let Some(account_id) = account_id else {
        return Json(json!({ "authenticated": false }));
    };

    match state.account_repository.find_by_id(&account_id).await {
        Ok(Some(account)) => Json(json!({
            "authenticated": true,
            "user": AccountProfile::from(&account),
        })),
        Ok(None) => Json(json!({ "authenticated": true, "user": null })),
        Err(e) => {
            tracing::error!("profile lookup failed for {}: {}", account_id, e);
            Json(json!({ "authenticated": true, "user": null }))
        }
    }
}

/// POST /auth/logout — clear the cookie, revoking delegated oracle sessions
/// best-effort first.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> impl IntoResponse {
    if let Some(cookie) = jar.get(state.session_service.cookie_name()) {
        let value = cookie.value().to_string();
        // Self-issued tokens cannot be revoked server-side; only delegated
        // oracle sessions carry refresh material to invalidate.
        if !value.is_empty() && state.session_service.verify(&value).is_err() {
            if let Ok(subject) = state.identity_oracle.verify_session_cookie(&value).await {
                if let Err(e) = state.identity_oracle.revoke_refresh_tokens(&subject).await {
                    tracing::warn!("failed to revoke refresh tokens for {}: {}", subject, e);
                }
            }
        }
    }

    let jar = jar.add(state.session_service.clear_cookie(request_is_tls(&headers)));

    (jar, Json(json!({ "success": true })))
}
