pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub otp_service: Arc<services::otp_service::OtpService>,
    pub session_service: Arc<services::session_service::SessionService>,
    pub federation_service: Arc<services::federation_service::FederationService>,
    pub account_repository: Arc<dyn repositories::AccountRepository>,
    pub identity_oracle: Arc<dyn services::IdentityOracle>,
}

/// The authentication surface. Layers (tracing, CORS) are added by the
/// binary; tests drive this router directly.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/auth/signup", post(auth::handlers::request_signup))
        .route("/auth/verification", post(auth::handlers::request_login))
        .route("/auth/verify-otp", post(auth::handlers::verify_otp))
        .route(
            "/auth/session",
            post(auth::handlers::create_session).get(auth::handlers::get_session),
        )
        .route("/auth/logout", post(auth::handlers::logout))
        .with_state(state)
}
