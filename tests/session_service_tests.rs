use authgate::{
    config::SessionConfig,
    services::session_service::{SessionError, SessionService},
};
use chrono::{Duration, Utc};

fn service_with_secret(secret: &str) -> SessionService {
    SessionService::new(SessionConfig {
        cookie_name: "session".to_string(),
        ttl: Duration::days(7),
        secret: Some(secret.to_string()),
    })
}

#[test]
fn verify_returns_the_issued_subject() {
    let service = service_with_secret("secret-a");

    for account_id in ["acc-1", "9f3a2c", "a-very-long-opaque-identifier"] {
        let token = service.issue(account_id).unwrap().unwrap();
        assert_eq!(service.verify(&token).unwrap(), account_id);
    }
}

#[test]
fn token_survives_until_the_horizon() {
    let service = service_with_secret("secret-a");

    // Issued almost 7 days ago: still valid
    let token = service
        .issue_at("acc-1", Utc::now() - Duration::days(7) + Duration::minutes(1))
        .unwrap()
        .unwrap();
    assert_eq!(service.verify(&token).unwrap(), "acc-1");
}

#[test]
fn expired_token_is_rejected() {
    let service = service_with_secret("secret-a");

    let token = service
        .issue_at("acc-1", Utc::now() - Duration::days(8))
        .unwrap()
        .unwrap();
    assert!(matches!(service.verify(&token), Err(SessionError::Invalid)));
}

#[test]
fn forged_signature_is_rejected() {
    let issuer = service_with_secret("secret-a");
    let verifier = service_with_secret("secret-b");

    let token = issuer.issue("acc-1").unwrap().unwrap();
    assert!(matches!(
        verifier.verify(&token),
        Err(SessionError::Invalid)
    ));
}

#[test]
fn tampered_token_is_rejected() {
    let service = service_with_secret("secret-a");
    let token = service.issue("acc-1").unwrap().unwrap();

    let mut tampered = token.clone();
    tampered.pop();
    assert!(matches!(
        service.verify(&tampered),
        Err(SessionError::Invalid)
    ));

    assert!(matches!(
        service.verify("only.two"),
        Err(SessionError::Invalid)
    ));
}

#[test]
fn missing_secret_disables_issuance_without_error() {
    let service = SessionService::new(SessionConfig {
        cookie_name: "session".to_string(),
        ttl: Duration::days(7),
        secret: None,
    });

    assert!(service.issue("acc-1").unwrap().is_none());
}
