use authgate::{
    models::OtpPurpose,
    repositories::account_repository::{AccountRepository, SqliteAccountRepository},
    services::otp_service::{OtpError, OtpService},
    test_utils::test_helpers::{self, RecordingNotifier, StubOracle},
};
use chrono::{Duration, Utc};
use std::sync::Arc;

struct Harness {
    pool: sqlx::SqlitePool,
    repository: Arc<SqliteAccountRepository>,
    notifier: RecordingNotifier,
    oracle: Arc<StubOracle>,
    service: OtpService,
}

async fn harness() -> Harness {
    harness_with_notifier(RecordingNotifier::default()).await
}

async fn harness_with_notifier(notifier: RecordingNotifier) -> Harness {
    let pool = test_helpers::create_test_db().await.unwrap();
    let repository = Arc::new(SqliteAccountRepository::new(pool.clone()));
    let oracle = Arc::new(StubOracle::default());
    let service = OtpService::new(
        repository.clone(),
        Box::new(notifier.clone()),
        oracle.clone(),
    );
    Harness {
        pool,
        repository,
        notifier,
        oracle,
        service,
    }
}

#[tokio::test]
async fn signup_creates_pending_account_and_sends_code() {
    let h = harness().await;

    h.service
        .request_signup_otp("fresh@example.com")
        .await
        .unwrap();

    let account = h
        .repository
        .find_by_email("fresh@example.com")
        .await
        .unwrap()
        .expect("pending account created");
    assert!(!account.is_registered());
    assert!(account.provider.is_none());

    let code = h.notifier.last_code_for("fresh@example.com").unwrap();
    assert_eq!(code.len(), 6);
    assert!(code.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(account.signup_otp.as_deref(), Some(code.as_str()));
}

#[tokio::test]
async fn signup_code_verifies_exactly_once() {
    let h = harness().await;
    h.service
        .request_signup_otp("once@example.com")
        .await
        .unwrap();
    let code = h.notifier.last_code_for("once@example.com").unwrap();

    // Wrong code first
    let wrong = if code == "000000" { "111111" } else { "000000" };
    let err = h
        .service
        .verify_otp("once@example.com", wrong)
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::InvalidOtp));

    // Right code wins once
    let verified = h.service.verify_otp("once@example.com", &code).await.unwrap();
    assert_eq!(verified.purpose, OtpPurpose::Signup);

    // Consumed: the same code is dead now
    let err = h
        .service
        .verify_otp("once@example.com", &code)
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::InvalidOtp));
}

#[tokio::test]
async fn signup_verification_activates_account() {
    let h = harness().await;
    h.service
        .request_signup_otp(" User@Example.com ")
        .await
        .unwrap();

    // The address is normalized before anything else touches it
    let code = h.notifier.last_code_for("user@example.com").unwrap();

    let verified = h
        .service
        .verify_otp("User@Example.com", &code)
        .await
        .unwrap();

    let account = h
        .repository
        .find_by_email("user@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.id, verified.account_id);
    assert_eq!(account.role.as_deref(), Some("user"));
    assert_eq!(account.status.as_deref(), Some("reguler"));
    assert_eq!(
        account.provider.map(|p| p.as_str()),
        Some("email")
    );
    assert!(account.signup_otp.is_none());
    assert!(account.signup_otp_expires_at.is_none());

    // Activation established the oracle principal for the same subject
    let principals = h.oracle.principals.lock().unwrap();
    assert_eq!(
        principals.as_slice(),
        &[(account.id.clone(), "user@example.com".to_string())]
    );
}

#[tokio::test]
async fn signup_rejected_for_registered_account() {
    let h = harness().await;
    test_helpers::insert_account(
        &h.pool,
        "acc-1",
        "taken@example.com",
        Some("user"),
        None,
        None,
    )
    .await
    .unwrap();

    let err = h
        .service
        .request_signup_otp("taken@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::AlreadyRegistered));
}

#[tokio::test]
async fn repeated_signup_requests_supersede_the_code() {
    let h = harness().await;
    h.service
        .request_signup_otp("retry@example.com")
        .await
        .unwrap();
    h.service
        .request_signup_otp("retry@example.com")
        .await
        .unwrap();

    let account = h
        .repository
        .find_by_email("retry@example.com")
        .await
        .unwrap()
        .unwrap();
    let last_code = h.notifier.last_code_for("retry@example.com").unwrap();
    assert_eq!(account.signup_otp.as_deref(), Some(last_code.as_str()));
    assert_eq!(h.notifier.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn notifier_failure_does_not_fail_issuance() {
    let h = harness_with_notifier(RecordingNotifier::failing()).await;

    h.service
        .request_signup_otp("outage@example.com")
        .await
        .unwrap();

    // The code was persisted despite the failed send
    let account = h
        .repository
        .find_by_email("outage@example.com")
        .await
        .unwrap()
        .unwrap();
    assert!(account.signup_otp.is_some());
}

#[tokio::test]
async fn login_otp_requires_existing_account() {
    let h = harness().await;
    let err = h
        .service
        .request_login_otp("nobody@example.com")
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::AccountNotFound));
}

#[tokio::test]
async fn login_otp_round_trip() {
    let h = harness().await;
    test_helpers::insert_account(
        &h.pool,
        "acc-login",
        "login@example.com",
        Some("user"),
        None,
        None,
    )
    .await
    .unwrap();

    h.service
        .request_login_otp("login@example.com")
        .await
        .unwrap();
    let code = h.notifier.last_code_for("login@example.com").unwrap();

    let verified = h
        .service
        .verify_otp("login@example.com", &code)
        .await
        .unwrap();
    assert_eq!(verified.account_id, "acc-login");
    assert_eq!(verified.purpose, OtpPurpose::Reset);

    // Login verification never touches the oracle
    assert!(h.oracle.principals.lock().unwrap().is_empty());

    let account = h
        .repository
        .find_by_id("acc-login")
        .await
        .unwrap()
        .unwrap();
    assert!(account.reset_token.is_none());
    assert_eq!(account.role.as_deref(), Some("user"));
}

#[tokio::test]
async fn structural_validation_precedes_lookup() {
    let h = harness().await;

    let err = h.service.verify_otp("", "123456").await.unwrap_err();
    assert!(matches!(err, OtpError::Validation(_)));

    let err = h
        .service
        .verify_otp("a@example.com", "12345")
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::Validation(_)));
}

#[tokio::test]
async fn unknown_email_fails_like_wrong_code() {
    let h = harness().await;
    let err = h
        .service
        .verify_otp("ghost@example.com", "123456")
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::InvalidOtp));
}

#[tokio::test]
async fn code_at_expiry_instant_is_rejected() {
    let h = harness().await;
    let expiry = Utc::now() + Duration::minutes(10);
    test_helpers::insert_account(
        &h.pool,
        "acc-exp",
        "expiry@example.com",
        Some("user"),
        None,
        Some(("482913", expiry)),
    )
    .await
    .unwrap();

    // At the instant itself: dead
    let err = h
        .service
        .verify_otp_at("expiry@example.com", "482913", expiry)
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::Expired));

    // One tick earlier: alive
    let verified = h
        .service
        .verify_otp_at(
            "expiry@example.com",
            "482913",
            expiry - Duration::milliseconds(1),
        )
        .await
        .unwrap();
    assert_eq!(verified.purpose, OtpPurpose::Reset);
}

#[tokio::test]
async fn reset_token_takes_precedence_over_stale_signup_code() {
    let h = harness().await;
    let now = Utc::now();
    test_helpers::insert_account(
        &h.pool,
        "acc-both",
        "both@example.com",
        None,
        Some(("111111", now - Duration::minutes(30))),
        Some(("222222", now + Duration::minutes(10))),
    )
    .await
    .unwrap();

    // The stale signup code is not even compared
    let err = h
        .service
        .verify_otp("both@example.com", "111111")
        .await
        .unwrap_err();
    assert!(matches!(err, OtpError::InvalidOtp));

    let verified = h
        .service
        .verify_otp("both@example.com", "222222")
        .await
        .unwrap();
    assert_eq!(verified.purpose, OtpPurpose::Reset);

    // The signup slot survives untouched
    let account = h
        .repository
        .find_by_id("acc-both")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.signup_otp.as_deref(), Some("111111"));
    assert!(account.reset_token.is_none());
}
