use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Where an account record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Provider {
    Email,
    Google,
    Github,
}

impl Provider {
    /// Maps the identity oracle's sign-in marker to a provider. Anything
    /// unrecognized falls back to `Email`.
    pub fn from_oracle_marker(marker: &str) -> Self {
        match marker {
            "google.com" => Provider::Google,
            "github.com" => Provider::Github,
            _ => Provider::Email,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::Google => "google",
            Provider::Github => "github",
        }
    }
}

/// One account record. The id is opaque and stable; once the account exists
/// at the identity oracle it equals the oracle subject.
///
/// The two OTP column pairs are structurally independent slots on the same
/// record: a stale signup code can coexist with a fresh login code. Use
/// [`Account::active_otp`] to get the single slot under test.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub role: Option<String>,
    pub status: Option<String>,
    pub provider: Option<Provider>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub signup_otp: Option<String>,
    pub signup_otp_expires_at: Option<DateTime<Utc>>,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which OTP slot a code was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpPurpose {
    Signup,
    Reset,
}

/// The single pending code selected for verification, tagged with its
/// purpose so precedence is decided here and nowhere else.
#[derive(Debug, Clone)]
pub struct PendingOtp {
    pub purpose: OtpPurpose,
    pub code: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Account {
    /// An account with a role is fully registered and must never re-enter
    /// the signup flow.
    pub fn is_registered(&self) -> bool {
        self.role.is_some()
    }

    /// Selects the slot under test. A login/reset code always takes
    /// precedence over a signup code when both are populated.
    pub fn active_otp(&self) -> Option<PendingOtp> {
        if let Some(code) = non_empty(&self.reset_token) {
            return Some(PendingOtp {
                purpose: OtpPurpose::Reset,
                code,
                expires_at: self.reset_token_expires_at,
            });
        }
        if let Some(code) = non_empty(&self.signup_otp) {
            return Some(PendingOtp {
                purpose: OtpPurpose::Signup,
                code,
                expires_at: self.signup_otp_expires_at,
            });
        }
        None
    }
}

fn non_empty(slot: &Option<String>) -> Option<String> {
    slot.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Public shape of an account, returned from the session read path. Never
/// includes the OTP slots.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    pub uid: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<&Account> for AccountProfile {
    fn from(account: &Account) -> Self {
        AccountProfile {
            uid: account.id.clone(),
            email: account.email.clone(),
            role: account.role.clone(),
            status: account.status.clone(),
            provider: account.provider,
            display_name: account.display_name.clone(),
            avatar_url: account.avatar_url.clone(),
            created_at: account.created_at.timestamp_millis(),
            updated_at: account.updated_at.timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn bare_account() -> Account {
        let now = Utc::now();
        Account {
            id: "acc-1".to_string(),
            email: "user@example.com".to_string(),
            role: None,
            status: None,
            provider: None,
            display_name: None,
            avatar_url: None,
            signup_otp: None,
            signup_otp_expires_at: None,
            reset_token: None,
            reset_token_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn reset_slot_wins_when_both_populated() {
        let mut account = bare_account();
        account.signup_otp = Some("111111".to_string());
        account.signup_otp_expires_at = Some(Utc::now() - Duration::minutes(30));
        account.reset_token = Some("222222".to_string());
        account.reset_token_expires_at = Some(Utc::now() + Duration::minutes(10));

        let pending = account.active_otp().unwrap();
        assert_eq!(pending.purpose, OtpPurpose::Reset);
        assert_eq!(pending.code, "222222");
    }

    #[test]
    fn empty_reset_slot_falls_back_to_signup() {
        let mut account = bare_account();
        account.signup_otp = Some("333333".to_string());
        account.reset_token = Some("   ".to_string());

        let pending = account.active_otp().unwrap();
        assert_eq!(pending.purpose, OtpPurpose::Signup);
        assert_eq!(pending.code, "333333");
    }

    #[test]
    fn no_slots_means_no_pending_otp() {
        assert!(bare_account().active_otp().is_none());
    }

    #[test]
    fn role_marks_account_registered() {
        let mut account = bare_account();
        assert!(!account.is_registered());
        account.role = Some("user".to_string());
        assert!(account.is_registered());
    }

    #[test]
    fn oracle_marker_mapping() {
        assert_eq!(Provider::from_oracle_marker("google.com"), Provider::Google);
        assert_eq!(Provider::from_oracle_marker("github.com"), Provider::Github);
        assert_eq!(Provider::from_oracle_marker("password"), Provider::Email);
    }
}
