pub mod email_service;
pub mod federation_service;
pub mod identity_service;
pub mod otp_service;
pub mod session_service;

pub use email_service::{create_notifier, LogNotifier, Notifier, NotifyError, SmtpNotifier};
pub use federation_service::{FederationError, FederationService};
pub use identity_service::{HttpIdentityOracle, IdentityError, IdentityOracle, VerifiedIdentity};
pub use otp_service::{OtpError, OtpService, VerifiedOtp};
pub use session_service::{SessionError, SessionService};
