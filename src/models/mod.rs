pub mod account;

pub use account::{Account, AccountProfile, OtpPurpose, PendingOtp, Provider};
