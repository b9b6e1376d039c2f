/// Core services
///
/// - `OtpAuthenticator`: phone OTP send/verify
/// - `SecondFactorManager`: TOTP enrollment and verification, backup codes
/// - `LoginService`: first/second factor orchestration and token issuance
/// - `AuthorizationEngine` / `RbacAdmin`: role and permission resolution and management
pub mod authorization;
pub mod login;
pub mod otp_auth;
pub mod two_factor;

pub use authorization::{AuthorizationEngine, RbacAdmin};
pub use login::{LoginOutcome, LoginService};
pub use otp_auth::{OtpAuthenticator, VerifiedIdentity};
pub use two_factor::SecondFactorManager;
