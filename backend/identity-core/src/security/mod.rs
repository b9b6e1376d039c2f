/// Security primitives: TOTP secrets, provisioning images and backup codes
pub mod totp;

pub use totp::{TotpEnrollment, TotpGenerator, BACKUP_CODE_COUNT};
