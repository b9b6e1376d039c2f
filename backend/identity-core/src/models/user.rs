use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model - core identity entity
///
/// Created on first successful OTP verification for an unknown phone number;
/// mutated by 2FA enrollment/enable; never deleted by this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Unused by the OTP flow
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub two_factor_enabled: bool,
    /// Base-32 TOTP secret, present once enrolled
    #[serde(skip_serializing)]
    pub two_factor_secret: Option<String>,
    /// SHA-256 digests of unused backup codes
    #[serde(skip_serializing, default)]
    pub two_factor_backup_codes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Fresh user identified only by phone
    pub fn with_phone(phone: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: None,
            phone: Some(phone.to_string()),
            password_hash: None,
            two_factor_enabled: false,
            two_factor_secret: None,
            two_factor_backup_codes: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Label shown in authenticator apps: email, falling back to phone
    pub fn account_label(&self) -> Option<&str> {
        self.email
            .as_deref()
            .filter(|e| !e.is_empty())
            .or(self.phone.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_label_prefers_email() {
        let mut user = User::with_phone("09123456789");
        assert_eq!(user.account_label(), Some("09123456789"));

        user.email = Some("a@example.com".into());
        assert_eq!(user.account_label(), Some("a@example.com"));
    }

    #[test]
    fn test_secrets_not_serialized() {
        let mut user = User::with_phone("09123456789");
        user.two_factor_secret = Some("JBSWY3DPEHPK3PXP".into());
        user.two_factor_backup_codes = vec!["deadbeef".into()];

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("JBSWY3DPEHPK3PXP"));
        assert!(!json.contains("deadbeef"));
        assert!(json.contains("09123456789"));
    }
}
