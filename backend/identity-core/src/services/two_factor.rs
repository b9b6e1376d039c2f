/// Second-Factor Manager (TOTP + backup codes)
use crate::error::{IdentityError, Result};
use crate::models::User;
use crate::ports::UserRepository;
use crate::security::{TotpEnrollment, TotpGenerator};
use resilience::with_timeout_result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SecondFactorManager {
    users: Arc<dyn UserRepository>,
    totp: TotpGenerator,
    store_timeout: Duration,
}

impl SecondFactorManager {
    pub fn new(users: Arc<dyn UserRepository>, totp: TotpGenerator, store_timeout: Duration) -> Self {
        Self {
            users,
            totp,
            store_timeout,
        }
    }

    /// Begin TOTP enrollment
    ///
    /// ## Workflow
    ///
    /// 1. Generate a secret bound to the issuer and the user's account label
    /// 2. Persist the secret on the user record (2FA stays disabled)
    /// 3. Return the secret and a QR image of the provisioning URI
    ///
    /// Re-enrolling before `enable` replaces the pending secret. Enrolling an
    /// account that already has 2FA enabled is rejected.
    pub async fn enroll(&self, user_id: Uuid) -> Result<TotpEnrollment> {
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(IdentityError::TwoFactorAlreadyEnabled);
        }

        let label = user
            .account_label()
            .ok_or_else(|| IdentityError::Validation("account has no email or phone".into()))?;
        let enrollment = self.totp.enroll(label)?;

        with_timeout_result(
            self.store_timeout,
            self.users.set_two_factor_secret(user_id, &enrollment.secret),
        )
        .await?;

        info!(user_id = %user_id, "TOTP secret enrolled");
        Ok(enrollment)
    }

    /// Confirm enrollment with a TOTP code and switch 2FA on
    ///
    /// Returns the plaintext backup codes; only their digests are stored.
    /// A wrong code changes nothing.
    pub async fn enable(&self, user_id: Uuid, code: &str) -> Result<Vec<String>> {
        let user = self.load_user(user_id).await?;
        if user.two_factor_enabled {
            return Err(IdentityError::TwoFactorAlreadyEnabled);
        }
        let secret = user
            .two_factor_secret
            .as_deref()
            .ok_or(IdentityError::TwoFactorNotEnrolled)?;

        if !TotpGenerator::verify(secret, code)? {
            warn!(user_id = %user_id, "Invalid TOTP code on enable");
            return Err(IdentityError::InvalidCode);
        }

        let backup_codes = TotpGenerator::generate_backup_codes();
        let hashes: Vec<String> = backup_codes
            .iter()
            .map(|c| TotpGenerator::hash_backup_code(c))
            .collect();

        with_timeout_result(
            self.store_timeout,
            self.users.enable_two_factor(user_id, &hashes),
        )
        .await?;

        info!(user_id = %user_id, "Two-factor authentication enabled");
        Ok(backup_codes)
    }

    /// Check a TOTP code during login. Backup codes are not consumed.
    pub async fn verify_login(&self, user_id: Uuid, code: &str) -> Result<()> {
        let user = self.load_user(user_id).await?;
        let secret = enabled_secret(&user)?;

        if !TotpGenerator::verify(secret, code)? {
            warn!(user_id = %user_id, "Invalid TOTP code on login");
            return Err(IdentityError::InvalidCode);
        }

        Ok(())
    }

    /// Alternate login path: redeem one backup code (single use)
    pub async fn redeem_backup_code(&self, user_id: Uuid, code: &str) -> Result<()> {
        let user = self.load_user(user_id).await?;
        enabled_secret(&user)?;

        let hash = TotpGenerator::hash_backup_code(code);
        let consumed = with_timeout_result(
            self.store_timeout,
            self.users.consume_backup_code(user_id, &hash),
        )
        .await?;

        if !consumed {
            warn!(user_id = %user_id, "Unknown or used backup code");
            return Err(IdentityError::InvalidCode);
        }

        info!(user_id = %user_id, "Backup code redeemed");
        Ok(())
    }

    async fn load_user(&self, user_id: Uuid) -> Result<User> {
        with_timeout_result(self.store_timeout, self.users.find_by_id(user_id))
            .await?
            .ok_or(IdentityError::UserNotFound)
    }
}

fn enabled_secret(user: &User) -> Result<&str> {
    match user.two_factor_secret.as_deref() {
        Some(secret) if user.two_factor_enabled => Ok(secret),
        _ => Err(IdentityError::TwoFactorNotEnrolled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryIdentityStore;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    async fn setup() -> (SecondFactorManager, Arc<InMemoryIdentityStore>, Uuid) {
        let store = Arc::new(InMemoryIdentityStore::new());
        let user = store.create_with_phone("09123456789").await.unwrap();
        let manager = SecondFactorManager::new(
            store.clone(),
            TotpGenerator::new("Identity"),
            Duration::from_secs(1),
        );
        (manager, store, user.id)
    }

    #[tokio::test]
    async fn test_enroll_does_not_enable() {
        let (manager, store, user_id) = setup().await;
        let enrollment = manager.enroll(user_id).await.unwrap();

        let user = store.find_by_id(user_id).await.unwrap().unwrap();
        assert_eq!(user.two_factor_secret.as_deref(), Some(enrollment.secret.as_str()));
        assert!(!user.two_factor_enabled);
        // Phone is the label when there is no email
        assert!(enrollment.provisioning_uri.contains("09123456789"));
    }

    #[tokio::test]
    async fn test_enroll_labels_with_email() {
        let (manager, store, _user_id) = setup().await;
        let mut user = User::with_phone("09351112222");
        user.email = Some("a@example.com".to_string());
        let user_id = user.id;
        store.insert_user(user);

        let enrollment = manager.enroll(user_id).await.unwrap();
        assert!(enrollment.provisioning_uri.contains("Identity:a%40example.com?"));
        assert!(!enrollment.provisioning_uri.contains("09351112222"));
    }

    #[tokio::test]
    async fn test_enable_stores_hashed_backup_codes() {
        let (manager, store, user_id) = setup().await;
        let enrollment = manager.enroll(user_id).await.unwrap();
        let code = TotpGenerator::code_at(&enrollment.secret, now()).unwrap();

        let backup_codes = manager.enable(user_id, &code).await.unwrap();
        assert_eq!(backup_codes.len(), crate::security::BACKUP_CODE_COUNT);

        let user = store.find_by_id(user_id).await.unwrap().unwrap();
        assert!(user.two_factor_enabled);
        assert!(!user.two_factor_backup_codes.contains(&backup_codes[0]));
        assert!(user
            .two_factor_backup_codes
            .contains(&TotpGenerator::hash_backup_code(&backup_codes[0])));
    }

    #[tokio::test]
    async fn test_enable_without_enroll() {
        let (manager, _store, user_id) = setup().await;
        let err = manager.enable(user_id, "123456").await.unwrap_err();
        assert!(matches!(err, IdentityError::TwoFactorNotEnrolled));
    }

    #[tokio::test]
    async fn test_enroll_rejected_once_enabled() {
        let (manager, _store, user_id) = setup().await;
        let enrollment = manager.enroll(user_id).await.unwrap();
        let code = TotpGenerator::code_at(&enrollment.secret, now()).unwrap();
        manager.enable(user_id, &code).await.unwrap();

        let err = manager.enroll(user_id).await.unwrap_err();
        assert!(matches!(err, IdentityError::TwoFactorAlreadyEnabled));
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let (manager, _store, user_id) = setup().await;
        let enrollment = manager.enroll(user_id).await.unwrap();
        let code = TotpGenerator::code_at(&enrollment.secret, now()).unwrap();
        let backup_codes = manager.enable(user_id, &code).await.unwrap();

        let lowered = backup_codes[3].to_lowercase();
        manager.redeem_backup_code(user_id, &lowered).await.unwrap();

        let err = manager
            .redeem_backup_code(user_id, &backup_codes[3])
            .await
            .unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCode));
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (manager, _store, _user_id) = setup().await;
        let err = manager.enroll(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, IdentityError::UserNotFound));
    }
}
