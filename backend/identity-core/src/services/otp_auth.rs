/// OTP Authenticator
///
/// Issues and verifies phone OTP challenges.
///
/// - Code: 6 uniformly random digits, zero-padded
/// - Stored at `otp:{phone}` for 5 minutes; a new send overwrites the old code
/// - Verification is a single compare-and-delete, so a code is accepted at
///   most once even under concurrent verifies
/// - No internal retries; delivery retry policy belongs to the gateway wrapper
use crate::config::OtpSettings;
use crate::error::{IdentityError, Result};
use crate::ports::{ChallengeStore, ConsumeOutcome, NotificationGateway};
use crate::validators::{mask_phone, validate_code, validate_phone};
use rand::{rngs::OsRng, Rng};
use resilience::with_timeout_result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Challenge store key prefix
const OTP_KEY_PREFIX: &str = "otp:";

/// Marker proving the caller completed the OTP challenge for `phone`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub phone: String,
}

#[derive(Clone)]
pub struct OtpAuthenticator {
    challenges: Arc<dyn ChallengeStore>,
    gateway: Arc<dyn NotificationGateway>,
    ttl: Duration,
    store_timeout: Duration,
}

impl OtpAuthenticator {
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        gateway: Arc<dyn NotificationGateway>,
        settings: &OtpSettings,
    ) -> Self {
        Self {
            challenges,
            gateway,
            ttl: settings.ttl(),
            store_timeout: settings.store_timeout(),
        }
    }

    /// Issue a fresh code for `phone` and deliver it
    ///
    /// The code is stored before delivery. If the gateway fails the stored code
    /// stays valid and `DeliveryFailed` is returned; a repeated send replaces it.
    pub async fn send(&self, phone: &str) -> Result<()> {
        if !validate_phone(phone) {
            return Err(IdentityError::InvalidPhone(mask_phone(phone)));
        }

        let code = generate_code();
        let key = challenge_key(phone);

        with_timeout_result(
            self.store_timeout,
            self.challenges.set(&key, &code, self.ttl),
        )
        .await?;

        self.gateway.send_otp(phone, &code).await?;

        info!(phone = %mask_phone(phone), "OTP issued");
        Ok(())
    }

    /// Check `code` against the pending challenge and consume it on match
    pub async fn verify(&self, phone: &str, code: &str) -> Result<VerifiedIdentity> {
        if !validate_phone(phone) {
            return Err(IdentityError::InvalidPhone(mask_phone(phone)));
        }
        if !validate_code(code) {
            return Err(IdentityError::InvalidCodeFormat);
        }

        let key = challenge_key(phone);
        let outcome = with_timeout_result(
            self.store_timeout,
            self.challenges.consume_if_matches(&key, code),
        )
        .await?;

        match outcome {
            ConsumeOutcome::Consumed => {
                info!(phone = %mask_phone(phone), "OTP verified");
                Ok(VerifiedIdentity {
                    phone: phone.to_string(),
                })
            }
            ConsumeOutcome::Mismatch => {
                warn!(phone = %mask_phone(phone), "OTP mismatch");
                Err(IdentityError::CodeMismatch)
            }
            ConsumeOutcome::Absent => Err(IdentityError::ChallengeNotFound),
        }
    }
}

fn challenge_key(phone: &str) -> String {
    format!("{}{}", OTP_KEY_PREFIX, phone)
}

/// Uniform over 000000..=999999
fn generate_code() -> String {
    format!("{:06}", OsRng.gen_range(0..1_000_000u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{InMemoryChallengeStore, RecordingGateway};

    const PHONE: &str = "09123456789";

    fn authenticator() -> (OtpAuthenticator, Arc<InMemoryChallengeStore>, Arc<RecordingGateway>) {
        let store = Arc::new(InMemoryChallengeStore::new());
        let gateway = Arc::new(RecordingGateway::new());
        let otp = OtpAuthenticator::new(store.clone(), gateway.clone(), &OtpSettings::default());
        (otp, store, gateway)
    }

    #[test]
    fn test_generate_code_format() {
        for _ in 0..1000 {
            let code = generate_code();
            assert!(validate_code(&code), "bad code {code}");
        }
    }

    #[tokio::test]
    async fn test_send_stores_under_phone_key() {
        let (otp, store, gateway) = authenticator();
        otp.send(PHONE).await.unwrap();

        let sent = gateway.last_code_for(PHONE).unwrap();
        let stored = store.get("otp:09123456789").await.unwrap();
        assert_eq!(stored, Some(sent));
    }

    #[tokio::test]
    async fn test_resend_invalidates_previous_code() {
        let (otp, _store, gateway) = authenticator();
        otp.send(PHONE).await.unwrap();
        let first = gateway.last_code_for(PHONE).unwrap();
        otp.send(PHONE).await.unwrap();
        let second = gateway.last_code_for(PHONE).unwrap();

        if first != second {
            assert!(matches!(
                otp.verify(PHONE, &first).await,
                Err(IdentityError::CodeMismatch)
            ));
        }
        assert!(otp.verify(PHONE, &second).await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_phone_has_no_side_effect() {
        let (otp, _store, gateway) = authenticator();
        let err = otp.send("12345").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidPhone(_)));
        assert_eq!(gateway.attempts(), 0);
    }

    #[tokio::test]
    async fn test_malformed_code_rejected_before_lookup() {
        let (otp, _store, _gateway) = authenticator();
        let err = otp.verify(PHONE, "12 456").await.unwrap_err();
        assert!(matches!(err, IdentityError::InvalidCodeFormat));
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_code() {
        let store = Arc::new(InMemoryChallengeStore::new());
        let gateway = Arc::new(RecordingGateway::failing());
        let otp = OtpAuthenticator::new(store.clone(), gateway, &OtpSettings::default());

        let err = otp.send(PHONE).await.unwrap_err();
        assert!(matches!(err, IdentityError::DeliveryFailed(_)));
        assert!(err.is_retryable());

        let stored = store.get("otp:09123456789").await.unwrap().unwrap();
        assert!(otp.verify(PHONE, &stored).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_outage_issues_nothing() {
        let (otp, store, gateway) = authenticator();
        store.set_unavailable(true);

        let err = otp.send(PHONE).await.unwrap_err();
        assert!(matches!(err, IdentityError::StoreUnavailable(_)));
        assert_eq!(gateway.attempts(), 0);
    }
}
