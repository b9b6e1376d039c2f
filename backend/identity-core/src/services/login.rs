/// Login orchestration: OTP first factor, optional TOTP second factor
///
/// ```text
/// verify_otp ──► 2FA disabled ──► full token
///      │
///      └──────► 2FA enabled ───► temporary token ──► verify_second_factor / recover ──► full token
/// ```
///
/// A temporary token can be exchanged for a full token once. The exchange is
/// recorded under its token id until the temporary token would expire.
use crate::error::{IdentityError, Result};
use crate::models::User;
use crate::ports::{ChallengeStore, StoreError, UserRepository};
use crate::services::{OtpAuthenticator, SecondFactorManager};
use chrono::Utc;
use crypto_core::{IssuedToken, SessionClaims, TokenIssuer};
use resilience::with_timeout_result;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Result of a successful first-factor verification
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user_id: Uuid,
    /// Full token, or a temporary token when `two_factor_required`
    pub token: String,
    pub expires_in: i64,
    pub two_factor_required: bool,
}

#[derive(Clone)]
pub struct LoginService {
    otp: OtpAuthenticator,
    second_factor: SecondFactorManager,
    users: Arc<dyn UserRepository>,
    exchanges: Arc<dyn ChallengeStore>,
    tokens: Arc<TokenIssuer>,
    store_timeout: Duration,
}

const EXCHANGE_KEY_PREFIX: &str = "2fa:exchanged:";

impl LoginService {
    pub fn new(
        otp: OtpAuthenticator,
        second_factor: SecondFactorManager,
        users: Arc<dyn UserRepository>,
        exchanges: Arc<dyn ChallengeStore>,
        tokens: Arc<TokenIssuer>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            otp,
            second_factor,
            users,
            exchanges,
            tokens,
            store_timeout,
        }
    }

    pub fn otp(&self) -> &OtpAuthenticator {
        &self.otp
    }

    pub fn second_factor(&self) -> &SecondFactorManager {
        &self.second_factor
    }

    /// Verify the OTP, resolve (or create) the user and issue a token
    ///
    /// A user with 2FA enabled only ever receives a temporary token here.
    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<LoginOutcome> {
        let verified = self.otp.verify(phone, code).await?;
        let user = self.find_or_create(&verified.phone).await?;

        let (issued, two_factor_required) = if user.two_factor_enabled {
            (self.tokens.issue_temporary(user.id)?, true)
        } else {
            (self.tokens.issue_full(user.id)?, false)
        };

        info!(
            user_id = %user.id,
            two_factor_required,
            "First factor accepted"
        );

        Ok(LoginOutcome {
            user_id: user.id,
            token: issued.token,
            expires_in: issued.expires_in,
            two_factor_required,
        })
    }

    /// Upgrade a temporary session to a full one with a TOTP code
    pub async fn verify_second_factor(
        &self,
        claims: &SessionClaims,
        code: &str,
    ) -> Result<IssuedToken> {
        require_temporary(claims)?;
        self.ensure_not_exchanged(claims).await?;
        self.second_factor.verify_login(claims.user_id, code).await?;
        self.claim_exchange(claims).await?;

        info!(user_id = %claims.user_id, "Second factor accepted");
        Ok(self.tokens.issue_full(claims.user_id)?)
    }

    /// Upgrade a temporary session to a full one with a backup code
    pub async fn recover(&self, claims: &SessionClaims, backup_code: &str) -> Result<IssuedToken> {
        require_temporary(claims)?;
        self.ensure_not_exchanged(claims).await?;
        self.second_factor
            .redeem_backup_code(claims.user_id, backup_code)
            .await?;
        self.claim_exchange(claims).await?;

        info!(user_id = %claims.user_id, "Second factor accepted via backup code");
        Ok(self.tokens.issue_full(claims.user_id)?)
    }

    /// Reject a spent temporary token before any second-factor code is checked
    async fn ensure_not_exchanged(&self, claims: &SessionClaims) -> Result<()> {
        let spent = with_timeout_result(
            self.store_timeout,
            self.exchanges.get(&exchange_key(claims)),
        )
        .await?;

        if spent.is_some() {
            warn!(
                user_id = %claims.user_id,
                token_id = %claims.token_id,
                "Temporary token already exchanged"
            );
            return Err(IdentityError::Unauthenticated);
        }
        Ok(())
    }

    /// Mark the temporary token as spent; the loser of a concurrent exchange is rejected
    async fn claim_exchange(&self, claims: &SessionClaims) -> Result<()> {
        let key = exchange_key(claims);
        let remaining = (claims.expires_at - Utc::now())
            .to_std()
            .unwrap_or_default()
            .max(Duration::from_secs(1));

        let claimed = with_timeout_result(
            self.store_timeout,
            self.exchanges.set_if_absent(&key, "1", remaining),
        )
        .await?;

        if !claimed {
            warn!(
                user_id = %claims.user_id,
                token_id = %claims.token_id,
                "Temporary token already exchanged"
            );
            return Err(IdentityError::Unauthenticated);
        }
        Ok(())
    }

    async fn find_or_create(&self, phone: &str) -> Result<User> {
        let existing =
            with_timeout_result(self.store_timeout, self.users.find_by_phone(phone)).await?;
        if let Some(user) = existing {
            return Ok(user);
        }

        match with_timeout_result(self.store_timeout, self.users.create_with_phone(phone)).await {
            Ok(user) => {
                info!(user_id = %user.id, "User created on first login");
                Ok(user)
            }
            // Lost a race with a concurrent first login for the same phone
            Err(StoreError::Conflict(_)) => {
                with_timeout_result(self.store_timeout, self.users.find_by_phone(phone))
                    .await?
                    .ok_or(IdentityError::UserNotFound)
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn exchange_key(claims: &SessionClaims) -> String {
    format!("{}{}", EXCHANGE_KEY_PREFIX, claims.token_id)
}

fn require_temporary(claims: &SessionClaims) -> Result<()> {
    if claims.is_temporary() {
        Ok(())
    } else {
        warn!(user_id = %claims.user_id, "Full token presented to second-factor step");
        Err(IdentityError::Unauthenticated)
    }
}
