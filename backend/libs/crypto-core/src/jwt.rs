/// Session token issuance and validation
///
/// Tokens are HS256-signed JWTs carrying the subject, issue/expiry times and
/// a grade flag. Two grades exist:
///
/// - **Full**: issued once every required factor has succeeded (72h default)
/// - **Temporary**: issued after the OTP step for accounts with 2FA enabled;
///   only the second-factor verification step accepts it (5m default)
///
/// ## Key lifecycle
///
/// The signing secret is injected from configuration when the issuer is
/// constructed, held behind `SecretString` until the keys are derived, and
/// never mutated afterwards. There is no process-global key state; callers
/// share one `TokenIssuer` (typically behind an `Arc`).
///
/// ```rust
/// use crypto_core::jwt::{TokenIssuer, TokenLifetimes};
/// use secrecy::SecretString;
///
/// let secret = SecretString::from("0123456789abcdef0123456789abcdef".to_string());
/// let issuer = TokenIssuer::new(&secret, TokenLifetimes::default()).unwrap();
/// let issued = issuer.issue_full(uuid::Uuid::new_v4()).unwrap();
/// let claims = issuer.validate(&issued.token).unwrap();
/// assert!(!claims.is_temporary());
/// ```
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// Constants
// ============================================================================

/// Minimum signing secret length in bytes (256 bits for HS256)
pub const MIN_SECRET_LENGTH: usize = 32;

const FULL_TOKEN_EXPIRY_HOURS: i64 = 72;
const TEMPORARY_TOKEN_EXPIRY_MINUTES: i64 = 5;

/// Pinned algorithm; headers naming anything else are rejected
const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Data Structures
// ============================================================================

/// Wire claims. Kept private so consumers only ever see `SessionClaims`.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct Claims {
    sub: String,
    iat: i64,
    exp: i64,
    jti: String,
    #[serde(default)]
    tmp: bool,
}

/// Token grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenGrade {
    Full,
    Temporary,
}

/// Typed claims produced once by `TokenIssuer::validate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub grade: TokenGrade,
}

impl SessionClaims {
    pub fn is_temporary(&self) -> bool {
        self.grade == TokenGrade::Temporary
    }
}

/// A freshly minted token
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub grade: TokenGrade,
    pub expires_at: DateTime<Utc>,
    /// Seconds until expiry at the time of issuance
    pub expires_in: i64,
}

/// Validity windows for each grade
#[derive(Debug, Clone, Copy)]
pub struct TokenLifetimes {
    pub full: Duration,
    pub temporary: Duration,
}

impl Default for TokenLifetimes {
    fn default() -> Self {
        Self {
            full: Duration::hours(FULL_TOKEN_EXPIRY_HOURS),
            temporary: Duration::minutes(TEMPORARY_TOKEN_EXPIRY_MINUTES),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("signing secret must be at least {MIN_SECRET_LENGTH} bytes")]
    WeakSecret,
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
    #[error("token signature is invalid")]
    SignatureInvalid,
    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::SignatureInvalid
            }
            _ => TokenError::Malformed,
        }
    }
}

// ============================================================================
// Issuer
// ============================================================================

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    lifetimes: TokenLifetimes,
}

impl fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("algorithm", &JWT_ALGORITHM)
            .field("lifetimes", &self.lifetimes)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Derive signing/validation keys from a configuration-supplied secret
    ///
    /// ## Errors
    ///
    /// `TokenError::WeakSecret` if the secret is shorter than `MIN_SECRET_LENGTH`
    pub fn new(secret: &SecretString, lifetimes: TokenLifetimes) -> Result<Self, TokenError> {
        let secret = secret.expose_secret().as_bytes();
        if secret.len() < MIN_SECRET_LENGTH {
            return Err(TokenError::WeakSecret);
        }

        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            lifetimes,
        })
    }

    pub fn lifetimes(&self) -> TokenLifetimes {
        self.lifetimes
    }

    /// Issue a full-privilege token (subject may call any protected operation)
    pub fn issue_full(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, TokenGrade::Full, Utc::now())
    }

    /// Issue a second-factor-pending token
    pub fn issue_temporary(&self, user_id: Uuid) -> Result<IssuedToken, TokenError> {
        self.issue_at(user_id, TokenGrade::Temporary, Utc::now())
    }

    fn issue_at(
        &self,
        user_id: Uuid,
        grade: TokenGrade,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let lifetime = match grade {
            TokenGrade::Full => self.lifetimes.full,
            TokenGrade::Temporary => self.lifetimes.temporary,
        };
        let expires_at = now + lifetime;

        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            tmp: grade == TokenGrade::Temporary,
        };

        let token = encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))?;

        Ok(IssuedToken {
            token,
            grade,
            expires_at,
            expires_in: lifetime.num_seconds(),
        })
    }

    /// Validate signature and expiry, returning typed claims
    ///
    /// ## Errors
    ///
    /// - `Expired`: signature valid but `exp` has passed
    /// - `SignatureInvalid`: wrong key or a non-HS256 header
    /// - `Malformed`: anything that is not a well-formed token of ours
    pub fn validate(&self, token: &str) -> Result<SessionClaims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            debug!(error = %e, "Token validation failed");
            TokenError::from(e)
        })?;
        let claims = data.claims;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Malformed)?;
        let token_id = Uuid::parse_str(&claims.jti).map_err(|_| TokenError::Malformed)?;
        let issued_at = timestamp(claims.iat)?;
        let expires_at = timestamp(claims.exp)?;

        Ok(SessionClaims {
            user_id,
            token_id,
            issued_at,
            expires_at,
            grade: if claims.tmp {
                TokenGrade::Temporary
            } else {
                TokenGrade::Full
            },
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, TokenError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(TokenError::Malformed)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-signing-secret-at-least-32-bytes!!";

    fn test_issuer() -> TokenIssuer {
        TokenIssuer::new(
            &SecretString::from(TEST_SECRET.to_string()),
            TokenLifetimes::default(),
        )
        .expect("test secret is long enough")
    }

    #[test]
    fn test_rejects_short_secret() {
        let result = TokenIssuer::new(
            &SecretString::from("too-short".to_string()),
            TokenLifetimes::default(),
        );
        assert_eq!(result.unwrap_err(), TokenError::WeakSecret);
    }

    #[test]
    fn test_full_token_roundtrip() {
        let issuer = test_issuer();
        let user_id = Uuid::new_v4();

        let issued = issuer.issue_full(user_id).expect("issue");
        assert_eq!(issued.token.matches('.').count(), 2);
        assert_eq!(issued.expires_in, 72 * 3600);

        let claims = issuer.validate(&issued.token).expect("valid");
        assert_eq!(claims.user_id, user_id);
        assert_eq!(claims.grade, TokenGrade::Full);
        assert_eq!(claims.expires_at - claims.issued_at, Duration::hours(72));
    }

    #[test]
    fn test_temporary_token_is_flagged() {
        let issuer = test_issuer();
        let issued = issuer.issue_temporary(Uuid::new_v4()).expect("issue");
        assert_eq!(issued.expires_in, 300);

        let claims = issuer.validate(&issued.token).expect("valid");
        assert!(claims.is_temporary());
        assert_eq!(claims.expires_at - claims.issued_at, Duration::minutes(5));
    }

    #[test]
    fn test_expired_token() {
        let issuer = test_issuer();
        let issued = issuer
            .issue_at(
                Uuid::new_v4(),
                TokenGrade::Temporary,
                Utc::now() - Duration::minutes(10),
            )
            .expect("issue");

        assert_eq!(issuer.validate(&issued.token), Err(TokenError::Expired));
    }

    #[test]
    fn test_signature_from_other_key() {
        let issuer = test_issuer();
        let other = TokenIssuer::new(
            &SecretString::from("another-secret-that-is-long-enough-too".to_string()),
            TokenLifetimes::default(),
        )
        .expect("issuer");

        let foreign = other.issue_full(Uuid::new_v4()).expect("issue");
        assert_eq!(
            issuer.validate(&foreign.token),
            Err(TokenError::SignatureInvalid)
        );
    }

    #[test]
    fn test_malformed_token() {
        let issuer = test_issuer();
        assert_eq!(issuer.validate("not-a-jwt"), Err(TokenError::Malformed));
        assert_eq!(issuer.validate(""), Err(TokenError::Malformed));
    }

    #[test]
    fn test_token_ids_are_unique() {
        let issuer = test_issuer();
        let user_id = Uuid::new_v4();
        let a = issuer.validate(&issuer.issue_full(user_id).unwrap().token).unwrap();
        let b = issuer.validate(&issuer.issue_full(user_id).unwrap().token).unwrap();
        assert_ne!(a.token_id, b.token_id);
    }
}
