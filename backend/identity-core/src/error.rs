use crate::ports::{GatewayError, StoreError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crypto_core::TokenError;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IdentityError>;

#[derive(Debug, Error)]
pub enum IdentityError {
    // Input errors
    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Verification code must be 6 digits")]
    InvalidCodeFormat,

    #[error("Validation error: {0}")]
    Validation(String),

    // State errors
    #[error("Verification code expired or not found")]
    ChallengeNotFound,

    #[error("Verification code does not match")]
    CodeMismatch,

    #[error("Invalid two FA code")]
    InvalidCode,

    #[error("Two FA is not enrolled")]
    TwoFactorNotEnrolled,

    #[error("Two FA is already enabled")]
    TwoFactorAlreadyEnabled,

    #[error("User not found")]
    UserNotFound,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    // Authentication / authorization
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Insufficient permissions")]
    Forbidden,

    #[error("Token is malformed")]
    TokenMalformed,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token signature is invalid")]
    TokenSignatureInvalid,

    // Dependency errors
    #[error("Notification delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IdentityError {
    /// Stable machine-readable code, safe to expose to clients
    pub fn code(&self) -> &'static str {
        match self {
            IdentityError::InvalidPhone(_) => "invalid_phone",
            IdentityError::InvalidCodeFormat => "invalid_code_format",
            IdentityError::Validation(_) => "validation_failed",
            IdentityError::ChallengeNotFound => "challenge_not_found",
            IdentityError::CodeMismatch => "code_mismatch",
            IdentityError::InvalidCode => "invalid_code",
            IdentityError::TwoFactorNotEnrolled => "two_factor_not_enrolled",
            IdentityError::TwoFactorAlreadyEnabled => "two_factor_already_enabled",
            IdentityError::UserNotFound => "user_not_found",
            IdentityError::NotFound(_) => "not_found",
            IdentityError::AlreadyExists(_) => "already_exists",
            IdentityError::Unauthenticated => "unauthenticated",
            IdentityError::Forbidden => "forbidden",
            IdentityError::TokenMalformed => "token_malformed",
            IdentityError::TokenExpired => "token_expired",
            IdentityError::TokenSignatureInvalid => "token_signature_invalid",
            IdentityError::DeliveryFailed(_) => "delivery_failed",
            IdentityError::StoreUnavailable(_) => "store_unavailable",
            IdentityError::Internal(_) => "internal_error",
        }
    }

    /// Dependency failures are retryable; everything else is definitive
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IdentityError::DeliveryFailed(_) | IdentityError::StoreUnavailable(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            IdentityError::InvalidPhone(_)
            | IdentityError::InvalidCodeFormat
            | IdentityError::Validation(_)
            | IdentityError::ChallengeNotFound
            | IdentityError::CodeMismatch
            | IdentityError::InvalidCode => StatusCode::BAD_REQUEST,
            IdentityError::TwoFactorNotEnrolled
            | IdentityError::TwoFactorAlreadyEnabled
            | IdentityError::AlreadyExists(_) => StatusCode::CONFLICT,
            IdentityError::UserNotFound | IdentityError::NotFound(_) => StatusCode::NOT_FOUND,
            IdentityError::Unauthenticated
            | IdentityError::TokenMalformed
            | IdentityError::TokenExpired
            | IdentityError::TokenSignatureInvalid => StatusCode::UNAUTHORIZED,
            IdentityError::Forbidden => StatusCode::FORBIDDEN,
            IdentityError::DeliveryFailed(_) | IdentityError::StoreUnavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            IdentityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for IdentityError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Don't leak dependency or internal details
        let message = if status.is_server_error() {
            match status {
                StatusCode::SERVICE_UNAVAILABLE => "Service temporarily unavailable".to_string(),
                _ => "Internal server error".to_string(),
            }
        } else {
            self.to_string()
        };

        let body = json!({
            "error": self.code(),
            "message": message,
            "retryable": self.is_retryable(),
        });

        (status, Json(body)).into_response()
    }
}

// Conversions from collaborator error types
impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => {
                tracing::error!("Store unavailable: {}", msg);
                IdentityError::StoreUnavailable(msg)
            }
            StoreError::Timeout(elapsed) => {
                tracing::error!("Store call timed out after {:?}", elapsed);
                IdentityError::StoreUnavailable(format!("timed out after {:?}", elapsed))
            }
            StoreError::Conflict(what) => IdentityError::AlreadyExists(what),
            StoreError::NotFound(what) => IdentityError::NotFound(what),
        }
    }
}

impl From<GatewayError> for IdentityError {
    fn from(err: GatewayError) -> Self {
        tracing::error!("Notification gateway error: {}", err);
        IdentityError::DeliveryFailed(err.to_string())
    }
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed => IdentityError::TokenMalformed,
            TokenError::Expired => IdentityError::TokenExpired,
            TokenError::SignatureInvalid => IdentityError::TokenSignatureInvalid,
            TokenError::WeakSecret | TokenError::Signing(_) => {
                tracing::error!("Token issuer error: {}", err);
                IdentityError::Internal(err.to_string())
            }
        }
    }
}
