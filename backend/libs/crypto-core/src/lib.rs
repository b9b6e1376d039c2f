//! Cryptographic primitives shared by the identity backend.
//!
//! - `jwt`: signed session tokens in two grades (full / temporary)
//! - `hash`: SHA-256 helpers used for at-rest digests (backup codes)
pub mod hash;
pub mod jwt;

pub use jwt::{
    IssuedToken, SessionClaims, TokenError, TokenGrade, TokenIssuer, TokenLifetimes,
    MIN_SECRET_LENGTH,
};
