/// Identity Core Library
///
/// Phone OTP login, TOTP second factor, two-grade session tokens and
/// role/permission authorization.
///
/// ## Modules
///
/// - `adapters`: Redis challenge store, SMS gateways, in-memory collaborators
/// - `config`: Service configuration
/// - `db`: PostgreSQL identity store (users, roles, permissions)
/// - `error`: Error types
/// - `gate`: Request Gate (authentication + authorization per request)
/// - `http`: axum routes over the core
/// - `models`: Data models
/// - `ports`: Collaborator traits
/// - `security`: TOTP secrets, QR provisioning, backup codes
/// - `services`: OTP, second factor, login orchestration, authorization
/// - `validators`: Input validation
pub mod adapters;
pub mod config;
pub mod db;
pub mod error;
pub mod gate;
pub mod http;
pub mod models;
pub mod ports;
pub mod security;
pub mod services;
pub mod validators;

// Re-export commonly used types
pub use crypto_core::{IssuedToken, SessionClaims, TokenGrade, TokenIssuer, TokenLifetimes};
pub use error::{IdentityError, Result};
pub use gate::{RequestGate, Requirement};
