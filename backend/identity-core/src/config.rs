//! Configuration management for the identity core
//!
//! Loads settings from environment variables, with a `.env` file picked up
//! in debug builds for local development.
//!
//! # Example
//!
//! ```no_run
//! use identity_core::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Listening on {}:{}", settings.server.host, settings.server.port);
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use crypto_core::MIN_SECRET_LENGTH;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Application settings
#[derive(Debug)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub jwt: JwtSettings,
    pub otp: OtpSettings,
    pub totp: TotpSettings,
    pub authz: AuthzSettings,
    pub sms: SmsSettings,
    pub server: ServerSettings,
}

impl Settings {
    /// Load settings from environment variables (.env in development)
    pub fn load() -> Result<Self> {
        if cfg!(debug_assertions) {
            dotenvy::dotenv().ok();
            info!("Loaded .env file for development");
        }

        Ok(Settings {
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            otp: OtpSettings::from_env()?,
            totp: TotpSettings::from_env(),
            authz: AuthzSettings::from_env()?,
            sms: SmsSettings::from_env()?,
            server: ServerSettings::from_env()?,
        })
    }
}

fn parse_or<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}

fn preset_timeout_ms(preset: &resilience::ServiceConfig) -> String {
    preset.timeout.duration.as_millis().to_string()
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: u64,
}

impl DatabaseSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            max_connections: parse_or("DATABASE_MAX_CONNECTIONS", "20")?,
            acquire_timeout: parse_or("DATABASE_ACQUIRE_TIMEOUT", "5")?,
        })
    }
}

/// Redis (challenge store) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisSettings {
    pub url: String,
}

impl RedisSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            url: env::var("REDIS_URL").context("REDIS_URL must be set")?,
        })
    }
}

/// Session token settings
///
/// The secret is loaded once here and handed to the token issuer at startup.
#[derive(Debug)]
pub struct JwtSettings {
    pub secret: SecretString,
    pub full_ttl_hours: i64,
    pub temporary_ttl_secs: i64,
}

impl JwtSettings {
    pub fn from_env() -> Result<Self> {
        let secret = SecretString::from(env::var("JWT_SECRET").context("JWT_SECRET must be set")?);
        if secret.expose_secret().len() < MIN_SECRET_LENGTH {
            bail!("JWT_SECRET must be at least {} bytes", MIN_SECRET_LENGTH);
        }

        Ok(Self {
            secret,
            full_ttl_hours: parse_or("JWT_FULL_TTL_HOURS", "72")?,
            temporary_ttl_secs: parse_or("JWT_TEMPORARY_TTL_SECS", "300")?,
        })
    }

    pub fn lifetimes(&self) -> crypto_core::TokenLifetimes {
        crypto_core::TokenLifetimes {
            full: chrono::Duration::hours(self.full_ttl_hours),
            temporary: chrono::Duration::seconds(self.temporary_ttl_secs),
        }
    }
}

/// OTP challenge settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpSettings {
    pub ttl_secs: u64,
    pub store_timeout_ms: u64,
}

impl OtpSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            ttl_secs: parse_or("OTP_TTL_SECS", "300")?,
            store_timeout_ms: parse_or(
                "OTP_STORE_TIMEOUT_MS",
                &preset_timeout_ms(&resilience::challenge_store_config()),
            )?,
        })
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for OtpSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            store_timeout_ms: resilience::challenge_store_config()
                .timeout
                .duration
                .as_millis() as u64,
        }
    }
}

/// TOTP provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotpSettings {
    pub issuer: String,
}

impl TotpSettings {
    fn from_env() -> Self {
        Self {
            issuer: env::var("TOTP_ISSUER").unwrap_or_else(|_| "Identity".to_string()),
        }
    }
}

/// Authorization engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzSettings {
    pub store_timeout_ms: u64,
}

impl AuthzSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            store_timeout_ms: parse_or(
                "AUTHZ_STORE_TIMEOUT_MS",
                &preset_timeout_ms(&resilience::identity_store_config()),
            )?,
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

/// SMS gateway settings
///
/// When `api_url` is unset the service logs OTP codes instead of sending them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsSettings {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub template_id: Option<String>,
    pub timeout_secs: u64,
    pub breaker_failure_threshold: u32,
    pub breaker_reset_secs: u64,
}

impl SmsSettings {
    fn from_env() -> Result<Self> {
        let settings = Self {
            api_url: optional("SMS_API_URL"),
            api_key: optional("SMS_API_KEY"),
            template_id: optional("SMS_TEMPLATE_ID"),
            timeout_secs: parse_or("SMS_TIMEOUT_SECS", "10")?,
            breaker_failure_threshold: parse_or("SMS_BREAKER_FAILURE_THRESHOLD", "5")?,
            breaker_reset_secs: parse_or("SMS_BREAKER_RESET_SECS", "30")?,
        };

        if settings.api_url.is_some() && settings.api_key.is_none() {
            bail!("SMS_API_KEY must be set when SMS_API_URL is configured");
        }
        if settings.api_url.is_none() {
            warn!("SMS_API_URL not set - OTP codes will be logged instead of delivered");
        }

        Ok(settings)
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("SERVER_PORT", "8080")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_jwt_settings_from_env() {
        env::set_var("JWT_SECRET", "0123456789abcdef0123456789abcdef");
        env::set_var("JWT_FULL_TTL_HOURS", "24");
        env::remove_var("JWT_TEMPORARY_TTL_SECS");

        let settings = JwtSettings::from_env().unwrap();
        assert_eq!(settings.full_ttl_hours, 24);
        assert_eq!(settings.temporary_ttl_secs, 300);
        assert_eq!(settings.lifetimes().full, chrono::Duration::hours(24));

        env::remove_var("JWT_SECRET");
        env::remove_var("JWT_FULL_TTL_HOURS");
    }

    #[test]
    #[serial]
    fn test_jwt_settings_reject_short_secret() {
        env::set_var("JWT_SECRET", "short");
        assert!(JwtSettings::from_env().is_err());
        env::remove_var("JWT_SECRET");
    }

    #[test]
    #[serial]
    fn test_jwt_settings_require_secret() {
        env::remove_var("JWT_SECRET");
        let err = JwtSettings::from_env().unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    #[serial]
    fn test_otp_settings_defaults() {
        env::remove_var("OTP_TTL_SECS");
        env::remove_var("OTP_STORE_TIMEOUT_MS");

        let settings = OtpSettings::from_env().unwrap();
        assert_eq!(settings.ttl(), Duration::from_secs(300));
        assert_eq!(settings.store_timeout(), Duration::from_secs(2));
    }

    #[test]
    #[serial]
    fn test_invalid_number_names_variable() {
        env::set_var("OTP_TTL_SECS", "five minutes");
        let err = OtpSettings::from_env().unwrap_err();
        assert!(err.to_string().contains("OTP_TTL_SECS"));
        env::remove_var("OTP_TTL_SECS");
    }

    #[test]
    #[serial]
    fn test_sms_settings_require_key_with_url() {
        env::set_var("SMS_API_URL", "https://sms.example.com/send");
        env::remove_var("SMS_API_KEY");
        assert!(SmsSettings::from_env().is_err());

        env::set_var("SMS_API_KEY", "key");
        let settings = SmsSettings::from_env().unwrap();
        assert_eq!(settings.breaker_failure_threshold, 5);

        env::remove_var("SMS_API_URL");
        env::remove_var("SMS_API_KEY");
    }
}
