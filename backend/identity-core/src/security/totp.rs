/// Two-Factor Authentication (2FA) using TOTP (Time-based One-Time Password)
///
/// - Secret: 20 random bytes, base-32 (RFC 4648, unpadded)
/// - Algorithm: TOTP-SHA1, 6 digits, 30 second step
/// - Skew: the previous and next step are accepted
use crate::error::{IdentityError, Result};
use crate::validators::{validate_code, CODE_LENGTH};
use base32::Alphabet;
use crypto_core::hash::sha256_hex;
use image::{ImageFormat, Luma};
use qrcode::QrCode;
use rand::{rngs::OsRng, RngCore};
use std::collections::HashSet;
use std::fmt;
use std::io::Cursor;
use std::time::{SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;
use totp_lite::{totp_custom, Sha1};

const SECRET_LENGTH: usize = 20;
const TOTP_STEP_SECS: u64 = 30;
const SKEW_STEPS: u64 = 1;
const QR_MIN_DIMENSION: u32 = 200;

/// Backup codes issued when 2FA is enabled
pub const BACKUP_CODE_COUNT: usize = 10;
const BACKUP_CODE_BYTES: usize = 5;

const BASE32: Alphabet = Alphabet::Rfc4648 { padding: false };

/// Output of a TOTP enrollment
pub struct TotpEnrollment {
    pub secret: String,
    pub provisioning_uri: String,
    /// PNG image encoding `provisioning_uri`
    pub qr_png: Vec<u8>,
}

impl fmt::Debug for TotpEnrollment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TotpEnrollment")
            .field("secret", &"[REDACTED]")
            .field("qr_png_bytes", &self.qr_png.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct TotpGenerator {
    issuer: String,
}

impl TotpGenerator {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Generate a fresh secret, its provisioning URI and a scannable QR image
    ///
    /// ## Arguments
    ///
    /// * `account` - Label shown in the authenticator app (email or phone)
    pub fn enroll(&self, account: &str) -> Result<TotpEnrollment> {
        let secret = Self::generate_secret();
        let provisioning_uri = self.provisioning_uri(&secret, account);
        let qr_png = Self::render_qr_png(&provisioning_uri)?;

        Ok(TotpEnrollment {
            secret,
            provisioning_uri,
            qr_png,
        })
    }

    pub fn generate_secret() -> String {
        let mut secret_bytes = [0u8; SECRET_LENGTH];
        OsRng.fill_bytes(&mut secret_bytes);
        base32::encode(BASE32, &secret_bytes)
    }

    /// Format: otpauth://totp/Issuer:Account?secret=SECRET&issuer=Issuer&...
    pub fn provisioning_uri(&self, secret: &str, account: &str) -> String {
        let issuer = urlencoding::encode(&self.issuer);
        format!(
            "otpauth://totp/{}:{}?secret={}&issuer={}&algorithm=SHA1&digits={}&period={}",
            issuer,
            urlencoding::encode(account),
            secret,
            issuer,
            CODE_LENGTH,
            TOTP_STEP_SECS
        )
    }

    pub fn render_qr_png(data: &str) -> Result<Vec<u8>> {
        let code = QrCode::new(data.as_bytes())
            .map_err(|e| IdentityError::Internal(format!("Failed to build QR code: {}", e)))?;

        let image = code
            .render::<Luma<u8>>()
            .min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
            .build();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| IdentityError::Internal(format!("Failed to encode QR image: {}", e)))?;

        Ok(png)
    }

    /// Verify a code against the current clock
    pub fn verify(secret: &str, code: &str) -> Result<bool> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| IdentityError::Internal("System clock before UNIX epoch".to_string()))?
            .as_secs();

        Self::verify_at(secret, code, now)
    }

    /// Verify a code at `unix_secs`, tolerating one step of clock skew either way
    pub fn verify_at(secret: &str, code: &str, unix_secs: u64) -> Result<bool> {
        if !validate_code(code) {
            return Ok(false);
        }

        let key = decode_secret(secret)?;
        let skew = SKEW_STEPS * TOTP_STEP_SECS;
        let mut matched = false;

        let mut t = unix_secs.saturating_sub(skew);
        while t <= unix_secs + skew {
            let expected = totp_custom::<Sha1>(TOTP_STEP_SECS, CODE_LENGTH as u32, &key, t);
            // Evaluate every window so timing doesn't reveal which one matched
            matched |= bool::from(expected.as_bytes().ct_eq(code.as_bytes()));
            t += TOTP_STEP_SECS;
        }

        Ok(matched)
    }

    /// Code an authenticator would display at `unix_secs`
    pub fn code_at(secret: &str, unix_secs: u64) -> Result<String> {
        let key = decode_secret(secret)?;
        Ok(totp_custom::<Sha1>(
            TOTP_STEP_SECS,
            CODE_LENGTH as u32,
            &key,
            unix_secs,
        ))
    }

    /// Generate backup codes for account recovery
    ///
    /// Each code is 5 bytes of OS randomness, base-32 encoded to 8 characters.
    /// Codes within one set are distinct.
    pub fn generate_backup_codes() -> Vec<String> {
        let mut seen = HashSet::with_capacity(BACKUP_CODE_COUNT);
        let mut codes = Vec::with_capacity(BACKUP_CODE_COUNT);

        while codes.len() < BACKUP_CODE_COUNT {
            let mut bytes = [0u8; BACKUP_CODE_BYTES];
            OsRng.fill_bytes(&mut bytes);
            let code = base32::encode(BASE32, &bytes);
            if seen.insert(code.clone()) {
                codes.push(code);
            }
        }

        codes
    }

    /// At-rest digest of a backup code (input is trimmed and upper-cased)
    pub fn hash_backup_code(code: &str) -> String {
        sha256_hex(&code.trim().to_ascii_uppercase())
    }
}

fn decode_secret(secret: &str) -> Result<Vec<u8>> {
    base32::decode(BASE32, secret)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| IdentityError::Internal("Stored TOTP secret is not valid base32".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 6238 test secret "12345678901234567890"
    const RFC_SECRET: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";

    #[test]
    fn test_generate_secret_is_base32_20_bytes() {
        let secret = TotpGenerator::generate_secret();
        assert_eq!(secret.len(), 32);
        let decoded = base32::decode(BASE32, &secret).expect("valid base32");
        assert_eq!(decoded.len(), SECRET_LENGTH);
    }

    #[test]
    fn test_provisioning_uri() {
        let generator = TotpGenerator::new("Acme Identity");
        let uri = generator.provisioning_uri("JBSWY3DPEHPK3PXP", "test@example.com");

        assert!(uri.starts_with("otpauth://totp/Acme%20Identity:test%40example.com?"));
        assert!(uri.contains("secret=JBSWY3DPEHPK3PXP"));
        assert!(uri.contains("issuer=Acme%20Identity"));
        assert!(uri.contains("digits=6"));
        assert!(uri.contains("period=30"));
    }

    #[test]
    fn test_enroll_produces_png() {
        let enrollment = TotpGenerator::new("Identity")
            .enroll("09123456789")
            .expect("enroll");

        assert_eq!(&enrollment.qr_png[..8], b"\x89PNG\r\n\x1a\n");
        assert!(enrollment.provisioning_uri.contains(&enrollment.secret));
    }

    #[test]
    fn test_enrollment_debug_hides_secret() {
        let enrollment = TotpGenerator::new("Identity")
            .enroll("09123456789")
            .expect("enroll");

        let rendered = format!("{:?}", enrollment);
        assert!(!rendered.contains(&enrollment.secret));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_rfc6238_vector() {
        // RFC 6238 Appendix B, SHA1, T = 59 -> 94287082 (8 digits); 6-digit suffix
        assert_eq!(TotpGenerator::code_at(RFC_SECRET, 59).unwrap(), "287082");
        assert!(TotpGenerator::verify_at(RFC_SECRET, "287082", 59).unwrap());
    }

    #[test]
    fn test_verify_accepts_adjacent_steps_only() {
        let now = 1_700_000_000;
        let previous = TotpGenerator::code_at(RFC_SECRET, now - 30).unwrap();
        let next = TotpGenerator::code_at(RFC_SECRET, now + 30).unwrap();
        let stale = TotpGenerator::code_at(RFC_SECRET, now - 90).unwrap();
        let current = TotpGenerator::code_at(RFC_SECRET, now).unwrap();

        assert!(TotpGenerator::verify_at(RFC_SECRET, &previous, now).unwrap());
        assert!(TotpGenerator::verify_at(RFC_SECRET, &next, now).unwrap());
        if stale != previous && stale != current && stale != next {
            assert!(!TotpGenerator::verify_at(RFC_SECRET, &stale, now).unwrap());
        }
    }

    #[test]
    fn test_verify_rejects_bad_format() {
        assert!(!TotpGenerator::verify_at(RFC_SECRET, "12345", 59).unwrap());
        assert!(!TotpGenerator::verify_at(RFC_SECRET, "2870821", 59).unwrap());
        assert!(!TotpGenerator::verify_at(RFC_SECRET, "28708a", 59).unwrap());
    }

    #[test]
    fn test_verify_invalid_secret() {
        assert!(TotpGenerator::verify_at("not base32!", "123456", 59).is_err());
    }

    #[test]
    fn test_generate_backup_codes() {
        let codes = TotpGenerator::generate_backup_codes();
        assert_eq!(codes.len(), BACKUP_CODE_COUNT);

        let unique: HashSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), BACKUP_CODE_COUNT);

        for code in &codes {
            assert_eq!(code.len(), 8);
            assert!(code
                .chars()
                .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
        }
    }

    #[test]
    fn test_backup_codes_unique_across_large_sample() {
        let mut all = HashSet::new();
        for _ in 0..200 {
            for code in TotpGenerator::generate_backup_codes() {
                assert!(all.insert(code));
            }
        }
    }

    #[test]
    fn test_hash_backup_code_normalizes() {
        assert_eq!(
            TotpGenerator::hash_backup_code(" abcd2345 "),
            TotpGenerator::hash_backup_code("ABCD2345")
        );
    }
}
