use once_cell::sync::Lazy;
use regex::Regex;

/// Input validation utilities for the OTP and 2FA flows

// Hardcoded pattern, a compile-time constant in practice
static PHONE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^09[0-9]{9}$").expect("hardcoded phone regex is invalid - fix source code")
});

/// Length of OTP and TOTP codes
pub const CODE_LENGTH: usize = 6;

/// Validate mobile number format: 11 ASCII digits starting with `09`
pub fn validate_phone(phone: &str) -> bool {
    PHONE_REGEX.is_match(phone)
}

/// Validate a 6-digit numeric code (no normalization: whitespace fails)
pub fn validate_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

/// Mask phone number for logging (show only last 4 digits)
pub fn mask_phone(phone: &str) -> String {
    if phone.len() <= 4 || !phone.is_ascii() {
        return "****".to_string();
    }
    format!("****{}", &phone[phone.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_phone() {
        assert!(validate_phone("09123456789"));
        assert!(!validate_phone("0912345678")); // too short
        assert!(!validate_phone("091234567890")); // too long
        assert!(!validate_phone("08123456789"));
        assert!(!validate_phone("+989123456789"));
        assert!(!validate_phone("0912345678a"));
        assert!(!validate_phone(""));
        // Persian and Arabic-Indic digits would alias an ASCII number
        assert!(!validate_phone("09۱۲۳۴۵۶۷۸۹"));
        assert!(!validate_phone("09١٢٣٤٥٦٧٨٩"));
    }

    #[test]
    fn test_validate_code() {
        assert!(validate_code("000000"));
        assert!(validate_code("123456"));
        assert!(!validate_code("12345"));
        assert!(!validate_code("1234567"));
        assert!(!validate_code("12345a"));
        assert!(!validate_code(" 12345"));
        // Non-ASCII digits are not accepted
        assert!(!validate_code("١٢٣٤٥٦"));
    }

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("09123456789"), "****6789");
        assert_eq!(mask_phone("123"), "****");
    }
}
