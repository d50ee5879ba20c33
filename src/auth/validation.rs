//! Input validation for credentials.

use lazy_static::lazy_static;
use regex::Regex;

/// Shortest password accepted when one is set or changed
pub const MIN_PASSWORD_LENGTH: usize = 6;

lazy_static! {
    /// Address pattern accepted for credential records
    static ref EMAIL_REGEX: Regex = Regex::new(
        r"(?-u)^\w+([.-]?\w+)*@\w+([.-]?\w+)*(\.\w{2,3})+$"
    ).unwrap();
}

/// Validate an email address
pub fn validate_email(email: &str) -> Result<(), String> {
    let email = email.trim();
    if email.is_empty() {
        return Err("Email is required".to_string());
    }

    if email.len() > 254 {
        return Err("Email is too long (max 254 characters)".to_string());
    }

    if !EMAIL_REGEX.is_match(email) {
        return Err("Please provide a valid email".to_string());
    }

    Ok(())
}

/// Validate a new password
pub fn validate_new_password(password: &str) -> Result<(), String> {
    if password.is_empty() {
        return Err("Password is required".to_string());
    }

    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(validate_email("a@b.com").is_ok());
        assert!(validate_email("admin@webtech-jcc.com").is_ok());
        assert!(validate_email("first.last@shop.co.uk").is_ok());
        assert!(validate_email("  padded@example.org ").is_ok());
    }

    #[test]
    fn test_invalid_emails() {
        assert!(validate_email("").is_err());
        assert!(validate_email("no-at-sign.com").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@b.toolong").is_err());
        assert!(validate_email("spaces in@b.com").is_err());
    }

    #[test]
    fn test_email_word_characters_are_ascii() {
        assert!(validate_email("ü@b.com").is_err());
        assert!(validate_email("admin@shöp.com").is_err());
        assert!(validate_email("a_1@b-2.com").is_ok());
    }

    #[test]
    fn test_password_length() {
        assert!(validate_new_password("").is_err());
        assert!(validate_new_password("12345").is_err());
        assert!(validate_new_password("123456").is_ok());
        assert!(validate_new_password("pässwö").is_ok());
    }
}
