use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{AppError, AppResult};

/// Shape check run before input reaches a service.
pub trait Validate {
    fn validate(&self) -> AppResult<()>;
}

pub fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trim and lower-case an email before it is stored or looked up.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn max_len(field: &str, value: &str, max: usize) -> AppResult<()> {
    if value.chars().count() > max {
        return Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

pub fn require_non_empty(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::validation(format!("{field} is required")));
    }
    Ok(())
}

pub fn require_email(field: &str, value: &str) -> AppResult<()> {
    max_len(field, value, 255)?;
    if !is_valid_email(value) {
        return Err(AppError::validation("Invalid email"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("a@b.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        assert_eq!(normalize_email("  A@B.Com "), "a@b.com");
    }

    #[test]
    fn length_limits_count_chars() {
        assert!(max_len("name", &"é".repeat(255), 255).is_ok());
        assert!(max_len("name", &"é".repeat(256), 255).is_err());
        assert!(require_non_empty("password", "   ").is_err());
    }
}
