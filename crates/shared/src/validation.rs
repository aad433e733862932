//! Credential rules shared by the login form and the auth backend.

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

pub const PASSWORD_MIN_CHARS: usize = 8;
pub const PASSWORD_MAX_CHARS: usize = 16;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("email is required")]
    EmailRequired,
    #[error("enter a valid email address")]
    EmailFormat,
    #[error("password is required")]
    PasswordRequired,
    #[error("password must be at least {PASSWORD_MIN_CHARS} characters")]
    PasswordTooShort,
    #[error("password must be at most {PASSWORD_MAX_CHARS} characters")]
    PasswordTooLong,
    #[error("passwords do not match")]
    PasswordMismatch,
}

fn email_regex() -> Option<&'static Regex> {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).ok()).as_ref()
}

pub fn validate_email(email: &str) -> Result<(), FieldError> {
    if email.is_empty() {
        return Err(FieldError::EmailRequired);
    }
    if !email_regex().is_some_and(|re| re.is_match(email)) {
        return Err(FieldError::EmailFormat);
    }
    Ok(())
}

/// Length is counted in chars so multi-byte passwords are not penalized.
pub fn validate_password(password: &str) -> Result<(), FieldError> {
    let len = password.chars().count();
    if len == 0 {
        return Err(FieldError::PasswordRequired);
    }
    if len < PASSWORD_MIN_CHARS {
        return Err(FieldError::PasswordTooShort);
    }
    if len > PASSWORD_MAX_CHARS {
        return Err(FieldError::PasswordTooLong);
    }
    Ok(())
}

pub fn validate_password_check(password: &str, password_check: &str) -> Result<(), FieldError> {
    if password != password_check {
        return Err(FieldError::PasswordMismatch);
    }
    Ok(())
}
