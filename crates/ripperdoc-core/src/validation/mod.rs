//! Input validation and normalization for identity fields.

use thiserror::Error;
use unicode_normalization::UnicodeNormalization;
use validator::ValidateEmail;

/// Validation error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Input exceeds maximum allowed length.
    #[error("Input exceeds maximum length ({max} bytes, got {actual})")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual input length.
        actual: usize,
    },

    /// Input is shorter than required.
    #[error("Input is too short (minimum {min} characters)")]
    TooShort {
        /// Minimum required length.
        min: usize,
    },

    /// Not a syntactically valid email address.
    #[error("Invalid email address")]
    InvalidEmail,

    /// Disallowed characters in input.
    #[error("Disallowed characters in input")]
    DisallowedChars,
}

/// Size limits per input type.
pub mod limits {
    /// Maximum email length (RFC 5321 path limit).
    pub const MAX_EMAIL_LENGTH: usize = 254;

    /// Minimum password length.
    pub const MIN_PASSWORD_LENGTH: usize = 8;

    /// Maximum password length (bounds hashing cost).
    pub const MAX_PASSWORD_LENGTH: usize = 256;

    /// Maximum role name length.
    pub const MAX_ROLE_NAME_LENGTH: usize = 64;
}

/// Canonical form of an email: NFKC, trimmed, lowercased. No validation.
#[must_use]
pub fn canonical_email(input: &str) -> String {
    input.trim().nfkc().collect::<String>().trim().to_lowercase()
}

/// Normalize an email address for storage and lookup.
///
/// Trims surrounding whitespace, applies NFKC normalization and lowercases,
/// so `Admin@Shop.io` and `admin@shop.io` address the same account.
///
/// # Errors
///
/// Returns `ValidationError` if the address is too long or malformed.
pub fn normalize_email(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.len() > limits::MAX_EMAIL_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_EMAIL_LENGTH,
            actual: trimmed.len(),
        });
    }

    let normalized = canonical_email(trimmed);

    if normalized.chars().any(char::is_control) {
        return Err(ValidationError::DisallowedChars);
    }

    if !normalized.validate_email() {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(normalized)
}

/// Check a new password against length limits.
///
/// # Errors
///
/// Returns `ValidationError` if the password is too short or too long.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let chars = password.chars().count();
    if chars < limits::MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort {
            min: limits::MIN_PASSWORD_LENGTH,
        });
    }
    if password.len() > limits::MAX_PASSWORD_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_PASSWORD_LENGTH,
            actual: password.len(),
        });
    }
    Ok(())
}

/// Check a role name: non-empty, bounded, alphanumeric with `_` or `-`.
///
/// # Errors
///
/// Returns `ValidationError` on an invalid name.
pub fn validate_role_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::TooShort { min: 1 });
    }
    if name.len() > limits::MAX_ROLE_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            max: limits::MAX_ROLE_NAME_LENGTH,
            actual: name.len(),
        });
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ValidationError::DisallowedChars);
    }
    Ok(())
}
