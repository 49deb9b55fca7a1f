//! Secret values that must never reach logs.
//!
//! - `SecretValue`: wrapper around `secrecy::SecretBox` with redacted formatting
//! - `scrub_secrets`: redact secrets from diagnostic strings

use secrecy::{ExposeSecret, SecretBox};
use serde::{Deserialize, Deserializer};

/// A configuration secret (signing key, bootstrap password).
///
/// The inner value is wrapped with `secrecy::SecretBox` so it is zeroized
/// on drop and never shows up in `Debug` or `Display` output.
#[derive(Clone)]
pub struct SecretValue(SecretBox<str>);

impl SecretValue {
    /// Wrap a secret.
    #[must_use]
    pub fn new(value: String) -> Self {
        Self(SecretBox::new(value.into_boxed_str()))
    }

    /// Expose the secret.
    ///
    /// Use sparingly - only at the point the raw bytes are needed.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Whether the secret is empty or only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.expose().trim().is_empty()
    }

    /// Length of the secret in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.expose().len()
    }

    /// Whether the secret has zero length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self::new(value.to_string())
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SecretValue([REDACTED])")
    }
}

impl std::fmt::Display for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Scrub secrets from error messages and logs.
///
/// Replaces values after known secret patterns with `[REDACTED]`.
#[must_use]
pub fn scrub_secrets(text: &str, patterns: &[&str]) -> String {
    let mut result = text.to_string();

    for pattern in patterns {
        let mut search_start = 0;
        while let Some(start) = result[search_start..].find(pattern) {
            let abs_start = search_start + start + pattern.len();

            let end = result[abs_start..]
                .find(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '&' || c == ',' || c == ';')
                .map_or(result.len(), |e| abs_start + e);

            result.replace_range(abs_start..end, "[REDACTED]");

            search_start = abs_start + "[REDACTED]".len();
        }
    }

    result
}

/// Patterns that precede credentials in headers and query strings.
pub const COMMON_SECRET_PATTERNS: &[&str] = &[
    "token=",
    "secret=",
    "password=",
    "AccessToken=",
    "Authorization: Bearer ",
];

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_secret_redaction() {
        let secret = SecretValue::from("super-signing-key");

        assert_eq!(format!("{secret:?}"), "SecretValue([REDACTED])");
        assert_eq!(format!("{secret}"), "[REDACTED]");
        assert_eq!(secret.expose(), "super-signing-key");
    }

    #[test]
    fn test_blank_detection() {
        assert!(SecretValue::from("   ").is_blank());
        assert!(SecretValue::from("").is_empty());
        assert!(!SecretValue::from("x").is_blank());
    }

    #[test]
    fn test_deserialize_from_json_string() {
        let secret: SecretValue = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(secret.expose(), "abc");
        assert_eq!(secret.len(), 3);
    }

    #[test]
    fn test_scrub_cookie_and_bearer() {
        let text = "Cookie: AccessToken=eyJabc.def.ghi; theme=dark";
        assert_eq!(
            scrub_secrets(text, COMMON_SECRET_PATTERNS),
            "Cookie: AccessToken=[REDACTED]; theme=dark"
        );

        let header = "Authorization: Bearer eyJabc.def.ghi";
        assert_eq!(
            scrub_secrets(header, COMMON_SECRET_PATTERNS),
            "Authorization: Bearer [REDACTED]"
        );
    }
}
