//! Token transport: `Authorization: Bearer` header or access-token cookie.

use axum::http::{HeaderMap, header};

use super::TokenRejection;
use super::config::AuthConfig;

/// Pull the raw token from a request.
///
/// A `Bearer` header wins over the cookie. Any other `Authorization`
/// scheme is ignored and the cookie is consulted instead.
///
/// # Errors
///
/// `Missing` if neither location carries a token, `Malformed` if the
/// bearer header is unreadable or empty.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Result<String, TokenRejection> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        let value = value.to_str().map_err(|_| TokenRejection::Malformed)?;
        if let Some(token) = strip_bearer(value) {
            let token = token.trim();
            if token.is_empty() {
                return Err(TokenRejection::Malformed);
            }
            return Ok(token.to_string());
        }
    }

    for value in headers.get_all(header::COOKIE) {
        let Ok(cookies) = value.to_str() else {
            continue;
        };
        let found = cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == cookie_name && !value.is_empty());
        if let Some((_, token)) = found {
            return Ok(token.to_string());
        }
    }

    Err(TokenRejection::Missing)
}

fn strip_bearer(value: &str) -> Option<&str> {
    let (scheme, rest) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then_some(rest)
}

/// `Set-Cookie` value carrying a freshly issued token.
#[must_use]
pub fn access_cookie(config: &AuthConfig, token: &str) -> String {
    format!(
        "{}={token}; HttpOnly; Path=/; Max-Age={}{}",
        config.cookie_name,
        config.max_age_secs(),
        same_site(config)
    )
}

/// `Set-Cookie` value that removes the access cookie.
#[must_use]
pub fn clear_cookie(config: &AuthConfig) -> String {
    format!(
        "{}=; HttpOnly; Path=/; Max-Age=0{}",
        config.cookie_name,
        same_site(config)
    )
}

const fn same_site(config: &AuthConfig) -> &'static str {
    if config.secure_cookies {
        "; SameSite=None; Secure"
    } else {
        "; SameSite=Lax"
    }
}
