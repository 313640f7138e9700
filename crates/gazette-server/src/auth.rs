//! Cookie session gate.
//!
//! Login sets `session=<username>`; every protected route extracts
//! [`CurrentUser`] from that cookie.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, HeaderMap, HeaderValue};

use crate::error::AppError;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub username: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        session_from_headers(&parts.headers)
            .map(|username| CurrentUser { username })
            .ok_or(AppError::Unauthorized)
    }
}

/// Find a non-empty `session` cookie in the request headers.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim_matches('"').to_string())
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value for a login.
///
/// Fails if `username` cannot be carried in a cookie value.
pub fn session_cookie(username: &str) -> Result<HeaderValue, AppError> {
    if username.is_empty() {
        return Err(AppError::BadRequest("username must not be empty".to_string()));
    }
    if !username.bytes().all(is_cookie_octet) {
        return Err(AppError::BadRequest(
            "username contains characters not allowed in a cookie".to_string(),
        ));
    }

    let cookie = format!("{SESSION_COOKIE}={username}; HttpOnly; SameSite=Lax; Path=/");
    HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(e.to_string()))
}

// RFC 6265 cookie-octet.
fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}
