//! Authorization header parsing shared by the emulators.
//!
//! None of the emulators verify passwords. Basic credentials are always
//! accepted; bearer tokens are checked against an allow-list only where the
//! emulated tool does so.

use axum::http::{header, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Credentials presented in an `Authorization` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    /// `Basic <base64(user:password)>`; username is empty if the payload
    /// does not decode
    Basic { username: String },
    /// `Bearer <token>`
    Bearer(String),
}

impl Credentials {
    pub fn is_basic(&self) -> bool {
        matches!(self, Credentials::Basic { .. })
    }

    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Credentials::Bearer(token) => Some(token),
            Credentials::Basic { .. } => None,
        }
    }
}

/// Extract credentials from the request headers.
///
/// Returns `None` for a missing header or an unrecognised scheme.
pub fn credentials(headers: &HeaderMap) -> Option<Credentials> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();

    if let Some(encoded) = strip_scheme(value, "Basic") {
        let username = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .map(|pair| pair.split(':').next().unwrap_or_default().to_string())
            .unwrap_or_default();
        return Some(Credentials::Basic { username });
    }

    strip_scheme(value, "Bearer")
        .filter(|token| !token.is_empty())
        .map(|token| Credentials::Bearer(token.to_string()))
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> Option<&'a str> {
    let (head, rest) = value.split_once(' ')?;
    head.eq_ignore_ascii_case(scheme).then(|| rest.trim())
}
