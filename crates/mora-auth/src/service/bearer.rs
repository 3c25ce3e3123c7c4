// Bearer credential helpers shared by HTTP adapters
// Adapters strip the transport prefix here and map failures to their own unauthorized response

use crate::model::{TOKEN_PREFIX, TokenError};

/// Why no credential could be taken from the request
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("missing authorization header")]
    MissingHeader,

    #[error("invalid authorization header format")]
    InvalidFormat,

    #[error("missing token")]
    MissingToken,
}

/// Extract the raw token from an `Authorization: Bearer <token>` header value.
pub fn extract_bearer(header: Option<&str>) -> Result<&str, CredentialError> {
    let header = match header {
        Some(h) if !h.is_empty() => h,
        _ => return Err(CredentialError::MissingHeader),
    };

    let token = header
        .strip_prefix(TOKEN_PREFIX)
        .ok_or(CredentialError::InvalidFormat)?
        .trim();

    if token.is_empty() {
        return Err(CredentialError::MissingToken);
    }

    Ok(token)
}

/// Message an adapter returns alongside its unauthorized status
pub fn unauthorized_message(err: &TokenError) -> &'static str {
    match err {
        TokenError::ExpiredToken => "token expired",
        TokenError::MalformedToken => "malformed token",
        TokenError::InvalidToken | TokenError::Signing(_) => "invalid token",
    }
}

/// Request paths that bypass authentication.
///
/// Entries match exactly, or by prefix when they end in `/*`.
#[derive(Debug, Clone, Default)]
pub struct SkipPaths {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl SkipPaths {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut skip = Self::default();
        for path in paths {
            let path = path.as_ref();
            match path.strip_suffix("/*") {
                Some(prefix) => skip.prefixes.push(prefix.to_string()),
                None => skip.exact.push(path.to_string()),
            }
        }
        skip
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.iter().any(|p| p == path)
            || self.prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefixes.is_empty()
    }
}
