//! Auth subsystem error definitions.

use crate::error::StoreError;
use crate::types::ProviderId;
use std::fmt;

/// Errors surfaced by OAuth adapters and the OAuth manager.
#[derive(Debug)]
pub enum AuthError {
    /// Interactive authorization did not complete (denied, cancelled, timed out).
    AuthFailed(String),
    /// The refresh token was rejected; the user must link again.
    RefreshFailed(String),
    NotLinked(ProviderId),
    Http(reqwest::Error),
    Status(u16, String),
    Invalid(String),
    Store(StoreError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthFailed(msg) => write!(f, "authorization failed: {msg}"),
            Self::RefreshFailed(msg) => {
                write!(f, "token refresh failed, link the provider again: {msg}")
            }
            Self::NotLinked(provider) => write!(f, "{provider} is not linked"),
            Self::Http(err) => write!(f, "http: {err}"),
            Self::Status(code, body) => write!(f, "status {code}: {body}"),
            Self::Invalid(msg) => write!(f, "{msg}"),
            Self::Store(err) => write!(f, "credential store: {err}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<reqwest::Error> for AuthError {
    fn from(value: reqwest::Error) -> Self {
        Self::Http(value)
    }
}

impl From<StoreError> for AuthError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
