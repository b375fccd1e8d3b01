//! Model provider registry errors.

use crate::auth::AuthError;
use crate::error::{ApiError, StoreError};
use crate::types::ProviderId;
use std::fmt;

#[derive(Debug)]
pub enum RegistryError {
    /// The provider API rejected the credential.
    InvalidToken(ProviderId),
    /// A manual source was saved without a token.
    MissingToken(ProviderId),
    /// The request is structurally wrong (e.g. oauth source carrying a token).
    Invalid(String),
    NotConfigured(ProviderId),
    UnknownModel(String),
    Auth(AuthError),
    Api(ApiError),
    Store(StoreError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidToken(provider) => write!(f, "{provider} rejected the token"),
            Self::MissingToken(provider) => write!(f, "an API key is required for {provider}"),
            Self::Invalid(msg) => write!(f, "{msg}"),
            Self::NotConfigured(provider) => write!(f, "{provider} is not configured"),
            Self::UnknownModel(id) => write!(f, "unknown model `{id}`"),
            Self::Auth(err) => write!(f, "{err}"),
            Self::Api(err) => write!(f, "model API: {err}"),
            Self::Store(err) => write!(f, "model provider store: {err}"),
        }
    }
}

impl std::error::Error for RegistryError {}

impl From<AuthError> for RegistryError {
    fn from(value: AuthError) -> Self {
        Self::Auth(value)
    }
}

impl From<ApiError> for RegistryError {
    fn from(value: ApiError) -> Self {
        Self::Api(value)
    }
}

impl From<StoreError> for RegistryError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}
