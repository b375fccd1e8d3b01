//! Unified error types for the bridge subsystems.
//!
//! Auth errors live in `auth::error` next to the adapters that raise them.

use std::fmt;

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// Errors arising from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// The model supplied input the tool couldn't parse.
    InvalidArguments(String),
    /// The tool ran but encountered a failure.
    ExecutionFailed(String),
    /// No tool with this name exists in the merged catalog.
    UnknownTool(String),
    /// The tool is present but disabled by settings or the session allowlist.
    Disabled(String),
    /// The owning request was cancelled while the tool ran.
    Cancelled,
    /// The handler ignored its abort signal past the grace period.
    TimedOut,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            Self::ExecutionFailed(msg) => write!(f, "execution failed: {msg}"),
            Self::UnknownTool(name) => write!(f, "unknown tool: {name}"),
            Self::Disabled(name) => write!(f, "tool is disabled: {name}"),
            Self::Cancelled => write!(f, "operation cancelled by user"),
            Self::TimedOut => write!(f, "tool did not stop after cancellation"),
        }
    }
}

impl std::error::Error for ToolError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

/// Errors from the JSON document store.
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
    /// The caller tried to persist a document that violates its schema.
    ///
    /// This is a programmer error: UI-facing code only ever builds valid shapes.
    Schema { document: &'static str, reason: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Serialize(e) => write!(f, "serialize: {e}"),
            Self::Schema { document, reason } => {
                write!(f, "refusing to save invalid {document}: {reason}")
            }
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e)
    }
}

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Errors from the model provider transport.
#[derive(Debug)]
pub enum ApiError {
    /// Network / reqwest-level error.
    Http(reqwest::Error),
    /// Non-2xx status from the API.
    Status(u16, String),
    /// Response body could not be decoded into the expected shape.
    InvalidResponse(String),
    /// The caller asked for a provider this build does not speak.
    Unsupported(String),
}

impl ApiError {
    /// HTTP status code when the provider answered with a non-2xx response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status(code, _) => Some(*code),
            _ => None,
        }
    }

    /// True when the provider rejected the presented credential.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self.status_code(), Some(401 | 403))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "http: {e}"),
            Self::Status(code, body) => write!(f, "status {code}: {body}"),
            Self::InvalidResponse(msg) => write!(f, "invalid response: {msg}"),
            Self::Unsupported(msg) => write!(f, "unsupported provider: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// ChatError
// ---------------------------------------------------------------------------

/// Errors surfaced synchronously by the chat session controller.
///
/// Failures that happen after a turn has started are delivered as terminal
/// `error` events on the request channel instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// `configure` has not been called yet.
    NotConfigured,
    /// A request with this id is still in flight.
    DuplicateRequest(String),
    /// The session model does not resolve to an enabled provider model.
    NoModel(String),
    /// Credentials for the resolved provider could not be produced.
    Credentials(String),
    /// The model provider registry could not be read.
    Registry(String),
}

impl fmt::Display for ChatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured => write!(f, "chat session is not configured"),
            Self::DuplicateRequest(id) => write!(f, "request `{id}` is already in flight"),
            Self::NoModel(model) => write!(f, "model `{model}` is not available"),
            Self::Credentials(msg) => write!(f, "credentials unavailable: {msg}"),
            Self::Registry(msg) => write!(f, "model registry unavailable: {msg}"),
        }
    }
}

impl std::error::Error for ChatError {}

// ---------------------------------------------------------------------------
// BridgeError
// ---------------------------------------------------------------------------

/// Failure of one invoke-style call. Rendered as `{success: false, error}`.
#[derive(Debug)]
pub enum BridgeError {
    UnknownMethod(String),
    InvalidParams(String),
    Auth(crate::auth::AuthError),
    Registry(crate::models::RegistryError),
    Chat(ChatError),
    Api(ApiError),
    Store(StoreError),
}

impl BridgeError {
    /// Programmer errors on the UI side rather than user-facing failures.
    pub fn is_programmer_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownMethod(_)
                | Self::Api(ApiError::Unsupported(_))
                | Self::Store(StoreError::Schema { .. })
        )
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMethod(method) => write!(f, "unknown method `{method}`"),
            Self::InvalidParams(msg) => write!(f, "invalid params: {msg}"),
            Self::Auth(e) => write!(f, "{e}"),
            Self::Registry(e) => write!(f, "{e}"),
            Self::Chat(e) => write!(f, "{e}"),
            Self::Api(e) => write!(f, "{e}"),
            Self::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<crate::auth::AuthError> for BridgeError {
    fn from(e: crate::auth::AuthError) -> Self {
        Self::Auth(e)
    }
}

impl From<crate::models::RegistryError> for BridgeError {
    fn from(e: crate::models::RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<ChatError> for BridgeError {
    fn from(e: ChatError) -> Self {
        Self::Chat(e)
    }
}

impl From<ApiError> for BridgeError {
    fn from(e: ApiError) -> Self {
        Self::Api(e)
    }
}

impl From<StoreError> for BridgeError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
