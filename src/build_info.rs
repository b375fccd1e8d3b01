//! Build stamps baked in by `build.rs`.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const GIT_COMMIT: &str = env!("CHATBRIDGE_BUILD_GIT_HASH");
pub const BUILD_TIMESTAMP: &str = env!("CHATBRIDGE_BUILD_TIMESTAMP");

/// Appended to `chatbridge --help`.
pub const HELP_BUILD_METADATA: &str = concat!(
    "Build: commit ",
    env!("CHATBRIDGE_BUILD_GIT_HASH"),
    ", built ",
    env!("CHATBRIDGE_BUILD_TIMESTAMP")
);

/// User-Agent for provider and identity requests.
pub fn user_agent() -> String {
    format!("chatbridge/{VERSION}")
}

/// One-line identity shown by `chatbridge status` and logged at serve start.
pub fn banner() -> String {
    format!("chatbridge {VERSION} ({GIT_COMMIT}, {BUILD_TIMESTAMP})")
}
