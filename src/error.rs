//! Error types for postclaw.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    #[error("Heartbeat error: {0}")]
    Heartbeat(#[from] HeartbeatError),

    #[error("Core registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Core error: {0}")]
    Unit(#[from] UnitError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Content error: {0}")]
    Content(#[from] ContentError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Errors that abort agent startup. Any of these exits the process with
/// status 1.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("{0}")]
    Heartbeat(#[from] HeartbeatError),

    #[error("{0}")]
    Registry(#[from] RegistryError),

    #[error("Core {name} failed to initialize: {source}")]
    UnitInit {
        name: String,
        #[source]
        source: UnitError,
    },
}

/// Errors from the single-instance heartbeat lock.
#[derive(Debug, thiserror::Error)]
pub enum HeartbeatError {
    #[error("Another instance appears to be running (heartbeat file {path} exists)")]
    AlreadyRunning { path: PathBuf },

    #[error("Heartbeat file {path} is locked by another process")]
    Locked { path: PathBuf },

    #[error("Heartbeat I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors reading the core unit registry file.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Core registry file not found: {0}")]
    NotFound(PathBuf),

    #[error("Core registry file {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("Unknown core kind '{kind}' for core {name}")]
    UnknownKind { name: String, kind: String },

    #[error("Duplicate core name: {0}")]
    DuplicateName(String),
}

/// Errors raised by a core unit's lifecycle methods.
#[derive(Debug, thiserror::Error)]
pub enum UnitError {
    #[error("Core {name} initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    #[error("Core {name} tick failed: {reason}")]
    TickFailed { name: String, reason: String },

    #[error("Core {name} panicked during tick: {message}")]
    Panicked { name: String, message: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider configuration error: {reason}")]
    Config { reason: String },
}

/// Social delivery and timeline errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Rate limited by {service}, retry after {retry_after:?}")]
    RateLimited {
        service: String,
        retry_after: Option<Duration>,
    },

    #[error("Authentication failed for {service}")]
    AuthFailed { service: String },

    #[error("{service} request failed: {reason}")]
    RequestFailed { service: String, reason: String },

    #[error("Invalid response from {service}: {reason}")]
    InvalidResponse { service: String, reason: String },

    #[error("{service} call timed out after {timeout:?}")]
    Timeout { service: String, timeout: Duration },

    #[error("Delivery client not configured: {reason}")]
    NotConfigured { reason: String },
}

impl DeliveryError {
    /// Whether the failure was classified as throttling by the remote service.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DeliveryError::RateLimited { .. })
    }
}

/// Content generation errors.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("No source material available: {0}")]
    NoSourceMaterial(String),

    #[error("Personality not loaded: {0}")]
    PersonalityUnavailable(String),

    #[error("Failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("Completion failed: {0}")]
    Completion(#[from] LlmError),

    #[error("Completion returned empty content")]
    Empty,

    #[error("Content generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias for the agent.
pub type Result<T> = std::result::Result<T, Error>;
