//! Error types for the narragraph domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all narragraph operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Task errors ---
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Input ---
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures raised by the completion client and its transports.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// No credential has been supplied to the client yet.
    #[error("API client not initialized. Please set API key first.")]
    NotInitialized,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Whether this is a network/HTTP/stream-level failure.
    pub fn is_transport_failure(&self) -> bool {
        !matches!(self, Self::NotInitialized | Self::UnknownProvider(_))
    }
}

/// Failures of a single prompt task.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The final response could not be coerced into the target shape.
    #[error("Failed to parse JSON response: {raw}")]
    ResponseUnparsable { raw: String },

    #[error("Schema validation failed at `{path}`: expected {expected}")]
    SchemaValidation { path: String, expected: String },
}

impl TaskError {
    /// Whether a whole-attempt retry may recover from this error.
    ///
    /// Missing credentials and unknown providers are configuration
    /// problems; another attempt would fail identically.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_transport_failure(),
            Self::ResponseUnparsable { .. } | Self::SchemaValidation { .. } => true,
        }
    }

    /// Raw response text carried by an unparsable-response failure.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::ResponseUnparsable { raw } => Some(raw),
            _ => None,
        }
    }
}
