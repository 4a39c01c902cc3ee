//! Error types for the Counsel domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] unifies them for
//! callers that do not care which layer failed.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for all Counsel operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Raised by the tag resolver. Only a *required* inclusion that cannot be
/// read is an error; everything else degrades to text.
#[derive(Debug, Clone, Error)]
pub enum ResolutionError {
    #[error("Required file '{path}' could not be read")]
    MissingFile { path: String },
}

#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("No advisor file found for '{0}'")]
    AdvisorNotFound(String),

    #[error("Failed to parse advisor '{source_name}': {reason}")]
    Parse { source_name: String, reason: String },

    #[error("Failed to read {path}: {reason}")]
    Io { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<GatewayError>,
    },
}

impl GatewayError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::RateLimited { .. } => true,
            Self::ApiError { status_code, .. } => *status_code >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    Duplicate(String),

    #[error("Invalid parameter schema for {tool_name}: {reason}")]
    InvalidSchema { tool_name: String, reason: String },

    #[error("Invalid arguments for {tool_name}: {reason}")]
    InvalidArguments { tool_name: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_ms}ms")]
    Timeout { tool_name: String, timeout_ms: u64 },
}

/// Terminal failure of one orchestrator exchange.
#[derive(Debug, Clone, Error)]
pub enum ExchangeError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Round limit exceeded: more than {limit} tool rounds")]
    RoundLimitExceeded { limit: u32 },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_error_displays_correctly() {
        let err = Error::Gateway(GatewayError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::ExecutionFailed {
            tool_name: "get_wikipedia".into(),
            reason: "connection refused".into(),
        });
        assert!(err.to_string().contains("get_wikipedia"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn transient_classification() {
        assert!(GatewayError::Network("reset".into()).is_transient());
        assert!(GatewayError::RateLimited { retry_after_secs: 1 }.is_transient());
        assert!(
            GatewayError::ApiError {
                status_code: 503,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !GatewayError::ApiError {
                status_code: 400,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!GatewayError::AuthenticationFailed("bad key".into()).is_transient());
        assert!(!GatewayError::Cancelled("user".into()).is_transient());
    }

    #[test]
    fn template_error_wraps_resolution() {
        let err: TemplateError = ResolutionError::MissingFile {
            path: "docs/x.md".into(),
        }
        .into();
        assert!(err.to_string().contains("docs/x.md"));
    }

    #[test]
    fn round_limit_message() {
        let err = ExchangeError::RoundLimitExceeded { limit: 3 };
        assert!(err.to_string().contains('3'));
    }
}
