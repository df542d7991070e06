//! Error types for the Semantic Firewall
//!
//! A single error enum covers the whole pipeline. Variants map onto the
//! transport-level taxonomy as follows:
//!
//! - [`Error::Backend`] - upstream LLM failure (502)
//! - [`Error::InvalidInput`] - malformed request or guardrail violation (400)
//! - [`Error::NotFound`] - unknown run or dataset (404)
//! - [`Error::Unavailable`] - subsystem not initialized (503)
//! - everything else - internal pipeline failure (500)
//!
//! A blocked request is *not* an error; it is the
//! [`ContentDecision::Blocked`](crate::ContentDecision) variant.

use thiserror::Error;

/// Result type alias for firewall operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for firewall operations
#[derive(Debug, Error)]
pub enum Error {
    /// Detector-level failure (recovered locally with fallback scoring)
    #[error("Detector error in {detector}: {message}")]
    Detector { detector: String, message: String },

    /// Model loading or inference errors
    #[error("Model error: {0}")]
    Model(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Policy loading or evaluation errors
    #[error("Policy error: {0}")]
    Policy(String),

    /// Upstream backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Benchmark store failure
    #[error("Database error: {0}")]
    Database(String),

    /// Malformed request or guardrail violation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown run, dataset or model
    #[error("Not found: {0}")]
    NotFound(String),

    /// Subsystem not initialized
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal errors (should not happen in production)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a detector error with context
    pub fn detector<D: Into<String>, M: Into<String>>(detector: D, message: M) -> Self {
        Self::Detector {
            detector: detector.into(),
            message: message.into(),
        }
    }

    /// Create a model error
    pub fn model<S: Into<String>>(message: S) -> Self {
        Self::Model(message.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config(message.into())
    }

    /// Create a policy error
    pub fn policy<S: Into<String>>(message: S) -> Self {
        Self::Policy(message.into())
    }

    /// Create a backend error
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend(message.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database(message.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a service-unavailable error
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal(message.into())
    }

    /// Check if the error is transient and worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backend(_) | Error::Io(_))
    }

    /// Get error category for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Error::Detector { .. } => "detector",
            Error::Model(_) => "model",
            Error::Config(_) => "config",
            Error::Policy(_) => "policy",
            Error::Backend(_) => "backend",
            Error::Database(_) => "database",
            Error::InvalidInput(_) => "invalid_input",
            Error::NotFound(_) => "not_found",
            Error::Unavailable(_) => "unavailable",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::detector("presidio", "analyzer not loaded");
        assert!(matches!(err, Error::Detector { .. }));
        assert_eq!(err.category(), "detector");
    }

    #[test]
    fn test_error_retryable() {
        assert!(Error::backend("connection refused").is_retryable());
        assert!(!Error::config("bad rules path").is_retryable());
        assert!(!Error::not_found("run").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = Error::detector("heuristic", "rules file missing");
        let msg = format!("{}", err);
        assert!(msg.contains("heuristic"));
        assert!(msg.contains("rules file missing"));
    }
}
