//! Error types for the grounded answer orchestrator

use thiserror::Error;

use crate::guidance::FailureKind;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Upstream Provider Errors
    // =============================

    #[error("Search provider error: {message}")]
    Search {
        status: Option<u16>,
        message: String,
    },

    #[error("Generation error: {message}")]
    Generation {
        status: Option<u16>,
        message: String,
    },

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    // =============================
    // Turn Lifecycle Errors
    // =============================

    #[error("Turn cancelled by client")]
    Cancelled,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// HTTP-like status code carried by the failure, if any.
    ///
    /// Deadline expiry maps to 504 so the client renders it as a timeout.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Search { status, .. } | Self::Generation { status, .. } => *status,
            Self::Timeout(_) => Some(504),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Place this failure in the turn-level error taxonomy.
    pub fn failure_kind(&self) -> FailureKind {
        match self.status_code() {
            Some(401) => FailureKind::AuthFailure,
            Some(402) => FailureKind::QuotaExhausted,
            Some(429) => FailureKind::RateLimited,
            Some(504) => FailureKind::Timeout,
            _ => match self {
                Self::Search { .. } => FailureKind::UpstreamSearchFailure,
                Self::Generation { .. } => FailureKind::UpstreamGenerationFailure,
                _ => FailureKind::UnknownFailure,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_drives_failure_kind() {
        let auth = OrchestrationError::Search {
            status: Some(401),
            message: "bad key".into(),
        };
        assert_eq!(auth.failure_kind(), FailureKind::AuthFailure);

        let search = OrchestrationError::Search {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(search.failure_kind(), FailureKind::UpstreamSearchFailure);

        let generation = OrchestrationError::Generation {
            status: None,
            message: "stream reset".into(),
        };
        assert_eq!(
            generation.failure_kind(),
            FailureKind::UpstreamGenerationFailure
        );
    }

    #[test]
    fn test_timeout_is_504() {
        let err = OrchestrationError::Timeout("search");
        assert_eq!(err.status_code(), Some(504));
        assert_eq!(err.failure_kind(), FailureKind::Timeout);
        assert_eq!(err.to_string(), "Timed out waiting for search");
    }
}
