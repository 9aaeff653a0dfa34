use std::time::Duration;

use thiserror::Error;

use crate::pipeline::Stage;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failure: {0}")]
    Validation(String),

    #[error("Analysis failure: {message}")]
    Analysis {
        message: String,
        /// What the backend actually sent, kept for diagnosis.
        raw_response: Option<String>,
    },

    #[error("Language backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Search unavailable after {attempts} attempt(s): {last_error}")]
    SearchUnavailable { attempts: u32, last_error: SearchError },

    #[error("Search request rejected: {0}")]
    SearchRejected(SearchError),

    #[error("Research failure: {0}")]
    Research(String),

    #[error("Run was cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ScoutError>;

/// Failures reported by a search surface for a single attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    #[error("search request timed out")]
    Timeout,

    #[error("search rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("search server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("search request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed search response: {0}")]
    Malformed(String),
}

impl SearchError {
    /// Whether re-issuing the identical query may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SearchError::Timeout
                | SearchError::RateLimited { .. }
                | SearchError::Server { .. }
                | SearchError::Network(_)
        )
    }

    /// Classify an HTTP status the way the gateway's retry policy expects.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => SearchError::RateLimited { retry_after: None },
            408 | 500..=599 => SearchError::Server { status, message },
            _ => SearchError::Rejected { status, message },
        }
    }
}

/// Failures reported by the language-understanding backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("backend rejected credentials: {0}")]
    Unauthorized(String),

    #[error("backend rate limited")]
    RateLimited,

    #[error("backend server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("backend request timed out")]
    Timeout,

    #[error("backend network error: {0}")]
    Network(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    /// Overload, throttling and dropped connections; credentials and bad
    /// replies are permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::RateLimited | BackendError::Timeout | BackendError::Network(_) => true,
            BackendError::Server { status, .. } => *status == 408 || *status >= 500,
            BackendError::Unauthorized(_) | BackendError::InvalidResponse(_) => false,
        }
    }
}

/// Caller-facing failure of a pipeline run: the stage that failed plus why.
#[derive(Error, Debug)]
#[error("{stage} stage failed: {cause}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub cause: ScoutError,
}

impl PipelineError {
    pub fn new(stage: Stage, cause: ScoutError) -> Self {
        Self { stage, cause }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(SearchError::from_status(429, "slow down").is_transient());
        assert!(SearchError::from_status(503, "unavailable").is_transient());
        assert!(SearchError::from_status(408, "timeout").is_transient());
        assert!(!SearchError::from_status(400, "bad query").is_transient());
        assert!(!SearchError::from_status(401, "no key").is_transient());
        assert!(!SearchError::Malformed("not json".into()).is_transient());
    }

    #[test]
    fn test_backend_error_classification() {
        let overloaded = BackendError::Server {
            status: 503,
            message: "The model is overloaded".into(),
        };
        assert!(overloaded.is_transient());
        assert!(BackendError::RateLimited.is_transient());
        assert!(BackendError::Timeout.is_transient());
        assert!(!BackendError::Server {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!BackendError::Unauthorized("no key".into()).is_transient());
        assert!(!BackendError::InvalidResponse("empty".into()).is_transient());
    }

    #[test]
    fn test_pipeline_error_display_names_stage() {
        let err = PipelineError::new(Stage::Researching, ScoutError::Research("all down".into()));
        assert_eq!(
            err.to_string(),
            "researching stage failed: Research failure: all down"
        );
    }
}
