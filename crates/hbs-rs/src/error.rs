//! Error taxonomy for bucket building, summarization, and persistence.
//!
//! Every fallible operation in the crate returns [`Result`]. Build and merge
//! operations surface errors immediately; [`rebuild`](crate::engine::BucketManager::rebuild)
//! additionally restores the pre-call state before returning one.

use thiserror::Error;

/// Errors produced by the engine and its collaborators.
#[derive(Debug, Error)]
pub enum HbsError {
    /// No summarization backend is selected or its credentials are missing.
    #[error("summarizer not configured: {0}")]
    Configuration(String),

    /// The backend call failed or timed out.
    #[error("summarization request failed: {0}")]
    Transport(String),

    /// The backend answered but the summary text was empty.
    #[error("summarizer returned empty content ({0})")]
    EmptyResult(String),

    /// A configuration value is out of range (non-positive sizes, bad template).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Reading or writing persisted state failed.
    #[error("state persistence failed: {0}")]
    Persistence(String),
}

impl HbsError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Only transport failures qualify, and only those that look like rate
    /// limiting, server errors, or network trouble. Client errors (4xx other
    /// than 429) are permanent.
    pub fn is_transient(&self) -> bool {
        let HbsError::Transport(detail) = self else {
            return false;
        };

        if ["HTTP 429", "HTTP 500", "HTTP 502", "HTTP 503", "HTTP 504"]
            .iter()
            .any(|s| detail.contains(s))
        {
            return true;
        }

        let lower = detail.to_lowercase();
        [
            "connection reset",
            "connection refused",
            "timed out",
            "broken pipe",
            "network",
        ]
        .iter()
        .any(|p| lower.contains(p))
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, HbsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_detail() {
        let err = HbsError::Configuration("set HBS_SUMM_BASE_URL".into());
        assert!(err.to_string().contains("not configured"));
        assert!(err.to_string().contains("HBS_SUMM_BASE_URL"));

        let err = HbsError::InvalidArgument("chunk_size must be >= 1".into());
        assert_eq!(err.to_string(), "invalid argument: chunk_size must be >= 1");
    }

    #[test]
    fn transient_transport_errors_detected() {
        assert!(HbsError::Transport("HTTP 429 Too Many Requests: slow down".into()).is_transient());
        assert!(HbsError::Transport("HTTP 503 Service Unavailable".into()).is_transient());
        assert!(HbsError::Transport("request timed out after 30 seconds".into()).is_transient());
        assert!(HbsError::Transport("connection refused".into()).is_transient());
    }

    #[test]
    fn permanent_errors_not_transient() {
        assert!(!HbsError::Transport("HTTP 401 Unauthorized: bad key".into()).is_transient());
        assert!(!HbsError::Transport("invalid response format".into()).is_transient());
        assert!(!HbsError::Configuration("timed out".into()).is_transient());
        assert!(!HbsError::EmptyResult("leaf".into()).is_transient());
    }
}
