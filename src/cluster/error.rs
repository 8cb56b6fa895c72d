//! Typed errors for the cluster gateway.
//!
//! Three of the five error kinds from the error-handling design live here:
//! transport failures retry with backoff, health-gate failures are retried
//! for the cycle budget by callers, and malformed payloads are recorded and
//! skipped per-index. Verification and Configuration errors are raised by
//! the accounting engine and the config loader respectively.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("cluster health below threshold: have {have}, need {need}")]
    HealthGate { have: String, need: String },

    #[error("malformed response from {endpoint}: {detail}")]
    Malformed { endpoint: String, detail: String },
}

impl ClusterError {
    pub fn malformed(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        ClusterError::Malformed {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }
}

impl From<reqwest::Error> for ClusterError {
    fn from(e: reqwest::Error) -> Self {
        ClusterError::Transport(e.to_string())
    }
}

pub type ClusterResult<T> = Result<T, ClusterError>;
