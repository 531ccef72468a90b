use thiserror::Error;

/// Custom error types for the classroom hub
#[derive(Debug, Error)]
pub enum HubError {
    /// Socket protocol errors
    #[error("Invalid inbound message: {0}")]
    Protocol(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Evaluator errors. The display strings are shown to students verbatim.
    #[error("Error: evaluator executable '{0}' not found")]
    EvaluatorNotFound(String),

    #[error("Sandbox System Error: {0}")]
    EvaluatorSpawn(String),

    #[error("Sandbox System Error:\n{0}")]
    EvaluatorExit(String),

    #[error("Sandbox Crash:\n{0}")]
    EvaluatorCrash(String),

    #[error("Sandbox Timeout: evaluation exceeded {0}s")]
    EvaluatorTimeout(u64),

    /// Hub errors
    #[error("Room hub is no longer running")]
    HubClosed,

    #[error("Missing or invalid admin credentials")]
    Unauthorized,
}

/// Convenience type alias for Results using HubError
pub type Result<T> = std::result::Result<T, HubError>;

impl HubError {
    /// Helper to create protocol errors
    pub fn protocol(msg: impl Into<String>) -> Self {
        HubError::Protocol(msg.into())
    }
}

impl warp::reject::Reject for HubError {}
