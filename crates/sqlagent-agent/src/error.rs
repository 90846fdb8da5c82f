use thiserror::Error;

use sqlagent_llm::LlmError;

/// Errors from persisting conversation history.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("conversation store lock poisoned")]
    Poisoned,
    #[error("invalid store path: {0}")]
    InvalidPath(String),
}

/// Errors that abort an agent run. Model and database failures do not:
/// they are reported to the user as the run's reply.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("conversation store error: {0}")]
    Store(#[from] StoreError),
    #[error("llm client error: {0}")]
    Llm(#[from] LlmError),
}
