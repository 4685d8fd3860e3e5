use crate::synthesis::AttemptError;
use thiserror::Error;

/// Classified failure of a completion backend. Never retried by the
/// synthesis loop; always terminal for the current round.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("server error: {0}")]
    Server(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("unexpected response shape: {0}")]
    UnexpectedResponse(String),
}

#[derive(Error, Debug)]
pub enum AssistantError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Synthesis failed after {attempts} attempts:\n{}", format_history(.history))]
    RetryExhausted {
        attempts: u8,
        history: Vec<AttemptError>,
    },

    #[error("Polars error: {0}")]
    Polars(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<polars::prelude::PolarsError> for AssistantError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        AssistantError::Polars(e.to_string())
    }
}

fn format_history(history: &[AttemptError]) -> String {
    history
        .iter()
        .map(|e| format!("  attempt {}: {}", e.attempt, e.message))
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, AssistantError>;
