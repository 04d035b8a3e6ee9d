use thiserror::Error;

/// Failures a checker strategy can report.
///
/// `Transport` and `Timeout` are the only retryable kinds; the task runner
/// re-attempts them with backoff. Everything else is terminal for a single
/// resolution and is converted into a failed `ResolutionResult` by the
/// orchestrator.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("no version candidate found: {0}")]
    NotFound(String),

    #[error("checker does not support option: {option}")]
    UnsupportedOption { option: &'static str },

    #[error("cannot parse upstream location: {0}")]
    InvalidLocation(String),

    #[error("no reference version for package: {0}")]
    MissingReference(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl CheckError {
    /// Whether the task runner may retry the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CheckError::Transport(_) | CheckError::Timeout(_))
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}
