/// Shared error type used across all Renova crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("store: {0}")]
    Store(String),

    #[error("provider {provider}: {message}")]
    Provider { provider: String, message: String },

    #[error("auth: {0}")]
    Auth(String),

    #[error("config: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The knowledge base has no entry under the given key.
    #[error("unknown knowledge key: {0}")]
    UnknownKey(String),

    /// The key is part of the always-present set and cannot be removed.
    #[error("protected knowledge key: {0}")]
    ProtectedKey(String),

    /// An analysis pipeline stage failed; downstream stages were skipped.
    #[error("pipeline stage {stage}: {message}")]
    PipelineStage { stage: String, message: String },

    /// The agent loop did not produce a final response within its budget.
    #[error("turn budget exceeded after {cycles} agent cycles")]
    TurnBudgetExceeded { cycles: u32 },

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Transient failures are worth retrying with backoff; everything else
    /// is surfaced immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Http(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
