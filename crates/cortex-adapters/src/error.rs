use std::fmt;

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for adapter syncs. The orchestrator records the message
/// and moves on; only `Cancelled` stops a live watcher without a restart.
#[derive(Debug)]
pub enum Error {
    /// Missing upstream binary, missing OS database, no permission.
    /// Fatal for the adapter, non-fatal for the orchestrator.
    Environment(String),

    /// Transient upstream failure (rate limits, subprocess 5xx).
    Upstream(String),

    /// A single malformed record. Callers log, skip, and continue;
    /// surfacing one of these from `sync` means a whole phase was
    /// undecodable.
    Decode(String),

    /// Commit/rollback failure. The watermark is not advanced past
    /// uncommitted work.
    Transaction(String),

    /// The cancellation token tripped at a yield point.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Environment(msg) => write!(f, "environment error: {}", msg),
            Error::Upstream(msg) => write!(f, "upstream error: {}", msg),
            Error::Decode(msg) => write!(f, "decode error: {}", msg),
            Error::Transaction(msg) => write!(f, "transaction error: {}", msg),
            Error::Cancelled => write!(f, "sync cancelled"),
        }
    }
}

impl std::error::Error for Error {}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Transaction(err.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Transaction(format!("{err:#}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
