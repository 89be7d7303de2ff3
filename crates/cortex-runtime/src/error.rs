use std::fmt;

/// Result type for cortex-runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the runtime layer
#[derive(Debug)]
pub enum Error {
    /// Store layer error
    Store(anyhow::Error),

    /// Adapter layer error
    Adapter(cortex_adapters::Error),

    /// IO operation failed
    Io(std::io::Error),

    /// Configuration error
    Config(String),

    /// Invalid operation or state
    InvalidOperation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "Store error: {err:#}"),
            Error::Adapter(err) => write!(f, "Adapter error: {err}"),
            Error::Io(err) => write!(f, "IO error: {err}"),
            Error::Config(msg) => write!(f, "Configuration error: {msg}"),
            Error::InvalidOperation(msg) => write!(f, "Invalid operation: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Adapter(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Store(_) | Error::Config(_) | Error::InvalidOperation(_) => None,
        }
    }
}

impl Error {
    /// Whether this is a configuration/environment failure (CLI exit 2).
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
            || matches!(self, Error::Adapter(cortex_adapters::Error::Environment(_)))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Store(err)
    }
}

impl From<cortex_adapters::Error> for Error {
    fn from(err: cortex_adapters::Error) -> Self {
        Error::Adapter(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}
