use connectors::sql::base::error::{ConnectorError, DbError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink already ran its finalizer and accepts no more records.
    #[error("Sink '{0}' is closed")]
    Closed(String),

    /// `detach` was called more often than `attach`.
    #[error("Sink '{0}' was detached more times than it was attached")]
    NotAttached(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Environment variable '{0}' is not set")]
    MissingEnv(String),

    #[error("Invalid env file: {0}")]
    EnvFile(String),

    #[error("Sink '{sink}': {reason}")]
    Invalid { sink: String, reason: String },
}

impl ConfigError {
    pub fn invalid(sink: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            sink: sink.into(),
            reason: reason.into(),
        }
    }
}
