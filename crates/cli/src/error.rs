use connectors::sql::base::error::{ConnectorError, DbError};
use sink_core::error::{ConfigError, SinkError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Connection failed: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
