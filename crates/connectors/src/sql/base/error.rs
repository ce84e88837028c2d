use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// PostgreSQL driver error.
    #[error("PostgreSQL error: {0}")]
    PgError(#[from] tokio_postgres::Error),

    /// The connection dropped or could not be used. Always worth retrying.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database refused the statement (constraint, data or syntax).
    #[error("Write error: {0}")]
    Write(String),

    /// An error occurred while building a SQL query.
    #[error("Query build error: {0}")]
    QueryBuildError(String),

    /// The session was already closed.
    #[error("Session is closed")]
    Closed,
}

/// Coarse classification of a write failure, used to decide whether the
/// record that caused it is worth replaying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The statement might succeed unchanged on a healthy connection.
    Transient,
    /// The statement will fail again no matter how often it is sent.
    Permanent,
}

impl DbError {
    pub fn kind(&self) -> FailureKind {
        match self {
            DbError::Connection(_) => FailureKind::Transient,
            DbError::PgError(err) => crate::sql::postgres::classify::classify_pg_error(err),
            DbError::Write(_) | DbError::QueryBuildError(_) | DbError::Closed => {
                FailureKind::Permanent
            }
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == FailureKind::Transient
    }
}

/// Errors happening during connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// The connection failed.
    #[error("Connection failed: {0}")]
    Connection(#[from] tokio_postgres::Error),

    /// Invalid connection URL or options.
    #[error("Invalid connection options: {0}")]
    InvalidUrl(String),

    /// TLS connector could not be built.
    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] native_tls::Error),
}
