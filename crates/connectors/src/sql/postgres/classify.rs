use crate::sql::base::error::FailureKind;
use tokio_postgres::{Error as PgError, error::SqlState};

pub fn classify_pg_error(err: &PgError) -> FailureKind {
    if err.is_closed() {
        return FailureKind::Transient;
    }

    match err.code() {
        Some(code) if is_transient_pg_code(code) => FailureKind::Transient,
        Some(_) => FailureKind::Permanent,
        // Parameters that cannot be serialized fail before reaching the server.
        None if err.to_string().starts_with("error serializing parameter") => {
            FailureKind::Permanent
        }
        // No SQLSTATE otherwise means the failure happened below the protocol
        // (socket, TLS, unexpected message); the statement was never judged.
        None => FailureKind::Transient,
    }
}

fn is_transient_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::SQLSERVER_REJECTED_ESTABLISHMENT_OF_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
            | SqlState::OPERATOR_INTERVENTION
    )
}
