use crate::sql::base::{
    encoder::{ParamEncoder, TextParamEncoder},
    error::DbError,
    query::insert::PreparedInsert,
};
use async_trait::async_trait;
use model::{
    core::value::Value,
    records::{error::RecordError, record::Record},
};

/// A single exclusively-owned database session.
///
/// Implementations own the transaction boundaries: statements executed
/// after a `commit` or `rollback` belong to a new transaction, unless the
/// session runs in autocommit mode, in which case `commit` and `rollback`
/// have nothing to act on.
#[async_trait]
pub trait DbSession: Send {
    /// Executes the prepared insert with one parameter tuple and returns
    /// the number of affected rows.
    async fn execute(&mut self, insert: &PreparedInsert, params: &[Value])
    -> Result<u64, DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn rollback(&mut self) -> Result<(), DbError>;

    /// Releases the connection. Further calls fail with `DbError::Closed`.
    async fn close(&mut self) -> Result<(), DbError>;

    /// Encodes a record into the parameter tuple for `insert`.
    fn encode(&self, insert: &PreparedInsert, record: &Record) -> Result<Vec<Value>, RecordError> {
        TextParamEncoder.encode(record, insert.arity())
    }
}
