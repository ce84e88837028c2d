//! In-memory [`DbSession`] used by unit and integration tests.

use async_trait::async_trait;
use connectors::sql::base::{error::DbError, query::insert::PreparedInsert, session::DbSession};
use model::core::value::Value;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

/// One call the sink made on the session, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCall {
    Execute(Vec<Value>),
    Commit,
    Rollback,
    Close,
}

type FailurePredicate = Box<dyn Fn(&[Value]) -> Option<DbError> + Send>;

#[derive(Default)]
struct MockState {
    autocommit: bool,
    closed: bool,
    calls: Vec<SessionCall>,
    pending: Vec<Vec<Value>>,
    committed: Vec<Vec<Value>>,
    execute_failures: VecDeque<DbError>,
    commit_failures: VecDeque<DbError>,
    fail_if: Option<FailurePredicate>,
}

/// A session that keeps rows in memory and follows transaction semantics:
/// executed rows become visible in [`committed_rows`](Self::committed_rows)
/// only after a successful commit and vanish on rollback.
///
/// Clones share state, so a test can keep a handle after moving the session
/// into a sink.
#[derive(Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every successful execute is committed at once; `commit` and
    /// `rollback` have nothing to act on.
    pub fn autocommit() -> Self {
        let session = Self::default();
        session.lock().autocommit = true;
        session
    }

    /// The next execute fails with `err`. Queued failures are consumed in
    /// order, one per execute.
    pub fn push_execute_failure(&self, err: DbError) {
        self.lock().execute_failures.push_back(err);
    }

    /// The next commit fails with `err`; its pending rows are lost.
    pub fn push_commit_failure(&self, err: DbError) {
        self.lock().commit_failures.push_back(err);
    }

    /// Fails every execute whose parameters make `predicate` return an
    /// error.
    pub fn fail_execute_if<F>(&self, predicate: F)
    where
        F: Fn(&[Value]) -> Option<DbError> + Send + 'static,
    {
        self.lock().fail_if = Some(Box::new(predicate));
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.lock().calls.clone()
    }

    pub fn count(&self, call: &SessionCall) -> usize {
        let state = self.lock();
        state
            .calls
            .iter()
            .filter(|c| std::mem::discriminant(*c) == std::mem::discriminant(call))
            .count()
    }

    pub fn committed_rows(&self) -> Vec<Vec<Value>> {
        self.lock().committed.clone()
    }

    pub fn pending_rows(&self) -> Vec<Vec<Value>> {
        self.lock().pending.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A failure the sink classifies as transient.
pub fn transient_error() -> DbError {
    DbError::Connection("server closed the connection unexpectedly".into())
}

/// A failure the sink classifies as permanent.
pub fn permanent_error() -> DbError {
    DbError::Write("duplicate key value violates unique constraint".into())
}

/// Parameter tuple as the text encoder produces it.
pub fn row(fields: &[&str]) -> Vec<Value> {
    fields.iter().map(|f| Value::String(f.to_string())).collect()
}

#[async_trait]
impl DbSession for MockSession {
    async fn execute(
        &mut self,
        _insert: &PreparedInsert,
        params: &[Value],
    ) -> Result<u64, DbError> {
        let mut state = self.lock();
        state.calls.push(SessionCall::Execute(params.to_vec()));
        if state.closed {
            return Err(DbError::Closed);
        }
        if let Some(err) = state.execute_failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = state.fail_if.as_ref().and_then(|check| check(params)) {
            return Err(err);
        }

        if state.autocommit {
            state.committed.push(params.to_vec());
        } else {
            state.pending.push(params.to_vec());
        }
        Ok(1)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let mut state = self.lock();
        state.calls.push(SessionCall::Commit);
        if state.closed {
            return Err(DbError::Closed);
        }
        if let Some(err) = state.commit_failures.pop_front() {
            state.pending.clear();
            return Err(err);
        }
        let pending = std::mem::take(&mut state.pending);
        state.committed.extend(pending);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        let mut state = self.lock();
        state.calls.push(SessionCall::Rollback);
        if state.closed {
            return Err(DbError::Closed);
        }
        state.pending.clear();
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        let mut state = self.lock();
        state.calls.push(SessionCall::Close);
        state.closed = true;
        state.pending.clear();
        Ok(())
    }
}
