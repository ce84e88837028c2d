//! Batched database sink with commit threshold, rollback and replay.

use crate::{error::SinkError, history::History, sink::Sink};
use async_trait::async_trait;
use connectors::sql::base::{
    error::{DbError, FailureKind},
    query::insert::PreparedInsert,
    session::DbSession,
};
use model::{core::value::Value, records::record::Record};
use tracing::{debug, error, info, warn};

/// History window used when no commit threshold is configured.
pub const DEFAULT_HISTORY_WINDOW: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbSinkState {
    /// Writes are accumulating in an open transaction.
    Batching,
    /// Nothing uncommitted since the last commit.
    CommittedIdle,
    /// Rolling back and replaying after a failed write.
    Recovering,
    Closed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbSinkOptions {
    pub autocommit: bool,
    /// Commit after this many uncommitted writes. `None` or zero commits
    /// only on close.
    pub commit_threshold: Option<usize>,
}

/// Running counters of a [`DatabaseSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbSinkStats {
    pub written: u64,
    pub commits: u64,
    pub commit_failures: u64,
    pub rollbacks: u64,
    pub replayed: u64,
    pub replay_failures: u64,
    pub dropped: u64,
}

/// Writes every record as one row through a fixed prepared insert.
///
/// Outside autocommit mode rows accumulate in a transaction that is
/// committed every `commit_threshold` writes and on close. The parameters of
/// recent writes are kept in a bounded history so that a failed write can
/// be followed by a rollback and a replay of the rows the rollback
/// discarded.
pub struct DatabaseSink<S: DbSession> {
    name: String,
    session: S,
    insert: PreparedInsert,
    autocommit: bool,
    commit_threshold: Option<usize>,
    uncommitted: usize,
    history: History<Vec<Value>>,
    state: DbSinkState,
    stats: DbSinkStats,
}

impl<S: DbSession> DatabaseSink<S> {
    pub fn new(
        name: impl Into<String>,
        session: S,
        insert: PreparedInsert,
        options: DbSinkOptions,
    ) -> Self {
        let commit_threshold = options.commit_threshold.filter(|k| *k > 0);
        let window = commit_threshold.unwrap_or(DEFAULT_HISTORY_WINDOW);

        Self {
            name: name.into(),
            session,
            insert,
            autocommit: options.autocommit,
            commit_threshold,
            uncommitted: 0,
            history: History::with_capacity(window.saturating_mul(2)),
            state: DbSinkState::CommittedIdle,
            stats: DbSinkStats::default(),
        }
    }

    pub fn uncommitted(&self) -> usize {
        self.uncommitted
    }

    pub fn history(&self) -> &History<Vec<Value>> {
        &self.history
    }

    pub fn state(&self) -> DbSinkState {
        self.state
    }

    pub fn stats(&self) -> DbSinkStats {
        self.stats
    }

    async fn commit(&mut self) {
        match self.session.commit().await {
            Ok(()) => {
                debug!(sink = %self.name, rows = self.uncommitted, "Committed batch");
                self.stats.commits += 1;
                self.uncommitted = 0;
                self.state = DbSinkState::CommittedIdle;
            }
            Err(err) => {
                self.stats.commit_failures += 1;
                error!(
                    sink = %self.name,
                    pending = self.uncommitted,
                    error = %err,
                    "Commit failed"
                );
            }
        }
    }

    async fn on_write_failure(&mut self, params: Vec<Value>, err: DbError) {
        if self.autocommit {
            self.stats.dropped += 1;
            error!(sink = %self.name, error = %err, "Write failed, record dropped");
            return;
        }

        let window = match err.kind() {
            FailureKind::Transient => {
                self.history.push(params);
                self.uncommitted += 1;
                self.uncommitted
            }
            FailureKind::Permanent => {
                self.stats.dropped += 1;
                self.uncommitted
            }
        };

        warn!(
            sink = %self.name,
            error = %err,
            kind = ?err.kind(),
            pending = window,
            "Write failed, rolling back and replaying uncommitted rows"
        );
        self.recover(window).await;
    }

    /// Rolls back and replays the newest `window` history entries, each in
    /// its own transaction. Entries that fail again are logged and skipped.
    async fn recover(&mut self, window: usize) {
        if window == 0 {
            debug!(sink = %self.name, "Nothing uncommitted, skipping rollback");
            return;
        }

        self.state = DbSinkState::Recovering;
        self.stats.rollbacks += 1;
        if let Err(err) = self.session.rollback().await {
            error!(sink = %self.name, error = %err, "Rollback failed");
        }

        let available = self.history.len().min(window);
        if available < window {
            warn!(
                sink = %self.name,
                lost = window - available,
                "Rows fell out of the replay history and are lost"
            );
        }

        let entries: Vec<Vec<Value>> = self.history.last(window).cloned().collect();
        let mut reset = false;
        for (i, params) in entries.iter().enumerate() {
            let result = match self.session.execute(&self.insert, params).await {
                Ok(_) => self.session.commit().await,
                Err(err) => Err(err),
            };

            match result {
                Ok(()) => {
                    self.stats.replayed += 1;
                    self.stats.commits += 1;
                    if !reset {
                        self.uncommitted = 0;
                        reset = true;
                    }
                }
                Err(err) => {
                    self.stats.replay_failures += 1;
                    warn!(sink = %self.name, entry = i, error = %err, "Replay failed, row lost");
                }
            }
        }

        self.state = if self.uncommitted == 0 {
            DbSinkState::CommittedIdle
        } else {
            DbSinkState::Batching
        };
        info!(
            sink = %self.name,
            attempted = entries.len(),
            uncommitted = self.uncommitted,
            "Recovery finished"
        );
    }
}

#[async_trait]
impl<S: DbSession> Sink for DatabaseSink<S> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&mut self, _seq: u64, record: &Record) -> Result<(), SinkError> {
        if self.state == DbSinkState::Closed {
            return Err(SinkError::Closed(self.name.clone()));
        }

        let params = match self.session.encode(&self.insert, record) {
            Ok(params) => params,
            Err(err) => {
                self.stats.dropped += 1;
                warn!(sink = %self.name, error = %err, "Record cannot be encoded, dropped");
                return Ok(());
            }
        };

        if let Err(err) = self.session.execute(&self.insert, &params).await {
            self.on_write_failure(params, err).await;
            return Ok(());
        }

        self.stats.written += 1;
        if self.autocommit {
            self.commit().await;
            return Ok(());
        }

        self.history.push(params);
        self.uncommitted += 1;
        self.state = DbSinkState::Batching;
        if self.commit_threshold.is_some_and(|k| self.uncommitted >= k) {
            self.commit().await;
        }
        Ok(())
    }

    async fn finalize(&mut self) -> Result<(), SinkError> {
        if self.state == DbSinkState::Closed {
            return Ok(());
        }

        self.commit().await;
        self.state = DbSinkState::Closed;
        let closed = self.session.close().await;

        let stats = self.stats;
        info!(
            sink = %self.name,
            table = %self.insert.table(),
            written = stats.written,
            commits = stats.commits,
            commit_failures = stats.commit_failures,
            rollbacks = stats.rollbacks,
            replayed = stats.replayed,
            replay_failures = stats.replay_failures,
            dropped = stats.dropped,
            "Database sink closed"
        );
        closed.map_err(SinkError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockSession, SessionCall, permanent_error, row, transient_error};
    use connectors::sql::base::{dialect::Postgres, query::insert::InsertTemplate};
    use tracing_test::traced_test;

    fn sink(session: &MockSession, threshold: Option<usize>) -> DatabaseSink<MockSession> {
        let insert = InsertTemplate::new("creds", ["username", "password"])
            .compile(&Postgres)
            .unwrap();
        DatabaseSink::new(
            "db",
            session.clone(),
            insert,
            DbSinkOptions {
                autocommit: false,
                commit_threshold: threshold,
            },
        )
    }

    fn creds(user: &str, pass: &str) -> Record {
        [user, pass].into_iter().collect()
    }

    async fn write_all(sink: &mut DatabaseSink<MockSession>, rows: &[(&str, &str)]) {
        for (i, (user, pass)) in rows.iter().enumerate() {
            sink.write(i as u64 + 1, &creds(user, pass)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_uncommitted_grows_without_threshold() {
        let session = MockSession::new();
        let mut sink = sink(&session, None);
        write_all(&mut sink, &[("a", "1"), ("b", "2"), ("c", "3"), ("d", "4")]).await;

        assert_eq!(sink.uncommitted(), 4);
        assert_eq!(sink.history().len(), 4);
        assert_eq!(sink.state(), DbSinkState::Batching);
        assert_eq!(session.count(&SessionCall::Commit), 0);
        assert!(session.committed_rows().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_commits_every_k_writes() {
        let session = MockSession::new();
        let mut sink = sink(&session, Some(2));
        let rows: Vec<(String, String)> =
            (0..7).map(|i| (format!("u{i}"), format!("p{i}"))).collect();
        for (i, (user, pass)) in rows.iter().enumerate() {
            sink.write(i as u64 + 1, &creds(user, pass)).await.unwrap();
            let expected_commits = (i + 1) / 2;
            assert_eq!(session.count(&SessionCall::Commit), expected_commits);
            assert_eq!(sink.uncommitted(), (i + 1) % 2);
        }

        assert_eq!(session.committed_rows().len(), 6);
        // capacity is twice the threshold
        assert_eq!(sink.history().capacity(), 4);
        assert_eq!(sink.history().len(), 4);
    }

    #[tokio::test]
    async fn test_history_capacity_without_threshold() {
        let session = MockSession::new();
        let unbounded = sink(&session, None);
        assert_eq!(unbounded.history().capacity(), 2 * DEFAULT_HISTORY_WINDOW);

        let zero = sink(&session, Some(0));
        assert_eq!(zero.history().capacity(), 2 * DEFAULT_HISTORY_WINDOW);
    }

    #[tokio::test]
    async fn test_scenario_threshold_then_transient_failure() {
        let session = MockSession::new();
        let mut sink = sink(&session, Some(3));
        write_all(&mut sink, &[("a", "1"), ("b", "2"), ("c", "3")]).await;

        assert_eq!(session.count(&SessionCall::Commit), 1);
        assert_eq!(sink.uncommitted(), 0);
        let history: Vec<Vec<Value>> = sink.history().last(3).cloned().collect();
        assert_eq!(history, vec![row(&["a", "1"]), row(&["b", "2"]), row(&["c", "3"])]);

        session.push_execute_failure(transient_error());
        sink.write(4, &creds("d", "4")).await.unwrap();

        let tail = session.calls().split_off(4);
        assert_eq!(
            tail,
            vec![
                SessionCall::Execute(row(&["d", "4"])),
                SessionCall::Rollback,
                SessionCall::Execute(row(&["d", "4"])),
                SessionCall::Commit,
            ]
        );
        assert_eq!(sink.uncommitted(), 0);
        assert_eq!(sink.state(), DbSinkState::CommittedIdle);
        assert_eq!(session.committed_rows().len(), 4);
        assert_eq!(sink.stats().replayed, 1);
        assert_eq!(sink.stats().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_replays_uncommitted_tail() {
        let session = MockSession::new();
        let mut sink = sink(&session, None);
        write_all(&mut sink, &[("a", "1"), ("b", "2")]).await;

        session.push_execute_failure(permanent_error());
        sink.write(3, &creds("dup", "x")).await.unwrap();

        assert_eq!(session.count(&SessionCall::Rollback), 1);
        let tail = session.calls().split_off(3);
        assert_eq!(
            tail,
            vec![
                SessionCall::Rollback,
                SessionCall::Execute(row(&["a", "1"])),
                SessionCall::Commit,
                SessionCall::Execute(row(&["b", "2"])),
                SessionCall::Commit,
            ]
        );
        assert_eq!(sink.uncommitted(), 0);
        assert_eq!(session.committed_rows(), vec![row(&["a", "1"]), row(&["b", "2"])]);
        assert_eq!(sink.history().len(), 2);
        assert_eq!(sink.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_with_nothing_uncommitted_skips_rollback() {
        let session = MockSession::new();
        let mut sink = sink(&session, Some(2));
        write_all(&mut sink, &[("a", "1"), ("b", "2")]).await;
        assert_eq!(sink.uncommitted(), 0);

        session.push_execute_failure(permanent_error());
        sink.write(3, &creds("dup", "x")).await.unwrap();

        assert_eq!(session.count(&SessionCall::Rollback), 0);
        assert_eq!(sink.stats().rollbacks, 0);
        assert_eq!(sink.state(), DbSinkState::CommittedIdle);
    }

    #[tokio::test]
    async fn test_failed_replay_is_skipped_and_counter_reset_by_first_success() {
        let session = MockSession::new();
        let mut sink = sink(&session, None);
        write_all(&mut sink, &[("a", "1"), ("b", "2"), ("c", "3")]).await;

        // the failing write itself, then the replay of "a"
        session.push_execute_failure(permanent_error());
        session.push_execute_failure(transient_error());
        sink.write(4, &creds("e", "5")).await.unwrap();

        let stats = sink.stats();
        assert_eq!(stats.replay_failures, 1);
        assert_eq!(stats.replayed, 2);
        assert_eq!(sink.uncommitted(), 0);
        assert_eq!(session.committed_rows(), vec![row(&["b", "2"]), row(&["c", "3"])]);
        // single pass, nothing retried
        assert_eq!(session.count(&SessionCall::Execute(vec![])), 4 + 3);
    }

    #[tokio::test]
    async fn test_all_replays_failing_keeps_counter() {
        let session = MockSession::new();
        let mut sink = sink(&session, None);
        write_all(&mut sink, &[("a", "1"), ("b", "2")]).await;

        session.push_execute_failure(permanent_error());
        session.push_execute_failure(transient_error());
        session.push_execute_failure(transient_error());
        sink.write(3, &creds("c", "3")).await.unwrap();

        assert_eq!(sink.uncommitted(), 2);
        assert_eq!(sink.state(), DbSinkState::Batching);
        assert_eq!(sink.stats().replay_failures, 2);
        assert!(session.committed_rows().is_empty());
    }

    #[tokio::test]
    async fn test_replay_window_larger_than_history_is_truncated() {
        let session = MockSession::new();
        let mut sink = sink(&session, Some(1));
        // capacity 2, but a failing commit lets the counter run past it
        session.push_commit_failure(transient_error());
        session.push_commit_failure(transient_error());
        session.push_commit_failure(transient_error());
        write_all(&mut sink, &[("a", "1"), ("b", "2"), ("c", "3")]).await;
        assert_eq!(sink.uncommitted(), 3);
        assert_eq!(sink.stats().commit_failures, 3);

        session.push_execute_failure(permanent_error());
        sink.write(4, &creds("x", "x")).await.unwrap();

        assert_eq!(sink.stats().replayed, 2);
        assert_eq!(session.committed_rows(), vec![row(&["b", "2"]), row(&["c", "3"])]);
        assert_eq!(sink.uncommitted(), 0);
    }

    #[tokio::test]
    async fn test_encoding_failure_drops_record() {
        let session = MockSession::new();
        let mut sink = sink(&session, None);
        write_all(&mut sink, &[("a", "1")]).await;

        sink.write(2, &["only-one"].into_iter().collect::<Record>()).await.unwrap();
        sink.write(3, &creds("nul\0", "x")).await.unwrap();
        sink.write(4, &Record::from_line(b"bad\xff\tpw", b'\t')).await.unwrap();

        assert_eq!(sink.uncommitted(), 1);
        assert_eq!(sink.stats().dropped, 3);
        assert_eq!(session.count(&SessionCall::Rollback), 0);
        assert_eq!(session.count(&SessionCall::Execute(vec![])), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_counter_and_retries_on_next_write() {
        let session = MockSession::new();
        let mut sink = sink(&session, Some(2));
        session.push_commit_failure(transient_error());
        write_all(&mut sink, &[("a", "1"), ("b", "2")]).await;

        assert_eq!(sink.uncommitted(), 2);
        assert_eq!(sink.stats().commit_failures, 1);

        sink.write(3, &creds("c", "3")).await.unwrap();
        assert_eq!(sink.uncommitted(), 0);
        assert_eq!(session.count(&SessionCall::Commit), 2);
    }

    #[tokio::test]
    async fn test_autocommit_commits_each_write_and_drops_failures() {
        let session = MockSession::autocommit();
        let insert = InsertTemplate::new("creds", ["username", "password"])
            .compile(&Postgres)
            .unwrap();
        let mut sink = DatabaseSink::new(
            "db",
            session.clone(),
            insert,
            DbSinkOptions {
                autocommit: true,
                commit_threshold: None,
            },
        );

        sink.write(1, &creds("a", "1")).await.unwrap();
        session.push_execute_failure(transient_error());
        sink.write(2, &creds("b", "2")).await.unwrap();
        sink.write(3, &creds("c", "3")).await.unwrap();

        assert_eq!(session.count(&SessionCall::Commit), 2);
        assert_eq!(session.count(&SessionCall::Rollback), 0);
        assert_eq!(session.committed_rows(), vec![row(&["a", "1"]), row(&["c", "3"])]);
        assert_eq!(sink.uncommitted(), 0);
        assert!(sink.history().is_empty());
        assert_eq!(sink.stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_finalize_commits_then_closes() {
        let session = MockSession::new();
        let mut sink = sink(&session, None);
        sink.finalize().await.unwrap();
        assert_eq!(session.calls(), vec![SessionCall::Commit, SessionCall::Close]);
        assert_eq!(sink.state(), DbSinkState::Closed);

        sink.finalize().await.unwrap();
        assert_eq!(session.calls().len(), 2);

        let err = sink.write(1, &creds("a", "1")).await.unwrap_err();
        assert!(matches!(err, SinkError::Closed(_)));
    }

    #[tokio::test]
    async fn test_finalize_flushes_pending_rows() {
        let session = MockSession::new();
        let mut sink = sink(&session, Some(10));
        write_all(&mut sink, &[("a", "1"), ("b", "2")]).await;
        sink.finalize().await.unwrap();

        assert_eq!(session.committed_rows().len(), 2);
        assert!(session.is_closed());
        assert_eq!(sink.stats().commits, 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_close_reports_table_and_counters() {
        let session = MockSession::new();
        let mut sink = sink(&session, None);
        write_all(&mut sink, &[("a", "1"), ("b", "2")]).await;
        sink.finalize().await.unwrap();

        assert!(logs_contain("Database sink closed"));
        assert!(logs_contain("table=creds"));
        assert!(logs_contain("written=2"));
    }
}
