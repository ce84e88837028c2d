use crate::sql::{
    base::{
        error::{ConnectorError, DbError},
        query::insert::PreparedInsert,
        session::DbSession,
    },
    postgres::{options::PgConnectOptions, params::PgParamStore, utils::connect_with_config},
};
use async_trait::async_trait;
use model::core::value::Value;
use std::collections::HashMap;
use tokio_postgres::{Client, Statement};
use tracing::{debug, info, warn};

/// A PostgreSQL session with explicit transaction control.
///
/// Outside autocommit mode a transaction is opened lazily by the first
/// statement after a commit or rollback. If that opening statement fails,
/// the session discards the empty aborted transaction itself so the next
/// statement does not inherit the aborted state.
pub struct PgSession {
    client: Option<Client>,
    autocommit: bool,
    in_transaction: bool,
    statements_in_tx: usize,
    statements: HashMap<String, Statement>,
    target: String,
}

impl PgSession {
    pub async fn connect(
        options: &PgConnectOptions,
        autocommit: bool,
    ) -> Result<Self, ConnectorError> {
        let target = options.display_target();
        info!(db = %target, autocommit, "Opening Postgres session");
        let client = connect_with_config(options.to_config()).await?;
        Ok(Self::from_client(client, autocommit, target))
    }

    pub fn from_client(client: Client, autocommit: bool, target: String) -> Self {
        Self {
            client: Some(client),
            autocommit,
            in_transaction: false,
            statements_in_tx: 0,
            statements: HashMap::new(),
            target,
        }
    }

    /// Round-trips a trivial query to check the connection is usable.
    pub async fn ping(&self) -> Result<(), DbError> {
        let client = self.client.as_ref().ok_or(DbError::Closed)?;
        let row = client.query_one("SELECT 1", &[]).await?;
        let val: i32 = row.get(0);
        if val != 1 {
            return Err(DbError::Connection(format!(
                "ping to '{}' returned unexpected result: {val}",
                self.target
            )));
        }
        Ok(())
    }
}

async fn prepare_cached(
    client: &Client,
    cache: &mut HashMap<String, Statement>,
    sql: &str,
) -> Result<Statement, DbError> {
    if let Some(statement) = cache.get(sql) {
        return Ok(statement.clone());
    }
    debug!(sql, "Preparing statement");
    let statement = client.prepare(sql).await?;
    cache.insert(sql.to_string(), statement.clone());
    Ok(statement)
}

#[async_trait]
impl DbSession for PgSession {
    async fn execute(
        &mut self,
        insert: &PreparedInsert,
        params: &[Value],
    ) -> Result<u64, DbError> {
        let client = self.client.as_ref().ok_or(DbError::Closed)?;

        if !self.autocommit && !self.in_transaction {
            client.batch_execute("BEGIN").await?;
            self.in_transaction = true;
            self.statements_in_tx = 0;
        }

        let result = match prepare_cached(client, &mut self.statements, insert.sql()).await {
            Ok(statement) => {
                let bindings = PgParamStore::from_values(params);
                client
                    .execute(&statement, &bindings.as_refs())
                    .await
                    .map_err(DbError::from)
            }
            Err(err) => Err(err),
        };

        match result {
            Ok(rows) => {
                if self.in_transaction {
                    self.statements_in_tx += 1;
                }
                Ok(rows)
            }
            Err(err) => {
                if self.in_transaction && self.statements_in_tx == 0 {
                    if let Err(rollback_err) = client.batch_execute("ROLLBACK").await {
                        warn!(error = %rollback_err, "Failed to discard aborted transaction");
                    }
                    self.in_transaction = false;
                }
                Err(err)
            }
        }
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let client = self.client.as_ref().ok_or(DbError::Closed)?;
        if !self.in_transaction {
            return Ok(());
        }
        // A failed COMMIT still ends the transaction server-side.
        self.in_transaction = false;
        self.statements_in_tx = 0;
        client.batch_execute("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DbError> {
        let client = self.client.as_ref().ok_or(DbError::Closed)?;
        if !self.in_transaction {
            return Ok(());
        }
        self.in_transaction = false;
        self.statements_in_tx = 0;
        client.batch_execute("ROLLBACK").await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DbError> {
        if let Some(client) = self.client.take() {
            if self.in_transaction {
                warn!(
                    db = %self.target,
                    pending = self.statements_in_tx,
                    "Closing Postgres session with an open transaction, it will be rolled back"
                );
            }
            self.in_transaction = false;
            self.statements.clear();
            drop(client);
            info!(db = %self.target, "Postgres session closed");
        }
        Ok(())
    }
}
