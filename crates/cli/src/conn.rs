use crate::error::CliError;
use async_trait::async_trait;
use connectors::sql::{
    base::session::DbSession,
    postgres::{options::PgConnectOptions, session::PgSession},
};
use tracing::{error, info};

/// Trait for "pinging" a sink's backing store
#[async_trait]
pub trait ConnectionPinger {
    /// Attempts to ping; returns Err if unreachable
    async fn ping(&self) -> Result<(), CliError>;
}

/// Postgres pinger
pub struct PostgresConnectionPinger {
    pub sink: String,
    pub options: PgConnectOptions,
}

#[async_trait]
impl ConnectionPinger for PostgresConnectionPinger {
    async fn ping(&self) -> Result<(), CliError> {
        let target = self.options.display_target();
        info!("Pinging Postgres at '{}' for sink '{}'", target, self.sink);

        let mut session = PgSession::connect(&self.options, true).await.map_err(|e| {
            error!("Postgres connection to '{}' failed: {}", target, e);
            CliError::Connector(e)
        })?;

        let result = session.ping().await;
        session.close().await?;
        result.map_err(|e| {
            error!("Postgres ping query on '{}' failed: {}", target, e);
            CliError::Db(e)
        })?;

        info!("Postgres ping to '{}' succeeded", target);
        Ok(())
    }
}
