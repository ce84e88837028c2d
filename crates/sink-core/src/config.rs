//! JSON sink configuration.
//!
//! ```json
//! { "sinks": [
//!     { "type": "console", "scope": "ssh", "show_count": true },
//!     { "type": "postgres", "host": "${PG_HOST}", "database": "loot",
//!       "username": "collector", "table": "creds", "commit_threshold": 100 }
//! ] }
//! ```

use crate::{
    env::EnvManager,
    error::{ConfigError, SinkError},
    sink::{
        DynSink,
        console::{ConsoleLock, ConsoleSink},
        database::{DatabaseSink, DbSinkOptions},
        dispatch::Dispatcher,
        file::{DEFAULT_DELIMITER, FileMode, FileSink},
        format::{DEFAULT_SEPARATOR, LineFormatter},
        log::{DEFAULT_LOG_SCOPE, LogLevel, LogSink},
    },
};
use connectors::sql::{
    base::{
        dialect::Postgres,
        query::insert::{DEFAULT_QUERY_TEMPLATE, InsertTemplate, PreparedInsert},
    },
    postgres::{options::PgConnectOptions, session::PgSession},
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::{path::PathBuf, sync::Arc};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct SinksConfig {
    pub sinks: Vec<SinkConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub kind: SinkKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkKind {
    Console(ConsoleConfig),
    Log(LogConfig),
    File(FileConfig),
    Postgres(PostgresConfig),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub show_count: bool,
    #[serde(default)]
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub show_count: bool,
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    pub filename: PathBuf,
    #[serde(default)]
    pub mode: FileMode,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostgresConfig {
    #[serde(flatten)]
    pub connection: PgConnectOptions,
    pub table: String,
    #[serde(default = "default_field_names")]
    pub field_names: Vec<String>,
    #[serde(default)]
    pub field_types: Option<Vec<String>>,
    #[serde(default = "default_query_template")]
    pub query_template: String,
    #[serde(default)]
    pub autocommit: bool,
    #[serde(default)]
    pub commit_threshold: Option<usize>,
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_field_names() -> Vec<String> {
    vec!["username".to_string(), "password".to_string()]
}

fn default_query_template() -> String {
    DEFAULT_QUERY_TEMPLATE.to_string()
}

impl SinksConfig {
    /// Reads, interpolates and validates a configuration file.
    pub fn load(path: impl Into<PathBuf>, env: &EnvManager) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content, env)
    }

    pub fn from_json(content: &str, env: &EnvManager) -> Result<Self, ConfigError> {
        let mut raw: JsonValue = serde_json::from_str(content)?;
        interpolate_value(&mut raw, env)?;
        let config: SinksConfig = serde_json::from_value(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sinks.is_empty() {
            return Err(ConfigError::invalid("<config>", "no sinks configured"));
        }
        for (index, sink) in self.sinks.iter().enumerate() {
            sink.validate(index)?;
        }
        Ok(())
    }

    /// Opens every configured sink and wraps it in its dispatcher.
    pub async fn build(&self) -> Result<Vec<Arc<Dispatcher<DynSink>>>, SinkError> {
        let mut dispatchers = Vec::with_capacity(self.sinks.len());
        for (index, sink) in self.sinks.iter().enumerate() {
            dispatchers.push(Arc::new(sink.build(index).await?));
        }
        Ok(dispatchers)
    }
}

impl SinkConfig {
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SinkKind::Console(_) => "console",
            SinkKind::Log(_) => "log",
            SinkKind::File(_) => "file",
            SinkKind::Postgres(_) => "postgres",
        }
    }

    /// Configured name, or `<type>-<index>`.
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}-{index}", self.type_name()))
    }

    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let name = self.display_name(index);
        match &self.kind {
            SinkKind::Console(_) | SinkKind::Log(_) => Ok(()),
            SinkKind::File(file) => {
                if file.filename.as_os_str().is_empty() {
                    return Err(ConfigError::invalid(name, "filename is empty"));
                }
                if file.delimiter.is_empty() {
                    return Err(ConfigError::invalid(name, "delimiter is empty"));
                }
                Ok(())
            }
            SinkKind::Postgres(pg) => {
                if pg.commit_threshold == Some(0) {
                    return Err(ConfigError::invalid(
                        name,
                        "commit_threshold must be positive",
                    ));
                }
                pg.prepared_insert(&name).map(|_| ())
            }
        }
    }

    pub async fn build(&self, index: usize) -> Result<Dispatcher<DynSink>, SinkError> {
        let name = self.display_name(index);
        info!(sink = %name, kind = self.type_name(), "Building sink");

        let dispatcher = match &self.kind {
            SinkKind::Console(console) => {
                let formatter = line_formatter(
                    console.scope.clone(),
                    console.show_count,
                    console.separator.as_deref(),
                );
                let sink: DynSink = Box::new(ConsoleSink::stdout(name, formatter));
                Dispatcher::with_shared_lock(sink, ConsoleLock::global())
            }
            SinkKind::Log(log) => {
                let scope = log.scope.clone().unwrap_or_else(|| DEFAULT_LOG_SCOPE.to_string());
                let formatter =
                    line_formatter(Some(scope), log.show_count, log.separator.as_deref());
                Dispatcher::new(Box::new(LogSink::new(name, formatter, log.level)) as DynSink)
            }
            SinkKind::File(file) => {
                let sink =
                    FileSink::open(name, &file.filename, file.mode, file.delimiter.clone()).await?;
                Dispatcher::new(Box::new(sink) as DynSink)
            }
            SinkKind::Postgres(pg) => {
                let insert = pg.prepared_insert(&name)?;
                let session = PgSession::connect(&pg.connection, pg.autocommit).await?;
                let options = DbSinkOptions {
                    autocommit: pg.autocommit,
                    commit_threshold: pg.commit_threshold,
                };
                let sink = DatabaseSink::new(name, session, insert, options);
                Dispatcher::new(Box::new(sink) as DynSink)
            }
        };
        Ok(dispatcher)
    }
}

impl PostgresConfig {
    pub fn template(&self) -> InsertTemplate {
        let template = InsertTemplate::new(self.table.clone(), self.field_names.clone())
            .with_template(self.query_template.clone());
        match &self.field_types {
            Some(types) => template.with_field_types(types.clone()),
            None => template,
        }
    }

    pub fn prepared_insert(&self, sink: &str) -> Result<PreparedInsert, ConfigError> {
        if self.table.trim().is_empty() {
            return Err(ConfigError::invalid(sink, "table is empty"));
        }
        self.template()
            .compile(&Postgres)
            .map_err(|err| ConfigError::invalid(sink, err.to_string()))
    }
}

fn line_formatter(
    scope: Option<String>,
    show_count: bool,
    separator: Option<&str>,
) -> LineFormatter {
    LineFormatter::new()
        .with_scope(scope)
        .with_count(show_count)
        .with_separator(separator.unwrap_or(DEFAULT_SEPARATOR))
}

/// Resolves `${NAME}` references in every string of `value`. Substituted
/// values stay strings.
fn interpolate_value(value: &mut JsonValue, env: &EnvManager) -> Result<(), ConfigError> {
    match value {
        JsonValue::String(text) if text.contains("${") => {
            *text = env.interpolate(text)?;
        }
        JsonValue::Array(items) => {
            for item in items {
                interpolate_value(item, env)?;
            }
        }
        JsonValue::Object(map) => {
            for item in map.values_mut() {
                interpolate_value(item, env)?;
            }
        }
        _ => {}
    }
    Ok(())
}
