use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tokio_postgres::{Config, config::SslMode};

pub const DEFAULT_PORT: u16 = 5432;
const APPLICATION_NAME: &str = "credsink";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SslPreference {
    Disable,
    #[default]
    Prefer,
    Require,
}

/// Connection parameters for a PostgreSQL session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgConnectOptions {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub ssl_mode: SslPreference,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl PgConnectOptions {
    pub fn new(database: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            database: database.into(),
            username: username.into(),
            password: None,
            ssl_mode: SslPreference::default(),
            connect_timeout_secs: None,
        }
    }

    pub fn to_config(&self) -> Config {
        let mut config = Config::new();
        config
            .host(&self.host)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username)
            .application_name(APPLICATION_NAME)
            .ssl_mode(match self.ssl_mode {
                SslPreference::Disable => SslMode::Disable,
                SslPreference::Prefer => SslMode::Prefer,
                SslPreference::Require => SslMode::Require,
            });
        if let Some(password) = &self.password {
            config.password(password);
        }
        if let Some(secs) = self.connect_timeout_secs {
            config.connect_timeout(Duration::from_secs(secs));
        }
        config
    }

    /// Connection target suitable for logs; never includes the password.
    pub fn display_target(&self) -> String {
        format!(
            "postgres://{}@{}:{}/{}",
            self.username, self.host, self.port, self.database
        )
    }
}

impl fmt::Debug for PgConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnectOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("ssl_mode", &self.ssl_mode)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}
