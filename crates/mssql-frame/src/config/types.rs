//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection.
    pub connection: ConnectionConfig,

    /// Write behavior.
    #[serde(default)]
    pub write: WriteConfig,
}

/// SQL Server connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    pub password: String,

    /// Encrypt connection (default: "true").
    #[serde(default = "default_true_string")]
    pub encrypt: String,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Application name reported to the server.
    #[serde(default)]
    pub application_name: Option<String>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("application_name", &self.application_name)
            .finish()
    }
}

/// Write behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteConfig {
    /// Maintain `_time_insert` and `_time_update` columns (default: false).
    #[serde(default)]
    pub include_metadata_timestamps: bool,

    /// Rows per INSERT statement, 1 to 1000 (default: 1000).
    #[serde(default = "default_max_rows_per_statement")]
    pub max_rows_per_statement: usize,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            include_metadata_timestamps: false,
            max_rows_per_statement: default_max_rows_per_statement(),
        }
    }
}

fn default_mssql_port() -> u16 {
    1433
}

fn default_true_string() -> String {
    "true".to_string()
}

fn default_max_rows_per_statement() -> usize {
    1000
}
