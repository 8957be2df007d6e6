//! Configuration validation.

use super::Config;
use crate::error::{FrameError, Result};
use crate::write::insert::MAX_ROWS_PER_STATEMENT;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Connection validation
    if config.connection.host.is_empty() {
        return Err(FrameError::Config("connection.host is required".into()));
    }
    if config.connection.database.is_empty() {
        return Err(FrameError::Config("connection.database is required".into()));
    }
    if config.connection.user.is_empty() {
        return Err(FrameError::Config("connection.user is required".into()));
    }

    let rows = config.write.max_rows_per_statement;
    if rows == 0 || rows > MAX_ROWS_PER_STATEMENT {
        return Err(FrameError::Config(format!(
            "write.max_rows_per_statement must be between 1 and {}, got {}",
            MAX_ROWS_PER_STATEMENT, rows
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, WriteConfig};

    fn valid_config() -> Config {
        Config {
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "sales".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                encrypt: "false".to_string(),
                trust_server_cert: true,
                application_name: None,
            },
            write: WriteConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.connection.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_user() {
        let mut config = valid_config();
        config.connection.user = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_statement_row_limit() {
        let mut config = valid_config();
        config.write.max_rows_per_statement = 0;
        assert!(validate(&config).is_err());
        config.write.max_rows_per_statement = 1001;
        assert!(validate(&config).is_err());
        config.write.max_rows_per_statement = 1000;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_connection_config_debug_redacts_password() {
        let mut config = valid_config();
        config.connection.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.connection);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }
}
