//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl ConnectionConfig {
    /// Whether the connection must be encrypted.
    pub fn encryption_required(&self) -> bool {
        !matches!(
            self.encrypt.to_lowercase().as_str(),
            "false" | "no" | "0" | "disable"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
connection:
  host: db.internal
  database: sales
  user: loader
  password: secret
"#;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.connection.port, 1433);
        assert!(config.connection.encryption_required());
        assert!(!config.connection.trust_server_cert);
        assert!(!config.write.include_metadata_timestamps);
        assert_eq!(config.write.max_rows_per_statement, 1000);
    }

    #[test]
    fn test_write_section() {
        let yaml = format!(
            "{}write:\n  include_metadata_timestamps: true\n  max_rows_per_statement: 250\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert!(config.write.include_metadata_timestamps);
        assert_eq!(config.write.max_rows_per_statement, 250);
    }

    #[test]
    fn test_encryption_disabled() {
        let yaml = MINIMAL.replace("password: secret", "password: secret\n  encrypt: disable");
        let config = Config::from_yaml(&yaml).unwrap();
        assert!(!config.connection.encryption_required());
    }

    #[test]
    fn test_missing_field_is_yaml_error() {
        let err = Config::from_yaml("connection:\n  host: x\n").unwrap_err();
        assert!(matches!(err, crate::error::FrameError::Yaml(_)));
    }
}
