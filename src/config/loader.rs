//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::AppConfig;
use super::validation::Validator;
use std::path::Path;
use tracing::warn;

/// Configuration loader with validation support.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file does not exist
    /// - The file cannot be read
    /// - The TOML is malformed
    /// - Validation fails
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<AppConfig> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        self.load_str(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<AppConfig> {
        let config: AppConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Load configuration or fall back to defaults if the file doesn't exist.
    ///
    /// Defaults go through the same validators as a loaded file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if validation fails.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<AppConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            self.validated(AppConfig::default())
        }
    }

    /// Run all registered validators over an already built configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] listing every error found.
    pub fn validated(&self, config: AppConfig) -> ConfigResult<AppConfig> {
        self.validate(&config)?;
        Ok(config)
    }

    /// Validate a configuration against all registered validators.
    fn validate(&self, config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        for validator in &self.validators {
            let result = validator.validate(config);
            for warning in result.warnings() {
                warn!(field = %warning.field, "{}", warning.message);
            }
            errors.extend(result.errors_only().iter().map(|e| e.message.clone()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors.join("; ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasicValidator;
    use tempfile::tempdir;

    #[test]
    fn test_load_from_string() {
        let loader = ConfigLoader::new();
        let config = loader
            .load_str(
                r#"
            [relay]
            name = "test"
        "#,
            )
            .unwrap();
        assert_eq!(config.relay.name, "test");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("relay.toml");

        std::fs::write(
            &config_path,
            r#"
            [relay]
            name = "file-test"
            upstream_port = 9443
        "#,
        )
        .unwrap();

        let loader = ConfigLoader::new().with_validator(BasicValidator::new());
        let config = loader.load(&config_path).unwrap();
        assert_eq!(config.relay.name, "file-test");
        assert_eq!(config.relay.upstream_port, 9443);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loader = ConfigLoader::new();
        let result = loader.load("/nonexistent/path/relay.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_malformed() {
        let loader = ConfigLoader::new();
        let result = loader.load_str("[relay\nname = ");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_invalid_rejected() {
        let loader = ConfigLoader::new().with_validator(BasicValidator::new());
        let result = loader.load_str(
            r#"
            [relay]
            upstream_port = 0
            buffer_size = 0
        "#,
        );

        match result {
            Err(ConfigError::ValidationError(message)) => {
                assert!(message.contains("Upstream port"));
                assert!(message.contains("Buffer size"));
            },
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_load_or_default() {
        let loader = ConfigLoader::new().with_validator(BasicValidator::new());
        let config = loader.load_or_default("/nonexistent/path").unwrap();
        assert_eq!(config.relay.name, "tcp-relay");
    }

    #[test]
    fn test_load_or_default_reads_existing_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("relay.toml");
        std::fs::write(&config_path, "[logging]\nlevel = \"trace\"\n").unwrap();

        let config = ConfigLoader::new().load_or_default(&config_path).unwrap();
        assert_eq!(config.logging.level, crate::config::LogLevel::Trace);
    }
}
