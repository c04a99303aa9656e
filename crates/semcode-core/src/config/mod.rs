mod env;
mod types;


pub use types::*;

use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if
    /// the merged result fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_owned()));
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be at least 1");
        }
        if self.embedding.timeout_secs == 0 {
            return invalid("embedding.timeout_secs must be at least 1");
        }
        if self.embedding.model.trim().is_empty() {
            return invalid("embedding.model must not be empty");
        }
        if self.vector_store.collection.trim().is_empty() {
            return invalid("vector_store.collection must not be empty");
        }
        if self.vector_store.timeout_secs == 0 {
            return invalid("vector_store.timeout_secs must be at least 1");
        }
        if self.fetcher.timeout_secs == 0 {
            return invalid("fetcher.timeout_secs must be at least 1");
        }
        if self.classifier.max_file_size_mb == 0 {
            return invalid("classifier.max_file_size_mb must be at least 1");
        }
        if self.classifier.extensions.is_empty() {
            return invalid("classifier.extensions must not be empty");
        }
        if self.storage.registry_file.trim().is_empty() {
            return invalid("storage.registry_file must not be empty");
        }
        Ok(())
    }
}
