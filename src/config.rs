use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file looked up next to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "survey-capture.toml";

/// Application settings loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// Root directory for captured photos
    pub photo_dir: PathBuf,
    /// Base URL of the upload service
    pub server_url: String,
    /// Seconds between background sync cycles
    pub sync_interval_secs: u64,
    /// Parallel uploads per cycle
    pub upload_workers: usize,
    /// Attempts before a photo is abandoned
    pub max_upload_attempts: u32,
    /// First retry delay, doubled per failed attempt
    pub backoff_base_secs: u64,
    /// Upper bound for the retry delay
    pub backoff_max_secs: u64,
    /// HTTP timeout per request
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("./data/survey.db"),
            photo_dir: PathBuf::from("./data/photos"),
            server_url: "http://10.0.2.2:5000".to_string(),
            sync_interval_secs: 30,
            upload_workers: 3,
            max_upload_attempts: 5,
            backoff_base_secs: 60,
            backoff_max_secs: 900,
            request_timeout_secs: 30,
        }
    }
}

impl AppConfig {
    /// Parses a TOML document; missing keys fall back to defaults
    pub fn from_toml(s: &str) -> Result<Self, AppError> {
        let config: AppConfig =
            toml::from_str(s).map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config file, or the defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.upload_workers == 0 {
            return Err(AppError::Config("upload_workers must be at least 1".to_string()));
        }
        if self.sync_interval_secs == 0 {
            return Err(AppError::Config(
                "sync_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.max_upload_attempts == 0 {
            return Err(AppError::Config(
                "max_upload_attempts must be at least 1".to_string(),
            ));
        }
        if self.backoff_max_secs < self.backoff_base_secs {
            return Err(AppError::Config(
                "backoff_max_secs must not be below backoff_base_secs".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn retry_policy(&self) -> crate::services::upload_service::RetryPolicy {
        crate::services::upload_service::RetryPolicy {
            max_attempts: self.max_upload_attempts,
            base_delay: Duration::from_secs(self.backoff_base_secs),
            max_delay: Duration::from_secs(self.backoff_max_secs),
            workers: self.upload_workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = AppConfig::from_toml(
            r#"
            server_url = "https://survey.example.org"
            max_upload_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.server_url, "https://survey.example.org");
        assert_eq!(config.max_upload_attempts, 3);
        assert_eq!(config.upload_workers, 3);
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(AppConfig::from_toml("upload_workers = 0").is_err());
        assert!(AppConfig::from_toml("sync_interval_secs = 0").is_err());
        assert!(AppConfig::from_toml("backoff_base_secs = 100\nbackoff_max_secs = 10").is_err());
        assert!(AppConfig::from_toml("server_url = 5").is_err());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/survey-capture.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }
}
