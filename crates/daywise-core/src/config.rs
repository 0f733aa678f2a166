use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

/// Environment variable consulted when `model.api_key` is unset.
pub const MODEL_API_KEY_ENV: &str = "DAYWISE_MODEL_API_KEY";

/// Environment variable consulted when `calendar.access_token` is unset.
pub const CALENDAR_TOKEN_ENV: &str = "DAYWISE_CALENDAR_TOKEN";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a single-line summary of all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Schedule document store
    pub store: StoreConfig,

    /// Generative model endpoint used for rescheduling
    #[serde(default)]
    pub model: ModelConfig,

    /// External calendar kept in sync with the schedule
    #[serde(default)]
    pub calendar: CalendarConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database holding the schedule documents
    pub database_path: PathBuf,

    /// `_id` of the document tracked by this installation
    #[serde(default = "default_document_id")]
    pub document_id: String,
}

fn default_document_id() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API, including the version segment
    #[serde(default = "default_model_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model_name")]
    pub model: String,

    /// API key (optional here, can be set via environment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,
}

fn default_model_base_url() -> String {
    "https://api.sambanova.ai/v1".to_string()
}

fn default_model_name() -> String {
    "Meta-Llama-3.1-8B-Instruct".to_string()
}

fn default_model_timeout() -> u64 {
    60
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base_url(),
            model: default_model_name(),
            api_key: None,
            timeout_secs: default_model_timeout(),
        }
    }
}

impl ModelConfig {
    /// API key from config, falling back to the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(MODEL_API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Google Calendar v3 API root
    #[serde(default = "default_calendar_base_url")]
    pub base_url: String,

    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,

    /// OAuth access token (optional here, can be set via environment)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// IANA timezone the schedule's wall-clock times are written in
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

fn default_calendar_base_url() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            base_url: default_calendar_base_url(),
            calendar_id: default_calendar_id(),
            access_token: None,
            timezone: default_timezone(),
        }
    }
}

impl CalendarConfig {
    /// Access token from config, falling back to the environment.
    pub fn resolved_access_token(&self) -> Option<String> {
        self.access_token
            .clone()
            .filter(|t| !t.is_empty())
            .or_else(|| std::env::var(CALENDAR_TOKEN_ENV).ok().filter(|t| !t.is_empty()))
    }

    /// Parsed timezone.
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", self.timezone, e))
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("daywise");

        Self {
            store: StoreConfig {
                database_path: config_dir.join("daywise.db"),
                document_id: default_document_id(),
            },
            config_dir,
            model: ModelConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path, writing defaults there if it is missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load from an explicit path, or the default location when `None`
    pub fn load_at(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        }
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated(config_path: Option<&Path>) -> Result<(Self, ValidationResult)> {
        let config = Self::load_at(config_path)?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        if self.store.document_id.trim().is_empty() {
            result.add_error("store.document_id", "Document id must not be empty");
        }

        self.validate_url(&self.model.base_url, "model.base_url", &mut result);
        self.validate_url(&self.calendar.base_url, "calendar.base_url", &mut result);

        if self.model.model.trim().is_empty() {
            result.add_error("model.model", "Model name must not be empty");
        }

        if self.model.timeout_secs == 0 {
            result.add_error("model.timeout_secs", "Timeout must be greater than 0");
        }

        if self.model.resolved_api_key().is_none() {
            result.add_warning(
                "model.api_key",
                format!("No API key configured (set {})", MODEL_API_KEY_ENV),
            );
        }

        if self.calendar.calendar_id.trim().is_empty() {
            result.add_error("calendar.calendar_id", "Calendar id must not be empty");
        }

        if let Err(e) = self.calendar.tz() {
            result.add_error("calendar.timezone", e.to_string());
        }

        if self.calendar.resolved_access_token().is_none() {
            result.add_warning(
                "calendar.access_token",
                format!(
                    "No calendar token configured (set {}); calendar sync will fail",
                    CALENDAR_TOKEN_ENV
                ),
            );
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to(&config_path)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("daywise");

        Ok(config_dir.join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        // Missing credentials are warnings, not errors
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.model.base_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "model.base_url"));
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
    }

    #[test]
    fn test_invalid_calendar_url() {
        let mut config = Config::default();
        config.calendar.base_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(result.errors.iter().any(|e| e.field == "calendar.base_url"));
    }

    #[test]
    fn test_unknown_timezone() {
        let mut config = Config::default();
        config.calendar.timezone = "Mars/Olympus".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "calendar.timezone"));
    }

    #[test]
    fn test_known_timezone_parses() {
        let mut config = Config::default();
        config.calendar.timezone = "Europe/Berlin".to_string();
        assert!(config.calendar.tz().is_ok());
    }

    #[test]
    fn test_sampling_keys_are_not_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
config_dir = "/tmp/daywise"

[store]
database_path = "/tmp/daywise/daywise.db"

[model]
temperature = 0.9
top_p = 1.0
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(config.validate().is_valid());
        let saved = toml::to_string_pretty(&config).unwrap();
        assert!(!saved.contains("temperature"));
        assert!(!saved.contains("top_p"));
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_dir = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_load_validated_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.calendar.timezone = "Mars/Olympus".to_string();
        config.save_to(&path).unwrap();

        let err = Config::load_validated(Some(&path)).unwrap_err();
        assert!(
            matches!(
                err.downcast_ref::<ConfigError>(),
                Some(ConfigError::Invalid(summary)) if summary.contains("calendar.timezone")
            ),
            "unexpected error: {err:#}"
        );
    }

    #[test]
    fn test_configured_key_wins_over_environment() {
        let mut config = ModelConfig::default();
        config.api_key = Some("from-config".to_string());
        assert_eq!(config.resolved_api_key().as_deref(), Some("from-config"));
    }

    #[test]
    fn test_load_from_creates_defaults_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());

        let mut edited = created.clone();
        edited.store.document_id = "alice".to_string();
        edited.calendar.timezone = "America/New_York".to_string();
        edited.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.store.document_id, "alice");
        assert_eq!(reloaded.calendar.timezone, "America/New_York");
        assert_eq!(reloaded.model.model, "Meta-Llama-3.1-8B-Instruct");
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
config_dir = "/tmp/daywise"

[store]
database_path = "/tmp/daywise/daywise.db"
"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.store.document_id, "default");
        assert_eq!(config.calendar.calendar_id, "primary");
        assert_eq!(config.calendar.timezone, "UTC");
        assert_eq!(config.model.timeout_secs, 60);
    }

    #[test]
    fn test_validation_result_error_summary() {
        let mut result = ValidationResult::default();
        result.add_error("field1", "error1");
        result.add_error("field2", "error2");
        let summary = result.error_summary();
        assert!(summary.contains("field1"));
        assert!(summary.contains("field2"));
    }
}
