//! TOML configuration file parsing and loading
//!
//! The default file lives at `<config dir>/DakEngine/dak-engine.toml`. All keys
//! are optional and kebab-case; command-line flags are applied on top.

use super::args::Args;
use crate::remote::github::DEFAULT_API_URL;
use crate::scanner::probe::{DEFAULT_MARKER_PATH, DEFAULT_REQUIRED_IDENTIFIER};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR_NAME: &str = "DakEngine";
const CONFIG_FILE_NAME: &str = "dak-engine.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file does not exist: {0}")]
    Missing(PathBuf),

    #[error("Cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    Invalid { key: String, message: String },
}

impl crate::core::error_handling::ContextualError for ConfigError {
    fn is_user_actionable(&self) -> bool {
        true
    }

    fn user_message(&self) -> Option<String> {
        Some(self.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Effective settings after merging defaults, the config file and flags
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    pub token_env: String,
    pub requests_per_second: u32,
    pub probe_concurrency: usize,
    pub probe_timeout_secs: u64,
    pub scan_cache_ttl_secs: u64,
    pub branch_cache_ttl_secs: u64,
    pub marker_path: String,
    pub required_identifier: String,
    pub data_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub log_file: Option<PathBuf>,
    pub color: Option<bool>,
    pub ephemeral: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token_env: "GITHUB_TOKEN".to_string(),
            requests_per_second: 10,
            probe_concurrency: 5,
            probe_timeout_secs: 10,
            scan_cache_ttl_secs: 300,
            branch_cache_ttl_secs: 300,
            marker_path: DEFAULT_MARKER_PATH.to_string(),
            required_identifier: DEFAULT_REQUIRED_IDENTIFIER.to_string(),
            data_dir: dirs::data_local_dir().map(|d| d.join(APP_DIR_NAME)),
            log_level: None,
            log_format: Some("text".to_string()),
            log_file: None,
            color: None,
            ephemeral: false,
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR_NAME).join(CONFIG_FILE_NAME))
}

impl Settings {
    /// Load settings for `args`: defaults, then the config file, then flags
    pub async fn load(args: &Args) -> ConfigResult<Self> {
        let mut settings = Self::default();
        if let Some(config) = Self::read_config_file(args.config_file.as_deref()).await? {
            settings.apply_toml_values(&config)?;
        }
        settings.apply_args(args);
        settings.validate()?;
        Ok(settings)
    }

    /// Read the explicit config file (which must exist) or the default one (if present)
    async fn read_config_file(explicit: Option<&Path>) -> ConfigResult<Option<toml::Table>> {
        let path = match explicit {
            Some(path) if !path.exists() => return Err(ConfigError::Missing(path.to_path_buf())),
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(None),
            },
        };

        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
        let table = toml::from_str::<toml::Table>(&contents).map_err(|e| ConfigError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(Some(table))
    }

    /// Apply TOML configuration values
    pub fn apply_toml_values(&mut self, config: &toml::Table) -> ConfigResult<()> {
        if let Some(v) = string_value(config, "api-url")? {
            self.api_url = v;
        }
        if let Some(v) = string_value(config, "token-env")? {
            self.token_env = v;
        }
        if let Some(v) = integer_value(config, "requests-per-second")? {
            self.requests_per_second = u32::try_from(v)
                .map_err(|_| invalid("requests-per-second", "value too large"))?;
        }
        if let Some(v) = integer_value(config, "probe-concurrency")? {
            self.probe_concurrency = v as usize;
        }
        if let Some(v) = integer_value(config, "probe-timeout-secs")? {
            self.probe_timeout_secs = v;
        }
        if let Some(v) = integer_value(config, "scan-cache-ttl-secs")? {
            self.scan_cache_ttl_secs = v;
        }
        if let Some(v) = integer_value(config, "branch-cache-ttl-secs")? {
            self.branch_cache_ttl_secs = v;
        }
        if let Some(v) = string_value(config, "marker-path")? {
            self.marker_path = v;
        }
        if let Some(v) = string_value(config, "required-identifier")? {
            self.required_identifier = v;
        }
        if let Some(v) = string_value(config, "data-dir")? {
            self.data_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = string_value(config, "log-level")? {
            self.log_level = Some(v);
        }
        if let Some(v) = string_value(config, "log-format")? {
            self.log_format = Some(v);
        }
        if let Some(log_file) = string_value(config, "log-file")? {
            // "none" and "-" disable file logging
            self.log_file = if log_file.eq_ignore_ascii_case("none") || log_file == "-" {
                None
            } else {
                Some(PathBuf::from(log_file))
            };
        }
        if let Some(value) = config.get("color") {
            let color = value
                .as_bool()
                .ok_or_else(|| invalid("color", "expected a boolean"))?;
            self.color = Some(color);
        }
        Ok(())
    }

    /// Apply command-line flags, which take precedence over the file
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(level) = &args.log_level {
            self.log_level = Some(level.clone());
        }
        if let Some(format) = &args.log_format {
            self.log_format = Some(format.clone());
        }
        if let Some(file) = &args.log_file {
            self.log_file = match file.to_str() {
                Some(s) if s.eq_ignore_ascii_case("none") || s == "-" => None,
                _ => Some(file.clone()),
            };
        }
        if let Some(color) = args.color_override() {
            self.color = Some(color);
        }
        self.ephemeral |= args.ephemeral;
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.requests_per_second == 0 {
            return Err(invalid("requests-per-second", "must be greater than 0"));
        }
        if self.probe_concurrency == 0 {
            return Err(invalid("probe-concurrency", "must be greater than 0"));
        }
        if self.probe_timeout_secs == 0 {
            return Err(invalid("probe-timeout-secs", "must be greater than 0"));
        }
        if self.marker_path.trim().is_empty() {
            return Err(invalid("marker-path", "cannot be empty"));
        }
        if self.required_identifier.trim().is_empty() {
            return Err(invalid("required-identifier", "cannot be empty"));
        }
        if let Some(format) = &self.log_format {
            if !["text", "ext", "json"].contains(&format.as_str()) {
                return Err(invalid("log-format", "expected one of text, ext, json"));
            }
        }
        if !self.ephemeral && self.data_dir.is_none() {
            return Err(invalid(
                "data-dir",
                "no local data directory available; set data-dir or use --ephemeral",
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// API token from the configured environment variable, if set
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        message: message.to_string(),
    }
}

fn string_value(config: &toml::Table, key: &str) -> ConfigResult<Option<String>> {
    match config.get(key) {
        None => Ok(None),
        Some(value) => value
            .as_str()
            .map(|s| Some(s.to_string()))
            .ok_or_else(|| invalid(key, "expected a string")),
    }
}

fn integer_value(config: &toml::Table, key: &str) -> ConfigResult<Option<u64>> {
    match config.get(key) {
        None => Ok(None),
        Some(value) => {
            let n = value
                .as_integer()
                .ok_or_else(|| invalid(key, "expected an integer"))?;
            u64::try_from(n)
                .map(Some)
                .map_err(|_| invalid(key, "must not be negative"))
        }
    }
}
