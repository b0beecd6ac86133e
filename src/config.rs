//! Configuration for the Telegram and Google Drive clients
//!
//! Values come from the environment (a `.env` file is loaded first) and may
//! also be given in an optional `config.yml`. Environment variables take
//! precedence; YAML values of the form `${VAR}` are resolved from the
//! environment.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Suffix of persisted Telegram session files.
pub const SESSION_EXTENSION: &str = "session";
pub const DEFAULT_SESSIONS_DIR: &str = ".";
pub const DEFAULT_LOG_DIR: &str = ".";
pub const CONFIG_FILE: &str = "config.yml";

/// YAML config structures
#[derive(Debug, Default, Deserialize)]
struct YamlConfig {
    telegram: Option<TelegramConfig>,
    drive: Option<DriveConfig>,
    sessions_dir: Option<String>,
    log_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramConfig {
    #[serde(default, deserialize_with = "deserialize_string_or_number")]
    api_id: Option<String>,
    api_hash: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DriveConfig {
    credentials_path: Option<String>,
    folder_id: Option<String>,
}

/// Deserialize a value that can be either a string or a number
fn deserialize_string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value: Option<serde_yaml::Value> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(serde_yaml::Value::String(s)) => Ok(Some(s)),
        Some(serde_yaml::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {:?}",
            other
        ))),
    }
}

/// Runtime configuration, passed explicitly to the clients and the exporter.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_id: i32,
    pub api_hash: String,
    pub google_credentials_path: PathBuf,
    pub drive_folder_id: String,
    pub sessions_dir: PathBuf,
    pub log_dir: PathBuf,
    pub metrics_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_yaml(YamlConfig::default())
    }
}

impl Config {
    /// Load `.env`, then `config.yml` (current or parent directory) if present,
    /// otherwise the environment alone.
    pub fn load() -> Self {
        Self::load_dotenv();
        Self::load_from_file(CONFIG_FILE)
            .or_else(|_| Self::load_from_file(Path::new("..").join(CONFIG_FILE)))
            .unwrap_or_else(|_| Self::from_env())
    }

    /// Build configuration from environment variables only.
    pub fn from_env() -> Self {
        Self::from_yaml(YamlConfig::default())
    }

    /// Load configuration from a specific YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> std::result::Result<Self, String> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let yaml: YamlConfig = serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file: {}", e))?;

        Ok(Self::from_yaml(yaml))
    }

    fn from_yaml(yaml: YamlConfig) -> Self {
        let telegram = yaml.telegram.unwrap_or_default();
        let drive = yaml.drive.unwrap_or_default();

        let api_id = Self::resolve_env_i32(telegram.api_id, "API_ID");
        let api_hash = Self::resolve_env_string(telegram.api_hash, "API_HASH");
        let credentials = Self::resolve_env_string(drive.credentials_path, "GOOGLE_CREDENTIALS_PATH");
        let folder_id = Self::resolve_env_string(drive.folder_id, "DRIVE_FOLDER_ID");

        let sessions_dir = Self::resolve_env_string(yaml.sessions_dir, "SESSIONS_DIR");
        let log_dir = Self::resolve_env_string(yaml.log_dir, "LOG_DIR");

        Self {
            api_id,
            api_hash,
            google_credentials_path: PathBuf::from(credentials),
            drive_folder_id: folder_id,
            sessions_dir: PathBuf::from(non_empty_or(sessions_dir, DEFAULT_SESSIONS_DIR)),
            log_dir: PathBuf::from(non_empty_or(log_dir, DEFAULT_LOG_DIR)),
            metrics_addr: std::env::var("METRICS_ADDR").ok().filter(|v| !v.is_empty()),
        }
    }

    /// Resolve a value: prefer env var if config value looks like ${VAR}
    fn resolve_env_string(value: Option<String>, env_key: &str) -> String {
        if let Some(var_name) = value.as_deref().and_then(placeholder_name) {
            if let Ok(env_val) = std::env::var(var_name) {
                return env_val;
            }
        }
        if let Ok(env_val) = std::env::var(env_key) {
            return env_val;
        }
        match value {
            Some(v) if placeholder_name(&v).is_some() => String::new(),
            Some(v) => v,
            None => String::new(),
        }
    }

    /// Resolve an integer value from string config or env var
    fn resolve_env_i32(value: Option<String>, env_key: &str) -> i32 {
        Self::resolve_env_string(value, env_key)
            .trim()
            .parse::<i32>()
            .unwrap_or(0)
    }

    /// Load .env file into environment variables using dotenvy
    fn load_dotenv() {
        if dotenvy::dotenv().is_err() {
            let _ = dotenvy::from_filename("../.env");
        }
    }

    /// Check that everything needed for a run is present.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.api_id == 0 {
            missing.push("API_ID");
        }
        if self.api_hash.is_empty() {
            missing.push("API_HASH");
        }
        if self.google_credentials_path.as_os_str().is_empty() {
            missing.push("GOOGLE_CREDENTIALS_PATH");
        }
        if self.drive_folder_id.is_empty() {
            missing.push("DRIVE_FOLDER_ID");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "missing configuration: {}",
                missing.join(", ")
            )))
        }
    }
}

fn placeholder_name(value: &str) -> Option<&str> {
    value.strip_prefix("${").and_then(|v| v.strip_suffix('}'))
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value
    }
}
