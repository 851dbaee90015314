//! Configuration management for Schedcast

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub publish: Option<PublishConfig>,
    #[serde(default)]
    pub calendar: CalendarConfig,
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Where and how to reach the publish service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// IANA zone name used to read and write times of day
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    pub owner_id: String,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_token_env() -> String {
    "SCHEDCAST_TOKEN".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/schedcast/posts.db".to_string(),
            },
            publish: None,
            calendar: CalendarConfig::default(),
            defaults: DefaultsConfig {
                owner_id: "default".to_string(),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.defaults.owner_id.trim().is_empty() {
            return Err(ConfigError::MissingField("defaults.owner_id".to_string()).into());
        }
        if let Some(publish) = &self.publish {
            if publish.endpoint.trim().is_empty() {
                return Err(ConfigError::MissingField("publish.endpoint".to_string()).into());
            }
            if publish.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "publish.timeout_secs".to_string(),
                    reason: "must be greater than zero".to_string(),
                }
                .into());
            }
        }
        self.timezone()?;
        Ok(())
    }

    /// Parsed calendar time zone
    pub fn timezone(&self) -> Result<Tz> {
        self.calendar.timezone.parse::<Tz>().map_err(|_| {
            ConfigError::InvalidValue {
                field: "calendar.timezone".to_string(),
                reason: format!("unknown zone '{}'", self.calendar.timezone),
            }
            .into()
        })
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SCHEDCAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("schedcast").join("config.toml"))
}

/// Resolve the database path
///
/// `SCHEDCAST_DB_PATH` wins over the configured value; `~` is expanded.
pub fn resolve_db_path(configured: Option<&str>) -> Result<PathBuf> {
    if let Ok(path) = std::env::var("SCHEDCAST_DB_PATH") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    match configured {
        Some(path) => Ok(PathBuf::from(shellexpand::tilde(path).to_string())),
        None => Ok(resolve_data_path()?.join("posts.db")),
    }
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("schedcast"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SchedcastError;
    use serial_test::serial;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_load_minimal_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[database]
path = "/tmp/schedcast.db"

[defaults]
owner_id = "owner-1"
"#,
        );

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.database.path, "/tmp/schedcast.db");
        assert!(config.publish.is_none());
        assert_eq!(config.calendar.timezone, "UTC");
        assert_eq!(config.timezone().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_load_full_config() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"
[database]
path = "~/posts.db"

[publish]
endpoint = "https://publish.example.com/v1/posts"

[calendar]
timezone = "Europe/Berlin"

[defaults]
owner_id = "owner-1"
"#,
        );

        let config = Config::load_from_path(&path).unwrap();
        let publish = config.publish.as_ref().unwrap();
        assert_eq!(publish.timeout_secs, 30);
        assert_eq!(publish.token_env, "SCHEDCAST_TOKEN");
        assert_eq!(config.timezone().unwrap(), chrono_tz::Europe::Berlin);
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let mut config = Config::default_config();
        config.calendar.timezone = "Mars/Olympus".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            SchedcastError::Config(ConfigError::InvalidValue { .. })
        ));
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_empty_owner_rejected() {
        let mut config = Config::default_config();
        config.defaults.owner_id = "  ".to_string();

        assert!(matches!(
            config.validate(),
            Err(SchedcastError::Config(ConfigError::MissingField(_)))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default_config();
        config.publish = Some(PublishConfig {
            endpoint: "http://localhost:9000".to_string(),
            timeout_secs: 0,
            token_env: default_token_env(),
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = Config::load_from_path(Path::new("/nonexistent/schedcast/config.toml"));
        assert!(matches!(
            result,
            Err(SchedcastError::Config(ConfigError::ReadError(_)))
        ));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, "[database\npath = ");

        assert!(matches!(
            Config::load_from_path(&path),
            Err(SchedcastError::Config(ConfigError::ParseError(_)))
        ));
    }

    #[test]
    #[serial]
    fn test_config_path_env_override() {
        std::env::set_var("SCHEDCAST_CONFIG", "/tmp/custom/config.toml");
        let path = resolve_config_path().unwrap();
        std::env::remove_var("SCHEDCAST_CONFIG");

        assert_eq!(path, PathBuf::from("/tmp/custom/config.toml"));
    }

    #[test]
    #[serial]
    fn test_db_path_env_override_wins() {
        std::env::set_var("SCHEDCAST_DB_PATH", "/tmp/override.db");
        let path = resolve_db_path(Some("/tmp/configured.db")).unwrap();
        std::env::remove_var("SCHEDCAST_DB_PATH");

        assert_eq!(path, PathBuf::from("/tmp/override.db"));
    }

    #[test]
    #[serial]
    fn test_db_path_uses_configured_value() {
        std::env::remove_var("SCHEDCAST_DB_PATH");
        let path = resolve_db_path(Some("/tmp/configured.db")).unwrap();

        assert_eq!(path, PathBuf::from("/tmp/configured.db"));
    }
}
