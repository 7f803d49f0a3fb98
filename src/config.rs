// ⚙️ Configuration - defaults, optional TOML file, environment overrides
//
// Later layers win: built-in defaults, then the file named by CAPTABLE_CONFIG
// (or ./captable.toml when present), then individual CAPTABLE_* variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_ENV: &str = "CAPTABLE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "captable.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// SQLite file
    pub database_path: PathBuf,

    /// API server listen address
    pub bind_addr: String,

    /// Recorded as the actor of every audit event
    pub actor: String,

    /// tracing EnvFilter directive, e.g. "info,captable_ledger=debug"
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from("captable.db"),
            bind_addr: "127.0.0.1:3000".to_string(),
            actor: "operator".to_string(),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Full layered load from the process environment
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut config = match explicit {
            Some(path) => AppConfig::from_file(&path)?,
            None => {
                let local = Path::new(DEFAULT_CONFIG_FILE);
                if local.exists() {
                    AppConfig::from_file(local)?
                } else {
                    AppConfig::default()
                }
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overlaid with a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply CAPTABLE_DB / CAPTABLE_BIND / CAPTABLE_ACTOR / CAPTABLE_LOG
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("CAPTABLE_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(bind) = lookup("CAPTABLE_BIND") {
            self.bind_addr = bind;
        }
        if let Some(actor) = lookup("CAPTABLE_ACTOR") {
            self.actor = actor;
        }
        if let Some(filter) = lookup("CAPTABLE_LOG") {
            self.log_filter = filter;
        }
        self.validate()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.actor.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "actor",
                message: "must not be empty".to_string(),
            });
        }
        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                key: "bind_addr",
                message: format!("'{}' is not a socket address", self.bind_addr),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database_path, PathBuf::from("captable.db"));
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overlays_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = \"/var/lib/captable/ledger.db\"").unwrap();
        writeln!(file, "actor = \"cfo\"").unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/captable/ledger.db"));
        assert_eq!(config.actor, "cfo");
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn test_bad_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "database_path = ").unwrap();

        assert!(matches!(
            AppConfig::from_file(file.path()),
            Err(ConfigError::Parse { .. })
        ));
        assert!(matches!(
            AppConfig::from_file(Path::new("/nonexistent/captable.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("CAPTABLE_DB", "/tmp/other.db"),
            ("CAPTABLE_LOG", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.actor, "operator");
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|key| (key == "CAPTABLE_BIND").then(|| "not-an-address".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "bind_addr", .. }));
    }
}
