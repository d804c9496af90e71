//! Daemon configuration.
//!
//! Values are layered, lowest precedence first: built-in defaults, the TOML
//! config file, then `SEATD_*` environment variables.
//!
//! ```toml
//! socket_path = "/tmp/seatd.sock"
//! hold_duration_secs = 60
//! max_holds_per_holder = 10
//! data_file = "/var/lib/seatlock/store.json"
//! seed_file = "/etc/seatlock/shows.toml"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tokio::time::Duration;

use crate::server::DEFAULT_SOCKET_PATH;
use crate::show::{ShowSettings, DEFAULT_HOLD_DURATION, DEFAULT_MAX_HOLDS_PER_HOLDER};

/// Environment variable naming the config file.
pub const ENV_CONFIG: &str = "SEATD_CONFIG";
pub const ENV_SOCKET: &str = "SEATD_SOCKET";
pub const ENV_HOLD_SECS: &str = "SEATD_HOLD_SECS";
pub const ENV_DATA_FILE: &str = "SEATD_DATA_FILE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Daemon settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub socket_path: PathBuf,
    pub hold_duration_secs: u64,
    pub max_holds_per_holder: usize,
    /// JSON snapshot file; `None` keeps everything in memory
    pub data_file: Option<PathBuf>,
    /// Fixture loaded when the store starts out empty
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            hold_duration_secs: DEFAULT_HOLD_DURATION.as_secs(),
            max_holds_per_holder: DEFAULT_MAX_HOLDS_PER_HOLDER,
            data_file: None,
            seed_file: None,
        }
    }
}

impl Config {
    /// Default config file location: `<config_dir>/seatlock/seatd.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("seatlock").join("seatd.toml"))
    }

    /// Loads the configuration from all sources.
    ///
    /// An explicitly given file (argument or `SEATD_CONFIG`) must exist; the
    /// default location is optional.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(socket) = lookup(ENV_SOCKET) {
            self.socket_path = PathBuf::from(socket);
        }
        if let Some(secs) = lookup(ENV_HOLD_SECS) {
            self.hold_duration_secs = secs.trim().parse().map_err(|_| ConfigError::Invalid {
                field: "hold_duration_secs",
                reason: format!("{ENV_HOLD_SECS}={secs} is not a number of seconds"),
            })?;
        }
        if let Some(file) = lookup(ENV_DATA_FILE) {
            self.data_file = Some(PathBuf::from(file));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hold_duration_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "hold_duration_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_holds_per_holder == 0 {
            return Err(ConfigError::Invalid {
                field: "max_holds_per_holder",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn show_settings(&self) -> ShowSettings {
        ShowSettings {
            hold_duration: Duration::from_secs(self.hold_duration_secs),
            max_holds_per_holder: self.max_holds_per_holder,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/seatd.sock"));
        assert_eq!(config.hold_duration_secs, 60);
        assert_eq!(config.max_holds_per_holder, 10);
        assert!(config.validate().is_ok());
        assert_eq!(config.show_settings(), ShowSettings::default());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seatd.toml");
        std::fs::write(&path, "hold_duration_secs = 90\ndata_file = \"store.json\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.hold_duration_secs, 90);
        assert_eq!(config.data_file, Some(PathBuf::from("store.json")));
        assert_eq!(config.max_holds_per_holder, 10);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seatd.toml");
        std::fs::write(&path, "hold_secs = 90\n").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_env_overrides_file() {
        let env: HashMap<&str, &str> = [
            (ENV_SOCKET, "/run/seatd.sock"),
            (ENV_HOLD_SECS, "15"),
            (ENV_DATA_FILE, "/var/lib/seatd.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config {
            hold_duration_secs: 90,
            ..Config::default()
        };
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.socket_path, PathBuf::from("/run/seatd.sock"));
        assert_eq!(config.hold_duration_secs, 15);
        assert_eq!(config.data_file, Some(PathBuf::from("/var/lib/seatd.json")));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        let err = config
            .apply_env(|key| (key == ENV_HOLD_SECS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("hold_duration_secs"));

        let config = Config {
            hold_duration_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            max_holds_per_holder: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_explicit_file() {
        let err = Config::load(Some(Path::new("/nonexistent/seatd.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
