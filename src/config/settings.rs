use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::security::validator::validate_ref;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV_VAR: &str = "GITMETA_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Config directory not found")]
    DirectoryNotFound,

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub git: GitConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    /// Directory holding `<owner>/<name>.git` bare repositories
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_binary")]
    pub binary: String,
    pub timeout_seconds: u64,
    pub max_concurrent_processes: usize,
    pub tree_fanout: usize,
    #[serde(default = "default_branch")]
    pub default_branch: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AuditConfig {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_binary() -> String {
    "git".to_string()
}

fn default_branch() -> String {
    "master".to_string()
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME").map_err(|_| ConfigError::DirectoryNotFound)?;
        Ok(PathBuf::from(home).join(".config").join("gitmeta"))
    }

    /// Get the config file path, honouring `GITMETA_CONFIG`
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::config_path()?)
    }

    /// Load configuration from an explicit file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::ReadError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Config file not found: {}", path.display()),
            )));
        }

        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        self.validate()?;

        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            storage: StorageConfig {
                root: PathBuf::from("/var/lib/gitmeta/repositories"),
            },
            git: GitConfig {
                binary: default_binary(),
                timeout_seconds: 30,
                max_concurrent_processes: 32,
                tree_fanout: 8,
                default_branch: default_branch(),
                locale: None,
            },
            audit: AuditConfig::default(),
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "storage.root must not be empty".to_string(),
            ));
        }

        if self.git.binary.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "git.binary must not be empty".to_string(),
            ));
        }

        if self.git.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_seconds must be greater than 0".to_string(),
            ));
        }

        if self.git.max_concurrent_processes == 0 {
            return Err(ConfigError::InvalidValue(
                "max_concurrent_processes must be greater than 0".to_string(),
            ));
        }

        if self.git.tree_fanout == 0 {
            return Err(ConfigError::InvalidValue(
                "tree_fanout must be greater than 0".to_string(),
            ));
        }

        validate_ref(&self.git.default_branch).map_err(|e| {
            ConfigError::InvalidValue(format!("default_branch: {}", e))
        })?;

        Ok(())
    }

    /// Per-call timeout for git processes
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.git.timeout_seconds)
    }

    /// Audit log location, if auditing is enabled
    pub fn audit_log_path(&self) -> Result<Option<PathBuf>, ConfigError> {
        if !self.audit.enabled {
            return Ok(None);
        }
        match &self.audit.path {
            Some(path) => Ok(Some(path.clone())),
            None => Ok(Some(Self::config_dir()?.join("audit.log"))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert_eq!(config.git.binary, "git");
        assert_eq!(config.git.default_branch, "master");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default_config();
        config.git.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let mut config = Config::default_config();
        config.git.max_concurrent_processes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default_config();
        config.git.tree_fanout = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_default_branch() {
        let mut config = Config::default_config();
        config.git.default_branch = "--all".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let config = Config::from_toml(
            r#"
            [storage]
            root = "/srv/git"

            [git]
            timeout_seconds = 5
            max_concurrent_processes = 4
            tree_fanout = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/srv/git"));
        assert_eq!(config.git.binary, "git");
        assert_eq!(config.git.default_branch, "master");
        assert_eq!(config.git.tree_fanout, 2);
        assert!(config.git.locale.is_none());
        assert!(!config.audit.enabled);
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        let result = Config::from_toml(
            r#"
            [storage]
            root = "/srv/git"

            [git]
            timeout_seconds = 0
            max_concurrent_processes = 4
            tree_fanout = 2
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_audit_path() {
        let mut config = Config::default_config();
        assert_eq!(config.audit_log_path().unwrap(), None);

        config.audit.enabled = true;
        config.audit.path = Some(PathBuf::from("/tmp/audit.log"));
        assert_eq!(
            config.audit_log_path().unwrap(),
            Some(PathBuf::from("/tmp/audit.log"))
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default_config();
        config.git.locale = Some("C".to_string());
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.storage.root, config.storage.root);
        assert_eq!(loaded.git.locale.as_deref(), Some("C"));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = Config::load_from(temp_dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
