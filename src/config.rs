use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DBX_DIR: &str = ".dbx";
pub const INFO_FILE_NAME: &str = "project.json";
pub const LOCK_FILE_NAME: &str = "lock.json";
pub const CONF_DIR: &str = "conf";
pub const DEPLOYMENT_FILE_NAME: &str = "deployment.json";
pub const DIST_DIR: &str = "dist";

pub const DEFAULT_ENVIRONMENT: &str = "default";
pub const DEFAULT_PROFILE: &str = "DEFAULT";
pub const DEFAULT_PYTHON: &str = "python";
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Locations of every project-state file, relative to an injected root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the process working directory.
    pub fn current() -> Self {
        Self::new(".")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dbx_dir(&self) -> PathBuf {
        self.root.join(DBX_DIR)
    }

    pub fn info_file(&self) -> PathBuf {
        self.dbx_dir().join(INFO_FILE_NAME)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.dbx_dir().join(LOCK_FILE_NAME)
    }

    pub fn conf_dir(&self) -> PathBuf {
        self.root.join(CONF_DIR)
    }

    pub fn deployment_file(&self) -> PathBuf {
        self.conf_dir().join(DEPLOYMENT_FILE_NAME)
    }

    pub fn dist_dir(&self) -> PathBuf {
        self.root.join(DIST_DIR)
    }
}

/// CLI configuration loaded from ~/.config/dbx/config.toml
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Defaults applied when flags are omitted
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Package build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Remote command execution settings
    #[serde(default)]
    pub execute: ExecuteConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Environment used when `--environment` is not given
    pub environment: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Interpreter used to run setup.py
    pub python: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ExecuteConfig {
    /// Seconds between command status polls
    pub poll_interval_secs: Option<u64>,
}

impl CliConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("dbx").join("config.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse config");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to read config");
                Self::default()
            }
        }
    }

    /// Get effective environment (config -> default)
    pub fn default_environment(&self) -> String {
        self.defaults
            .environment
            .clone()
            .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
    }

    /// Get effective python interpreter (config -> env var -> default)
    pub fn python(&self) -> String {
        self.build
            .python
            .clone()
            .or_else(|| std::env::var("DBX_PYTHON").ok())
            .unwrap_or_else(|| DEFAULT_PYTHON.to_string())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(
            self.execute
                .poll_interval_secs
                .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
                .max(1),
        )
    }
}

/// Generate sample config file content
pub fn sample_config() -> &'static str {
    r#"# dbx CLI Configuration
# Location: ~/.config/dbx/config.toml

[defaults]
# Environment used when --environment is omitted
environment = "default"

[build]
# Interpreter used for `setup.py bdist_wheel` (DBX_PYTHON also works)
# python = "python3"

[execute]
# Seconds between command status polls
poll_interval_secs = 5
"#
}
