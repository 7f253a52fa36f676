use serde::{Deserialize, Serialize};
use std::env::VarError;
use std::path::{Path, PathBuf};
use textmirror_engine::FeatureFlags;
use thiserror::Error;

/// Overrides the default config location when set.
pub const CONFIG_ENV: &str = "TEXTMIRROR_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Cannot expand metrics_log path {path} from {config_path}: {source}")]
    MetricsLogPathError {
        config_path: PathBuf,
        path: String,
        source: shellexpand::LookupError<VarError>,
    },
}

/// Settings for an editing session. Every field is optional in the file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub flags: FeatureFlags,
    /// `env_logger` filter used when `RUST_LOG` is not set.
    pub log_level: Option<String>,
    /// Append one line per reconciler run to this file. `~` and `$VARS` are
    /// expanded on load.
    pub metrics_log: Option<PathBuf>,
}

impl Config {
    /// Parse `content`, attributing errors to `config_path`.
    pub fn from_toml_str(content: &str, config_path: &Path) -> Result<Self, ConfigError> {
        let mut config: Config =
            toml::from_str(content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        if let Some(path) = config.metrics_log.take() {
            let path = path.to_string_lossy().into_owned();
            let expanded = shellexpand::full(&path)
                .map_err(|source| ConfigError::MetricsLogPathError {
                    config_path: config_path.to_path_buf(),
                    path: path.clone(),
                    source,
                })?
                .into_owned();
            config.metrics_log = Some(PathBuf::from(expanded));
        }
        Ok(config)
    }

    /// Load from `config_path`; a missing file is `Ok(None)`.
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;
        Self::from_toml_str(&content, config_path).map(Some)
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    /// `$TEXTMIRROR_CONFIG` if set, else `~/.config/textmirror/config.toml`.
    pub fn config_path() -> PathBuf {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => PathBuf::from(shellexpand::tilde("~/.config/textmirror").as_ref())
                .join("config.toml"),
        }
    }
}
