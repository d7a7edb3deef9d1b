//! CLI configuration

use crate::error::{CliError, CliResult};
use ferry_deployment::DeploymentConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CliConfig {
    /// Variables file applied when `--vars` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<PathBuf>,

    /// Shared domain seeded into the playground platform
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_domain: Option<String>,

    /// Timeouts and polling back-off of the orchestrator
    pub deployment: DeploymentConfig,
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: Option<&str>) -> CliResult<Self> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => match Self::default_config_path() {
                Ok(path) => path,
                Err(_) => return Ok(CliConfig::default()),
            },
        };

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            let config: CliConfig =
                toml::from_str(&contents).map_err(|e| CliError::Config(e.to_string()))?;
            Ok(config)
        } else {
            Ok(CliConfig::default())
        }
    }

    /// Get the default configuration file path
    fn default_config_path() -> CliResult<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| CliError::Config("Cannot find config directory".into()))?;
        Ok(config_dir.join("ferry").join("config.toml"))
    }
}
