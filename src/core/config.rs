use crate::core::model::Metric;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RenterApiConfig {
    pub base_url: String,
    /// API password sent as basic auth, if the daemon requires one.
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for RenterApiConfig {
    fn default() -> Self {
        RenterApiConfig {
            base_url: "http://localhost:9980".to_string(),
            password: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RatesConfig {
    pub base_url: String,
}

impl Default for RatesConfig {
    fn default() -> Self {
        RatesConfig {
            base_url: "https://api.siacentral.com/v2".to_string(),
        }
    }
}

fn default_fiat_currency() -> String {
    "USD".to_string()
}

fn default_retries() -> usize {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub api: RenterApiConfig,
    #[serde(default)]
    pub rates: RatesConfig,
    /// Fiat currency used until the user picks one.
    #[serde(default = "default_fiat_currency")]
    pub fiat_currency: String,
    #[serde(default)]
    pub default_metric: Metric,
    #[serde(default = "default_retries")]
    pub retries: usize,
    pub data_path: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            api: RenterApiConfig::default(),
            rates: RatesConfig::default(),
            fiat_currency: default_fiat_currency(),
            default_metric: Metric::default(),
            retries: default_retries(),
            data_path: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "spendwatch", "spendwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn default_data_path(&self) -> Result<PathBuf> {
        if let Some(custom_path) = &self.data_path {
            return Ok(PathBuf::from(custom_path));
        }
        let proj_dirs = ProjectDirs::from("io", "spendwatch", "spendwatch")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.data_dir().to_path_buf())
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }
}
