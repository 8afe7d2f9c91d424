use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{DatasetCatalog, DatasetDescriptor, LONG_HISTORY_FALLBACK};
use crate::chunk::DEFAULT_CHUNK_DAYS;
use crate::cluster::ClusterParams;
use crate::error::FirmsError;
use crate::firms::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS};

pub const CONFIG_FILE: &str = "firms-incidents.json";
pub const MAP_KEY_ENV: &str = "FIRMS_MAP_KEY";
pub const DEFAULT_DATASET: &str = "VIIRS_NOAA20_NRT";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub map_key: Option<String>,
    #[serde(default)]
    pub default_timeout_secs: Option<u64>,
    #[serde(default)]
    pub dataset: Option<String>,
    #[serde(default)]
    pub chunk_days: Option<u32>,
    #[serde(default)]
    pub eps: Option<f64>,
    #[serde(default)]
    pub min_samples: Option<usize>,
    #[serde(default)]
    pub max_time_diff_days: Option<u32>,
    #[serde(default)]
    pub border_dir: Option<String>,
    /// replaces the built-in dataset table when present
    #[serde(default)]
    pub datasets: Option<Vec<DatasetDescriptor>>,
    #[serde(default)]
    pub fallback_dataset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub base_url: String,
    pub map_key: Option<String>,
    pub default_timeout: Duration,
    pub dataset: String,
    pub chunk_days: u32,
    pub clustering: ClusterParams,
    pub border_dir: Utf8PathBuf,
    pub catalog: DatasetCatalog,
}

impl ResolvedConfig {
    pub fn require_map_key(&self) -> Result<&str, FirmsError> {
        self.map_key.as_deref().ok_or(FirmsError::MissingApiKey)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FirmsError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            debug!("no config file, using defaults");
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| FirmsError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| FirmsError::ConfigParse(err.to_string()))?
        };

        let mut resolved = Self::resolve_config(config)?;
        if let Some(key) = env::var(MAP_KEY_ENV).ok().filter(|key| !key.trim().is_empty()) {
            resolved.map_key = Some(key.trim().to_string());
        }
        Ok(resolved)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FirmsError> {
        let defaults = ClusterParams::default();
        let clustering = ClusterParams {
            eps: config.eps.unwrap_or(defaults.eps),
            min_samples: config.min_samples.unwrap_or(defaults.min_samples),
            max_time_diff_days: config
                .max_time_diff_days
                .unwrap_or(defaults.max_time_diff_days),
        };
        clustering
            .validate()
            .map_err(|err| FirmsError::ConfigParse(err.to_string()))?;

        let border_dir = match config.border_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => default_border_dir()?,
        };

        let catalog = match config.datasets {
            Some(datasets) => DatasetCatalog::new(
                datasets,
                config
                    .fallback_dataset
                    .unwrap_or_else(|| LONG_HISTORY_FALLBACK.to_string()),
            ),
            None => DatasetCatalog::builtin()?,
        };

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            base_url: config
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            map_key: config.map_key.filter(|key| !key.trim().is_empty()),
            default_timeout: Duration::from_secs(
                config.default_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            dataset: config
                .dataset
                .unwrap_or_else(|| DEFAULT_DATASET.to_string()),
            chunk_days: config.chunk_days.unwrap_or(DEFAULT_CHUNK_DAYS),
            clustering,
            border_dir,
            catalog,
        })
    }
}

pub fn default_border_dir() -> Result<Utf8PathBuf, FirmsError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(
                dirs.home_dir()
                    .join(".cache")
                    .join("firms-incidents")
                    .join("borders"),
            )
            .ok()
        })
        .ok_or_else(|| FirmsError::Filesystem("unable to resolve cache directory".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let resolved = ConfigLoader::resolve_config(Config {
            border_dir: Some("/tmp/borders".to_string()),
            ..Config::default()
        })
        .unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.base_url, DEFAULT_BASE_URL);
        assert_eq!(resolved.default_timeout, Duration::from_secs(60));
        assert_eq!(resolved.chunk_days, 7);
        assert_eq!(resolved.clustering, ClusterParams::default());
        assert!(resolved.map_key.is_none());
        assert!(resolved.catalog.get("VIIRS_SNPP_SP").is_some());
    }
}
