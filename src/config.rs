//! YAML job configuration: `gcp_config.yaml` and `sources.yaml`.
//!
//! Both files are parsed once into typed structs and handed around
//! explicitly. Nothing here reads process-wide state.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};

use crate::harvest::FormatKind;
use crate::providers::ProviderKind;

pub const GCP_CONFIG_FILE: &str = "gcp_config.yaml";
pub const SOURCES_FILE: &str = "sources.yaml";
pub const DEFAULT_CONFIG_DIR: &str = "config";

pub const DEFAULT_BQ_COLUMN: &str = "asin";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_PROGRESS_EVERY: usize = 20;

/// Oxylabs credentials shared by every marketplace1 job.
pub const DEFAULT_OXYLABS_USERNAME_SECRET: &str = "marketplace1-price-oxylabs-username";
pub const DEFAULT_OXYLABS_PASSWORD_SECRET: &str = "marketplace1-price-oxylabs-password";
pub const DEFAULT_AXESSO_API_KEY_SECRET: &str = "marketplace2-details-axesso-key";

/// Pacing and Oxylabs source a format runs with unless configured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormatDefaults {
    pub throttle_min_seconds: f64,
    pub throttle_max_seconds: f64,
    pub max_workers: usize,
    pub oxylabs_source: &'static str,
}

impl FormatDefaults {
    pub fn for_format(format: FormatKind) -> Self {
        match format {
            FormatKind::Pricing => Self {
                throttle_min_seconds: 0.05,
                throttle_max_seconds: 0.2,
                max_workers: 8,
                oxylabs_source: "amazon_pricing",
            },
            FormatKind::ProductDetails | FormatKind::Raw => Self {
                throttle_min_seconds: 0.3,
                throttle_max_seconds: 0.8,
                max_workers: 6,
                oxylabs_source: "amazon_product",
            },
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config YAML {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Source '{0}' not found in sources.yaml")]
    UnknownSource(String),
    #[error("'{0}' missing in source parameters")]
    MissingParameter(&'static str),
    #[error("Invalid '{name}' in source parameters: {message}")]
    InvalidParameter { name: &'static str, message: String },
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    info!(config_path = ?path, "Loading configuration from file");

    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to read config file");
        ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    serde_yaml::from_str(&content).map_err(|e| {
        error!(error = ?e, config_path = ?path, "Failed to parse config YAML");
        ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GcpConfig {
    #[serde(default)]
    pub project_id: Option<String>,
}

impl GcpConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_yaml(path.as_ref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl SourcesConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        load_yaml(path.as_ref())
    }

    pub fn find(&self, name: &str) -> Result<&SourceConfig, ConfigError> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownSource(name.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: SourceParameters,
}

fn enabled_by_default() -> bool {
    true
}

/// Per-source knobs. Every field is optional; callers fall back to
/// [`FormatDefaults`] and the `DEFAULT_*` constants.
///
/// Provider-prefixed keys (`oxylabs_endpoint`, `axesso_secret_name`, ...)
/// are accepted as aliases of the generic ones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceParameters {
    pub provider: Option<ProviderKind>,
    pub format: Option<FormatKind>,
    #[serde(alias = "oxylabs_endpoint", alias = "axesso_endpoint")]
    pub endpoint: Option<String>,
    #[serde(alias = "oxylabs_source")]
    pub source: Option<String>,
    pub domain: Option<String>,
    pub category_label: Option<String>,
    #[serde(alias = "node")]
    pub node_label: Option<String>,
    pub throttle_min_seconds: Option<f64>,
    pub throttle_max_seconds: Option<f64>,
    pub max_workers: Option<usize>,
    pub bq_table: Option<String>,
    pub bq_column: Option<String>,
    pub bq_where: Option<String>,
    #[serde(default)]
    pub bq_distinct: bool,
    pub max_items: Option<usize>,
    #[serde(alias = "oxylabs_username_secret_name")]
    pub username_secret_name: Option<String>,
    #[serde(alias = "oxylabs_password_secret_name")]
    pub password_secret_name: Option<String>,
    #[serde(alias = "axesso_secret_name")]
    pub api_key_secret_name: Option<String>,
    pub gcs_bucket_name: Option<String>,
    pub request_timeout_seconds: Option<u64>,
    pub progress_every: Option<usize>,
}

impl SourceParameters {
    pub fn required<'a>(
        value: &'a Option<String>,
        name: &'static str,
    ) -> Result<&'a str, ConfigError> {
        value
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingParameter(name))
    }
}
