use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::stream::PollConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Path to the static station directory JSON.
    #[serde(default = "default_stations_path")]
    pub stations_path: String,
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProvidersConfig {
    pub viaggiatreno: EndpointConfig,
    pub italo: EndpointConfig,
    pub trentino: TrentinoConfig,
    pub cicero: CiceroConfig,
    pub motis: EndpointConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrentinoConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiceroConfig {
    pub base_url: String,
    /// Operator code sent as `CodiceAzienda`, e.g. "ATV".
    pub agency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: u64,
    #[serde(default = "default_max_interval_secs")]
    pub max_interval_secs: u64,
    #[serde(default = "default_max_consecutive_not_found")]
    pub max_consecutive_not_found: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
            max_interval_secs: default_max_interval_secs(),
            max_consecutive_not_found: default_max_consecutive_not_found(),
        }
    }
}

impl PollingConfig {
    pub fn to_poll_config(&self) -> PollConfig {
        PollConfig {
            min_interval: Duration::from_secs(self.min_interval_secs),
            max_interval: Duration::from_secs(self.max_interval_secs.max(self.min_interval_secs)),
            max_consecutive_not_found: self.max_consecutive_not_found.max(1),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_stations_path() -> String {
    "data/stations.json".to_string()
}

fn default_min_interval_secs() -> u64 {
    5
}

fn default_max_interval_secs() -> u64 {
    60
}

fn default_max_consecutive_not_found() -> u32 {
    5
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}
