//! Layered configuration: built-in defaults, an optional TOML file, then
//! `SKYLOG_*` environment overrides. Secrets (API keys, database URL) come
//! from the environment only.

use std::env;
use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    ANALYZE_CONCURRENCY, DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_EXTRACTION_MODEL, DEFAULT_VERIFICATION_MODEL,
};

const CONFIG_OVERRIDE_ENV: &str = "SKYLOG_CONFIG_FILE";
const LOCAL_CONFIG_PATH: &str = "config/skylog";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub models: ModelConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL; absent in slicer-only local use.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: crate::services::store::pg::DEFAULT_MAX_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the filesystem object store in local mode.
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./skylog-data"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub extraction_model: String,
    pub verification_model: String,
    pub embedding_model: String,
    pub embedding_dim: usize,
    /// Provider-wide request quota shared by extraction and embedding.
    pub requests_per_second: u32,
}

impl ModelConfig {
    /// One limiter shared by every client of the provider, so extraction and
    /// embedding calls draw from the same quota.
    pub fn shared_limiter(&self) -> std::sync::Arc<crate::services::model::GenericRateLimiter> {
        crate::services::model::per_second_limiter(self.requests_per_second)
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            extraction_model: DEFAULT_EXTRACTION_MODEL.to_string(),
            verification_model: DEFAULT_VERIFICATION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            requests_per_second: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: ANALYZE_CONCURRENCY,
        }
    }
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let mut builder = Config::builder();

    builder = match env::var(CONFIG_OVERRIDE_ENV) {
        Ok(path) => builder.add_source(File::from(PathBuf::from(path)).required(true)),
        Err(_) => builder.add_source(File::with_name(LOCAL_CONFIG_PATH).required(false)),
    };

    builder = builder.add_source(Environment::with_prefix("SKYLOG").separator("__"));

    let config = builder.build()?.try_deserialize::<AppConfig>()?;
    Ok(config)
}
