use serde::Deserialize;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::fs;

fn default_max_connections() -> u32 {
    5
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_batch_size() -> usize {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    200
}

fn default_history_window() -> usize {
    30
}

fn default_flat_window() -> usize {
    3
}

fn default_required_fields() -> Vec<String> {
    vec!["meter_id".to_string(), "ts".to_string()]
}

fn default_import_source() -> String {
    "csv".to_string()
}

fn default_max_reported_errors() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub uri: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.uri)
            .await?;
        Ok(pool)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpSourceConfig {
    pub http_bind_addr: String,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
    #[serde(default)]
    pub auth_bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub source: HttpSourceConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// How much history each reading is screened against.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningConfig {
    /// Prior readings used for the historical mean.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Readings (including the current one) checked for flatness.
    #[serde(default = "default_flat_window")]
    pub flat_window: usize,
}

impl Default for ScreeningConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            flat_window: default_flat_window(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportConfig {
    #[serde(default = "default_required_fields")]
    pub required_fields: Vec<String>,
    #[serde(default = "default_import_source")]
    pub source_system: String,
    /// Rejected-row messages kept in a dry-run preview.
    #[serde(default = "default_max_reported_errors")]
    pub max_reported_errors: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            required_fields: default_required_fields(),
            source_system: default_import_source(),
            max_reported_errors: default_max_reported_errors(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database: Option<DatabaseConfig>,
    pub readings: Option<PipelineConfig>,
    #[serde(default)]
    pub screening: ScreeningConfig,
    #[serde(default)]
    pub import: ImportConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    /// Load from `ENERGY_CONFIG` (default `energy-config.toml`).
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("ENERGY_CONFIG").unwrap_or_else(|_| "energy-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config file '{path}': {e}"))?;
        Self::from_toml_str(&contents)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    /// Dry-run imports need no database and so no config file.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = std::env::var("ENERGY_CONFIG").unwrap_or_else(|_| "energy-config.toml".to_string());
        if std::path::Path::new(&path).exists() {
            Self::load()
        } else {
            Self::from_toml_str("")
        }
    }

    pub fn from_toml_str(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.screening.flat_window < 2 {
            anyhow::bail!("screening.flat_window must be at least 2");
        }
        if cfg.screening.history_window == 0 {
            anyhow::bail!("screening.history_window must be at least 1");
        }
        Ok(cfg)
    }

    pub fn database(&self) -> anyhow::Result<&DatabaseConfig> {
        self.database
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("missing [database] section in config"))
    }

    pub fn readings(&self) -> anyhow::Result<&PipelineConfig> {
        self.readings
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("missing [readings] section in config"))
    }
}
