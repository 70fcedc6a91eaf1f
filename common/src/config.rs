use chrono::NaiveDate;
use config::{Config, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// Points to extract. `None` selects the built-in catalog; an explicit
    /// empty list yields a header-only extract.
    #[serde(default)]
    pub cities: Option<Vec<CityConfig>>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub warehouse: WarehouseConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Target date override; defaults to the day before the run date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CityConfig {
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            headers: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_data_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub allow_partial: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            output_dir: default_data_dir(),
            allow_partial: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WarehouseConfig {
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_bronze_table")]
    pub bronze_table: String,
    #[serde(default = "default_data_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
    #[serde(default = "default_silver_procedure")]
    pub silver_procedure: String,
    #[serde(default)]
    pub procedures: Vec<ProcedureConfig>,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            bronze_table: default_bronze_table(),
            source_dir: default_data_dir(),
            file_extension: default_file_extension(),
            silver_procedure: default_silver_procedure(),
            procedures: Vec::new(),
        }
    }
}

/// A named SQL script the warehouse exposes as a parameterless procedure.
#[derive(Debug, Deserialize, Clone)]
pub struct ProcedureConfig {
    pub name: String,
    pub script: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_extract_retry")]
    pub extract: StageRetryConfig,
    #[serde(default = "default_load_retry")]
    pub load: StageRetryConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            extract: default_extract_retry(),
            load: default_load_retry(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StageRetryConfig {
    pub max_attempts: u32,
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,
    /// 1.0 keeps the delay fixed between attempts.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default)]
    pub max_delay_secs: Option<u64>,
    #[serde(default)]
    pub jitter_ms: u64,
}

fn default_api_base_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    4
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_database() -> PathBuf {
    PathBuf::from("weather.db")
}

fn default_bronze_table() -> String {
    "bronze_weather_api_data".to_string()
}

fn default_file_extension() -> String {
    "csv".to_string()
}

fn default_silver_procedure() -> String {
    "silver.load_silver".to_string()
}

fn default_delay_secs() -> u64 {
    60
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_extract_retry() -> StageRetryConfig {
    StageRetryConfig {
        max_attempts: 3,
        delay_secs: default_delay_secs(),
        backoff_multiplier: default_backoff_multiplier(),
        max_delay_secs: None,
        jitter_ms: 0,
    }
}

fn default_load_retry() -> StageRetryConfig {
    StageRetryConfig {
        max_attempts: 2,
        ..default_extract_retry()
    }
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Settings {
    pub fn new(path: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let config = builder.build()?;

        if let Ok(headers) = config.get_table("api.headers") {
            debug!(?headers, "Loaded API headers from configuration");
        }

        let settings: Settings = config.try_deserialize()?;

        debug!(
            database = %settings.warehouse.database.display(),
            bronze_table = %settings.warehouse.bronze_table,
            target_date = ?settings.date,
            "Parsed pipeline settings"
        );

        Ok(settings)
    }
}
