pub mod catalog;
pub mod client;
pub mod extract_file;
pub mod extractor;
pub mod models;
pub mod utils;

use chrono::NaiveDate;
use client::OpenMeteoClient;
use common::Result;
use common::config::Settings;
use std::sync::Arc;

pub use catalog::GeoCatalog;
pub use extract_file::ExtractFile;
pub use extractor::{ExtractorOptions, WeatherExtractor};

impl WeatherExtractor {
    /// Extractor backed by the Open-Meteo client and the configured catalog.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = Arc::new(OpenMeteoClient::new(&settings.api)?);
        let options = ExtractorOptions {
            output_dir: settings.extract.output_dir.clone(),
            concurrency: settings.api.concurrency,
            allow_partial: settings.extract.allow_partial,
        };
        Ok(Self::new(client, GeoCatalog::from_settings(settings), options))
    }
}

/// Target date precedence: explicit override, configured date, yesterday (UTC).
pub fn resolve_target_date(settings: &Settings, date_override: Option<NaiveDate>) -> NaiveDate {
    date_override
        .or(settings.date)
        .unwrap_or_else(utils::time::yesterday_utc)
}

/// Runs only the extraction stage, without retries.
pub async fn run_extraction(config_path: &str, date_override: Option<NaiveDate>) -> Result<ExtractFile> {
    let settings = Settings::new(config_path)?;
    common::telemetry::init_tracing(&settings.log_format);

    let target_date = resolve_target_date(&settings, date_override);
    let extractor = WeatherExtractor::from_settings(&settings)?;
    extractor.extract(target_date).await
}
