use crate::models::{GeoPoint, HourlyResponse, HourlySeries};
use async_trait::async_trait;
use chrono::NaiveDate;
use common::config::ApiConfig;
use common::{Error, Result};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const HOURLY_FIELDS: &str = "temperature_2m,relative_humidity_2m,precipitation";

/// Source of hourly weather series for one point and one day.
#[async_trait]
pub trait WeatherClient: Send + Sync {
    async fn fetch_hourly(&self, point: &GeoPoint, date: NaiveDate) -> Result<HourlySeries>;
}

pub struct OpenMeteoClient {
    client: rquest::Client,
    base_url: String,
    headers: HashMap<String, String>,
}

impl OpenMeteoClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = rquest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            headers: config.headers.clone(),
        })
    }

    pub fn request_url(&self, point: &GeoPoint, date: NaiveDate) -> Result<Url> {
        build_request_url(&self.base_url, point, date)
    }
}

/// Builds the single-day hourly request for `point`.
pub fn build_request_url(base_url: &str, point: &GeoPoint, date: NaiveDate) -> Result<Url> {
    let day = date.format("%Y-%m-%d").to_string();
    let url = Url::parse_with_params(
        base_url,
        &[
            ("latitude", point.latitude.to_string()),
            ("longitude", point.longitude.to_string()),
            ("hourly", HOURLY_FIELDS.to_string()),
            ("timezone", "UTC".to_string()),
            ("start_date", day.clone()),
            ("end_date", day),
        ],
    )?;
    Ok(url)
}

#[async_trait]
impl WeatherClient for OpenMeteoClient {
    async fn fetch_hourly(&self, point: &GeoPoint, date: NaiveDate) -> Result<HourlySeries> {
        let url = self.request_url(point, date)?;
        debug!(city = %point.label(), %url, "Requesting hourly weather");

        let mut request = self.client.get(url.as_str());
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        // Transport, timeout and status failures are all upstream failures.
        let response = request
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::upstream(format!("request for {} failed: {}", point.label(), e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| Error::upstream(format!("reading body for {} failed: {}", point.label(), e)))?;

        let parsed: HourlyResponse = serde_json::from_str(&body).map_err(|e| {
            Error::upstream(format!("malformed response for {}: {}", point.label(), e))
        })?;

        parsed.into_series(point)
    }
}
