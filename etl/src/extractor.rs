use crate::catalog::GeoCatalog;
use crate::client::WeatherClient;
use crate::extract_file::{ExtractFile, write_extract_file};
use crate::models::{GeoPoint, ObservationRow};
use crate::utils::time::now_utc_whole_secs;
use chrono::NaiveDate;
use common::{Error, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ExtractorOptions {
    pub output_dir: PathBuf,
    /// Upper bound on in-flight fetches.
    pub concurrency: usize,
    /// Skip failed points instead of failing the whole extraction.
    pub allow_partial: bool,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            concurrency: 4,
            allow_partial: false,
        }
    }
}

pub struct WeatherExtractor {
    client: Arc<dyn WeatherClient>,
    catalog: GeoCatalog,
    options: ExtractorOptions,
}

impl WeatherExtractor {
    pub fn new(client: Arc<dyn WeatherClient>, catalog: GeoCatalog, options: ExtractorOptions) -> Self {
        Self {
            client,
            catalog,
            options,
        }
    }

    pub fn catalog(&self) -> &GeoCatalog {
        &self.catalog
    }

    /// Fetches one point and stamps its rows with a single load timestamp.
    pub async fn fetch_point(&self, point: &GeoPoint, target_date: NaiveDate) -> Result<Vec<ObservationRow>> {
        let series = self.client.fetch_hourly(point, target_date).await?;
        let load_dts_utc = now_utc_whole_secs();
        let rows = series.into_rows(point, target_date, load_dts_utc)?;
        info!(city = %point.label(), rows = rows.len(), "Fetched hourly weather");
        Ok(rows)
    }

    /// Extracts every catalog point for `target_date` into one new file.
    ///
    /// Per-point row order follows the source. By default any point failure
    /// fails the run and nothing is written.
    pub async fn extract(&self, target_date: NaiveDate) -> Result<ExtractFile> {
        info!(
            %target_date,
            points = self.catalog.len(),
            allow_partial = self.options.allow_partial,
            "Starting weather extraction"
        );

        let fetches = stream::iter(self.catalog.points().iter().cloned())
            .map(|point| async move {
                let result = self.fetch_point(&point, target_date).await;
                (point, result)
            })
            .buffered(self.options.concurrency.max(1));

        let mut rows = Vec::new();
        let mut failed_points = Vec::new();

        if self.options.allow_partial {
            let results: Vec<(GeoPoint, Result<Vec<ObservationRow>>)> = fetches.collect().await;
            for (point, result) in results {
                match result {
                    Ok(point_rows) => rows.extend(point_rows),
                    Err(e) => {
                        warn!(city = %point.label(), error = %e, "Skipping point after fetch failure");
                        failed_points.push((point, e.to_string()));
                    }
                }
            }
        } else {
            // Stops at the first error; fetches still in flight are dropped.
            let batches: Vec<Vec<ObservationRow>> =
                fetches.map(|(_, result)| result).try_collect().await?;
            rows = batches.into_iter().flatten().collect();
        }

        if !self.catalog.is_empty() && failed_points.len() == self.catalog.len() {
            return Err(Error::upstream(format!(
                "all {} points failed to fetch for {}",
                failed_points.len(),
                target_date
            )));
        }

        write_extract_file(
            &self.options.output_dir,
            now_utc_whole_secs(),
            target_date,
            &rows,
            failed_points,
        )
    }
}
