use crate::processor::{BronzeLoader, LoadReport, SilverTransformer};
use async_trait::async_trait;
use chrono::NaiveDate;
use common::Result;
use etl::{ExtractFile, WeatherExtractor};
use std::path::PathBuf;
use std::sync::Arc;

/// The three stage bodies the orchestrator sequences.
#[async_trait]
pub trait PipelineSteps: Send + Sync {
    async fn extract(&self, target_date: NaiveDate) -> Result<ExtractFile>;
    async fn load_bronze(&self) -> Result<LoadReport>;
    async fn transform_silver(&self) -> Result<()>;
}

/// Production steps: Open-Meteo extraction into a warehouse.
pub struct WarehousePipeline {
    extractor: WeatherExtractor,
    loader: Arc<BronzeLoader>,
    transformer: Arc<SilverTransformer>,
    source_dir: PathBuf,
}

impl WarehousePipeline {
    pub fn new(
        extractor: WeatherExtractor,
        loader: BronzeLoader,
        transformer: SilverTransformer,
        source_dir: PathBuf,
    ) -> Self {
        Self {
            extractor,
            loader: Arc::new(loader),
            transformer: Arc::new(transformer),
            source_dir,
        }
    }
}

#[async_trait]
impl PipelineSteps for WarehousePipeline {
    async fn extract(&self, target_date: NaiveDate) -> Result<ExtractFile> {
        self.extractor.extract(target_date).await
    }

    // The warehouse calls block, so they run off the async workers.
    async fn load_bronze(&self) -> Result<LoadReport> {
        let loader = Arc::clone(&self.loader);
        let dir = self.source_dir.clone();
        tokio::task::spawn_blocking(move || loader.load_directory(&dir)).await?
    }

    async fn transform_silver(&self) -> Result<()> {
        let transformer = Arc::clone(&self.transformer);
        tokio::task::spawn_blocking(move || transformer.run()).await?
    }
}
