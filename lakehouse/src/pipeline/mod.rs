pub mod state;
pub mod steps;

pub use state::{PipelineRun, PipelineState, RunSummary, Stage, StageFailure, StageRecord, StageStatus};
pub use steps::{PipelineSteps, WarehousePipeline};

use chrono::NaiveDate;
use common::Result;
use common::config::RetryConfig;
use etl::utils::retry::{RetryPolicy, retry_with_policy};
use etl::utils::time::{Sleeper, TokioSleeper};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Retry behaviour for each stage.
#[derive(Debug, Clone)]
pub struct StagePolicies {
    pub extract: RetryPolicy,
    pub load: RetryPolicy,
    pub transform: RetryPolicy,
}

impl Default for StagePolicies {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl StagePolicies {
    /// The silver stage is never retried regardless of configuration.
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            extract: RetryPolicy::from_config(&config.extract),
            load: RetryPolicy::from_config(&config.load),
            transform: RetryPolicy::no_retry(),
        }
    }

    fn for_stage(&self, stage: Stage) -> &RetryPolicy {
        match stage {
            Stage::Extract => &self.extract,
            Stage::LoadBronze => &self.load,
            Stage::TransformSilver => &self.transform,
        }
    }
}

/// Runs extract, bronze load and silver transform strictly in sequence.
///
/// The orchestrator is the only place that decides between retrying a stage
/// and halting the run. A halted run keeps the side effects of the stages
/// that already finished.
pub struct PipelineOrchestrator<S: PipelineSteps> {
    steps: S,
    policies: StagePolicies,
    sleeper: Arc<dyn Sleeper>,
}

impl<S: PipelineSteps> PipelineOrchestrator<S> {
    pub fn new(steps: S, policies: StagePolicies) -> Self {
        Self {
            steps,
            policies,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn steps(&self) -> &S {
        &self.steps
    }

    /// Drives one stage through its retry policy and records the outcome.
    /// Returns `None` after moving the run to `Failed`.
    async fn run_stage<T, F, Fut>(&self, run: &mut PipelineRun, stage: Stage, operation: F) -> Result<Option<T>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        run.transition(stage.state())?;
        run.record_mut(stage).status = StageStatus::Running;
        info!(run_id = %run.run_id, stage = %stage, status = "running", "Stage started");

        let started = Instant::now();
        let policy = self.policies.for_stage(stage);
        let retried = retry_with_policy(stage.as_str(), policy, self.sleeper.as_ref(), operation).await;
        let duration = started.elapsed();

        let record = run.record_mut(stage);
        record.attempts = retried.attempts;
        record.duration = duration;

        match retried.result {
            Ok(value) => {
                record.status = StageStatus::Succeeded;
                info!(
                    run_id = %run.run_id,
                    stage = %stage,
                    status = "succeeded",
                    attempts = retried.attempts,
                    duration_ms = duration.as_millis() as u64,
                    "Stage finished"
                );
                Ok(Some(value))
            }
            Err(e) => {
                record.status = StageStatus::Failed;
                record.error = Some(e.to_string());
                error!(
                    run_id = %run.run_id,
                    stage = %stage,
                    status = "failed",
                    attempts = retried.attempts,
                    duration_ms = duration.as_millis() as u64,
                    error = %e,
                    "Stage failed, halting pipeline"
                );
                run.failure = Some(StageFailure { stage, error: e });
                run.skip_pending();
                run.transition(PipelineState::Failed)?;
                Ok(None)
            }
        }
    }

    /// Runs the whole pipeline for `target_date` and returns the terminal run.
    pub async fn run(&self, target_date: NaiveDate) -> Result<PipelineRun> {
        let mut run = PipelineRun::new(target_date);
        info!(run_id = %run.run_id, %target_date, "=== Starting weather pipeline ===");

        let Some(extract_file) = self
            .run_stage(&mut run, Stage::Extract, |_| self.steps.extract(target_date))
            .await?
        else {
            return Ok(run);
        };
        info!(
            path = %extract_file.path.display(),
            rows = extract_file.row_count,
            "Extraction ready, proceeding to bronze"
        );
        run.extract_file = Some(extract_file);

        let Some(report) = self
            .run_stage(&mut run, Stage::LoadBronze, |_| self.steps.load_bronze())
            .await?
        else {
            return Ok(run);
        };
        if report.failed() > 0 {
            // Per-file failures are isolated and never retried at this level.
            warn!(
                failed = report.failed(),
                succeeded = report.succeeded(),
                "Bronze load finished with failed files"
            );
        }
        run.load_report = Some(report);

        if self
            .run_stage(&mut run, Stage::TransformSilver, |_| self.steps.transform_silver())
            .await?
            .is_none()
        {
            return Ok(run);
        }

        run.transition(PipelineState::Completed)?;
        info!(
            run_id = %run.run_id,
            "Silver layer ready; gold views read from it directly. === Pipeline completed ==="
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{LoadOutcome, LoadReport, LoadStatus};
    use async_trait::async_trait;
    use common::Error;
    use etl::ExtractFile;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    /// Steps that fail the first `*_failures` calls with a retryable error.
    #[derive(Default)]
    struct MockSteps {
        extract_failures: u32,
        load_failures: u32,
        transform_fails: bool,
        failed_file: bool,
        extract_calls: AtomicU32,
        load_calls: AtomicU32,
        transform_calls: AtomicU32,
    }

    #[async_trait]
    impl PipelineSteps for MockSteps {
        async fn extract(&self, target_date: NaiveDate) -> Result<ExtractFile> {
            let call = self.extract_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.extract_failures {
                return Err(Error::upstream("HTTP 503"));
            }
            Ok(ExtractFile {
                path: PathBuf::from("data/weather_data_20240102_000000.csv"),
                created_at: chrono::Utc::now(),
                target_date,
                row_count: 24,
                failed_points: Vec::new(),
            })
        }

        async fn load_bronze(&self) -> Result<LoadReport> {
            let call = self.load_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.load_failures {
                return Err(Error::Connection("server unreachable".into()));
            }
            let mut outcomes = vec![LoadOutcome {
                file: PathBuf::from("data/a.csv"),
                status: LoadStatus::Succeeded,
                rows: 24,
                error: None,
            }];
            if self.failed_file {
                outcomes.push(LoadOutcome {
                    file: PathBuf::from("data/b.csv"),
                    status: LoadStatus::Failed,
                    rows: 0,
                    error: Some("NOT NULL constraint failed".into()),
                });
            }
            Ok(LoadReport {
                table: "bronze_weather_api_data".into(),
                outcomes,
            })
        }

        async fn transform_silver(&self) -> Result<()> {
            self.transform_calls.fetch_add(1, Ordering::SeqCst);
            if self.transform_fails {
                return Err(Error::Transformation {
                    procedure: "silver.load_silver".into(),
                    detail: "deadlock".into(),
                });
            }
            Ok(())
        }
    }

    fn orchestrator(steps: MockSteps) -> (PipelineOrchestrator<MockSteps>, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let orchestrator =
            PipelineOrchestrator::new(steps, StagePolicies::default()).with_sleeper(sleeper.clone());
        (orchestrator, sleeper)
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn calls(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let (orchestrator, sleeper) = orchestrator(MockSteps::default());

        let run = orchestrator.run(date()).await.unwrap();

        assert_eq!(run.state, PipelineState::Completed);
        assert!(run.failure.is_none());
        assert_eq!(run.extract_file.as_ref().unwrap().row_count, 24);
        for stage in [Stage::Extract, Stage::LoadBronze, Stage::TransformSilver] {
            assert_eq!(run.record(stage).status, StageStatus::Succeeded);
            assert_eq!(run.record(stage).attempts, 1);
        }
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_extract_exhaustion_never_runs_later_stages() {
        let (orchestrator, sleeper) = orchestrator(MockSteps {
            extract_failures: u32::MAX,
            ..Default::default()
        });

        let run = orchestrator.run(date()).await.unwrap();
        let steps = orchestrator.steps();

        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.failed_stage(), Some(Stage::Extract));
        assert!(matches!(run.failure.as_ref().unwrap().error, Error::UpstreamFetch(_)));
        assert_eq!(calls(&steps.extract_calls), 3);
        assert_eq!(calls(&steps.load_calls), 0);
        assert_eq!(calls(&steps.transform_calls), 0);
        assert_eq!(run.extract.attempts, 3);
        assert_eq!(run.load.status, StageStatus::Skipped);
        assert_eq!(run.transform.status, StageStatus::Skipped);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![Duration::from_secs(60), Duration::from_secs(60)]
        );
    }

    #[tokio::test]
    async fn test_extract_recovers_within_budget() {
        let (orchestrator, _sleeper) = orchestrator(MockSteps {
            extract_failures: 2,
            ..Default::default()
        });

        let run = orchestrator.run(date()).await.unwrap();

        assert!(run.is_success());
        assert_eq!(run.extract.attempts, 3);
        assert_eq!(calls(&orchestrator.steps().load_calls), 1);
    }

    #[tokio::test]
    async fn test_load_connection_failure_retried_twice_then_halts() {
        let (orchestrator, sleeper) = orchestrator(MockSteps {
            load_failures: u32::MAX,
            ..Default::default()
        });

        let run = orchestrator.run(date()).await.unwrap();
        let steps = orchestrator.steps();

        assert_eq!(run.failed_stage(), Some(Stage::LoadBronze));
        assert_eq!(calls(&steps.load_calls), 2);
        assert_eq!(calls(&steps.transform_calls), 0);
        assert_eq!(run.extract.status, StageStatus::Succeeded);
        assert!(run.extract_file.is_some(), "earlier stage output is kept");
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_files_do_not_trigger_retry() {
        let (orchestrator, sleeper) = orchestrator(MockSteps {
            failed_file: true,
            ..Default::default()
        });

        let run = orchestrator.run(date()).await.unwrap();

        assert!(run.is_success());
        assert_eq!(calls(&orchestrator.steps().load_calls), 1);
        assert_eq!(run.load_report.as_ref().unwrap().failed(), 1);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transform_failure_is_not_retried() {
        let (orchestrator, sleeper) = orchestrator(MockSteps {
            transform_fails: true,
            ..Default::default()
        });

        let run = orchestrator.run(date()).await.unwrap();
        let summary = run.summary();

        assert_eq!(run.state, PipelineState::Failed);
        assert_eq!(run.failed_stage(), Some(Stage::TransformSilver));
        assert_eq!(calls(&orchestrator.steps().transform_calls), 1);
        assert_eq!(run.load.status, StageStatus::Succeeded);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
        assert_eq!(summary.failed_stage, Some(Stage::TransformSilver));
        assert!(summary.error.unwrap().contains("deadlock"));
    }

    #[tokio::test]
    async fn test_summary_serializes() {
        let (orchestrator, _sleeper) = orchestrator(MockSteps::default());
        let run = orchestrator.run(date()).await.unwrap();

        let json = serde_json::to_value(run.summary()).unwrap();
        assert_eq!(json["state"], "Completed");
        assert_eq!(json["target_date"], "2024-01-01");
        assert_eq!(json["extracted_rows"], 24);
        assert_eq!(json["load_report"]["outcomes"][0]["status"], "succeeded");
    }
}
