use crate::processor::LoadReport;
use chrono::{DateTime, NaiveDate, Utc};
use common::{Error, Result};
use etl::ExtractFile;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Extracting,
    LoadingBronze,
    TransformingSilver,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Completed | PipelineState::Failed)
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Extracting)
                | (Extracting, LoadingBronze)
                | (LoadingBronze, TransformingSilver)
                | (TransformingSilver, Completed)
                | (Extracting | LoadingBronze | TransformingSilver, Failed)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extract,
    LoadBronze,
    TransformSilver,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::LoadBronze => "load_bronze",
            Stage::TransformSilver => "transform_silver",
        }
    }

    /// State the pipeline is in while this stage runs.
    pub fn state(self) -> PipelineState {
        match self {
            Stage::Extract => PipelineState::Extracting,
            Stage::LoadBronze => PipelineState::LoadingBronze,
            Stage::TransformSilver => PipelineState::TransformingSilver,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    /// Never started because an earlier stage failed.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageRecord {
    pub status: StageStatus,
    pub attempts: u32,
    pub duration: Duration,
    pub error: Option<String>,
}

impl Default for StageRecord {
    fn default() -> Self {
        Self {
            status: StageStatus::Pending,
            attempts: 0,
            duration: Duration::ZERO,
            error: None,
        }
    }
}

/// The stage that halted a run and the error it ended with.
#[derive(Debug)]
pub struct StageFailure {
    pub stage: Stage,
    pub error: Error,
}

/// One pipeline execution, mutated as stages complete.
#[derive(Debug)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub target_date: NaiveDate,
    pub state: PipelineState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub extract: StageRecord,
    pub load: StageRecord,
    pub transform: StageRecord,
    pub extract_file: Option<ExtractFile>,
    pub load_report: Option<LoadReport>,
    pub failure: Option<StageFailure>,
}

impl PipelineRun {
    pub fn new(target_date: NaiveDate) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            target_date,
            state: PipelineState::Idle,
            started_at: Utc::now(),
            finished_at: None,
            extract: StageRecord::default(),
            load: StageRecord::default(),
            transform: StageRecord::default(),
            extract_file: None,
            load_report: None,
            failure: None,
        }
    }

    pub fn transition(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }

        info!(run_id = %self.run_id, from = %self.state, to = %next, "Pipeline state changed");
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn record(&self, stage: Stage) -> &StageRecord {
        match stage {
            Stage::Extract => &self.extract,
            Stage::LoadBronze => &self.load,
            Stage::TransformSilver => &self.transform,
        }
    }

    pub fn record_mut(&mut self, stage: Stage) -> &mut StageRecord {
        match stage {
            Stage::Extract => &mut self.extract,
            Stage::LoadBronze => &mut self.load,
            Stage::TransformSilver => &mut self.transform,
        }
    }

    /// Marks every stage that never started as skipped.
    pub fn skip_pending(&mut self) {
        for record in [&mut self.extract, &mut self.load, &mut self.transform] {
            if record.status == StageStatus::Pending {
                record.status = StageStatus::Skipped;
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Completed
    }

    pub fn failed_stage(&self) -> Option<Stage> {
        self.failure.as_ref().map(|f| f.stage)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.to_string(),
            target_date: self.target_date,
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            stages: vec![
                (Stage::Extract, self.extract.clone()),
                (Stage::LoadBronze, self.load.clone()),
                (Stage::TransformSilver, self.transform.clone()),
            ],
            extract_file: self
                .extract_file
                .as_ref()
                .map(|f| f.path.display().to_string()),
            extracted_rows: self.extract_file.as_ref().map(|f| f.row_count),
            load_report: self.load_report.clone(),
            failed_stage: self.failed_stage(),
            error: self.failure.as_ref().map(|f| f.error.to_string()),
        }
    }
}

/// Serializable report of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub target_date: NaiveDate,
    pub state: PipelineState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<(Stage, StageRecord)>,
    pub extract_file: Option<String>,
    pub extracted_rows: Option<usize>,
    pub load_report: Option<LoadReport>,
    pub failed_stage: Option<Stage>,
    pub error: Option<String>,
}
