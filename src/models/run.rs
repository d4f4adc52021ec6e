use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::stage_result::StageResult;

/// One of the three assessment passes run over a transcript.
///
/// Variant order is execution order; recommendation consumes the summaries
/// produced by the first two stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Evaluation,
    Analysis,
    Recommendation,
}

impl StageName {
    pub const ALL: [StageName; 3] = [
        StageName::Evaluation,
        StageName::Analysis,
        StageName::Recommendation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Evaluation => "evaluation",
            StageName::Analysis => "analysis",
            StageName::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Completed,
    Failed,
}

/// Recorded outcome of a single stage within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: StageStatus,
    /// Present once the stage has run; failed stages carry their fallback
    /// result here so consumers never see a hole in the schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<StageResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl StageOutcome {
    pub fn pending() -> Self {
        Self {
            status: StageStatus::Pending,
            result: None,
            error_message: None,
        }
    }

    /// Classify a finished stage by the presence of its failure cause
    pub fn from_result(result: StageResult) -> Self {
        let error_message = result.error_message().map(str::to_string);
        Self {
            status: if error_message.is_some() {
                StageStatus::Failed
            } else {
                StageStatus::Completed
            },
            result: Some(result),
            error_message,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Processing,
    Completed,
    Failed,
}

/// The full lifecycle record of one pipeline execution.
///
/// Created with every stage pending, mutated in place as stages finish, and
/// immutable once the overall status leaves `Processing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub transcript_id: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: BTreeMap<StageName, StageOutcome>,
    pub overall_status: OverallStatus,
    /// Set only when the run failed before any stage could start
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PipelineRun {
    pub fn new(transcript_id: impl Into<String>) -> Self {
        let stages = StageName::ALL
            .iter()
            .map(|&stage| (stage, StageOutcome::pending()))
            .collect();
        Self {
            transcript_id: transcript_id.into(),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            stages,
            overall_status: OverallStatus::Processing,
            error_message: None,
        }
    }

    pub fn stage(&self, name: StageName) -> Option<&StageOutcome> {
        self.stages.get(&name)
    }

    /// Record a finished stage
    pub fn record(&mut self, stage: StageName, outcome: StageOutcome) {
        self.stages.insert(stage, outcome);
    }

    /// Fail the whole run before any stage has been attempted
    pub fn abort(&mut self, error: impl Into<String>) {
        self.overall_status = OverallStatus::Failed;
        self.error_message = Some(error.into());
        self.finished_at = Some(Utc::now());
    }

    /// Compute the terminal status: failed only when every stage failed;
    /// partial success still counts as completed.
    pub fn finalize(&mut self) {
        let all_failed = self
            .stages
            .values()
            .all(|o| o.status == StageStatus::Failed);
        self.overall_status = if all_failed {
            OverallStatus::Failed
        } else {
            OverallStatus::Completed
        };
        self.finished_at = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.overall_status != OverallStatus::Processing
    }

    /// Per-stage failure causes, for the progress query
    pub fn error_messages(&self) -> BTreeMap<StageName, String> {
        self.stages
            .iter()
            .filter_map(|(&stage, outcome)| {
                outcome.error_message.clone().map(|msg| (stage, msg))
            })
            .collect()
    }
}
