pub mod registry;

pub use registry::*;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::llm::{GenerationBackend, ModelManager, ModelSelection};
use crate::models::{
    AnalysisResult, EvaluationResult, Guideline, PipelineRun, RecommendationResult, StageName,
    StageOutcome, StageResult, Transcript, default_guidelines,
};
use crate::stages::{
    StageConfig, execute_analysis, execute_evaluation, execute_recommendation,
};

/// Settings for a pipeline instance
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub stage: StageConfig,
    pub models: ModelSelection,
    /// Ordered guideline set checked by the analysis stage
    pub guidelines: Vec<Guideline>,
    /// Optional reviewer note forwarded to the analysis prompt
    pub case_hint: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stage: StageConfig::default(),
            models: ModelSelection::default(),
            guidelines: default_guidelines(),
            case_hint: None,
        }
    }
}

/// Sequences the three assessment stages over one transcript.
///
/// Stages run strictly in order because recommendation consumes the
/// summaries of evaluation and analysis, and because the backend serves one
/// model at a time. A failed stage is recorded and never raises out of the
/// orchestrator; only an unreachable backend aborts a run.
pub struct Pipeline {
    backend: Arc<dyn GenerationBackend>,
    manager: ModelManager,
    config: PipelineConfig,
    registry: RunRegistry,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn GenerationBackend>, config: PipelineConfig) -> Self {
        let manager = ModelManager::new(backend.clone(), config.models.clone());
        Self {
            backend,
            manager,
            config,
            registry: RunRegistry::new(),
        }
    }

    /// Handle for progress polling
    pub fn registry(&self) -> RunRegistry {
        self.registry.clone()
    }

    /// Latest known state for a transcript
    pub fn run_status(&self, transcript_id: &str) -> Option<PipelineRun> {
        self.registry.get(transcript_id)
    }

    /// Run the full pipeline for one transcript, returning the finished run.
    ///
    /// The run is snapshotted into the registry after every stage.
    pub async fn process(&self, transcript: &Transcript, transcript_id: &str) -> PipelineRun {
        let mut run = PipelineRun::new(transcript_id);
        self.registry.update(&run);
        info!(
            "Starting pipeline run {} for transcript {}",
            run.run_id, transcript_id
        );

        if !self.backend.is_available().await {
            error!("Inference backend is not reachable, aborting run");
            run.abort("inference backend is not reachable");
            self.registry.update(&run);
            return run;
        }
        match self.backend.list_models().await {
            Ok(models) if models.is_empty() => {
                error!("Backend reports no models, aborting run");
                run.abort("no models are available on the backend");
                self.registry.update(&run);
                return run;
            }
            Ok(_) => {}
            Err(e) => {
                error!("Could not list backend models: {}", e);
                run.abort(format!("could not list backend models: {}", e));
                self.registry.update(&run);
                return run;
            }
        }

        // Evaluation
        let evaluation = self.run_evaluation(transcript).await;
        let evaluation_summary = summary_or_placeholder(
            evaluation.error_message.is_none(),
            &evaluation.summary,
        );
        run.record(
            StageName::Evaluation,
            StageOutcome::from_result(StageResult::Evaluation(evaluation)),
        );
        self.registry.update(&run);

        // Analysis
        let analysis = self.run_analysis(transcript).await;
        let analysis_summary =
            summary_or_placeholder(analysis.error_message.is_none(), &analysis.summary);
        run.record(
            StageName::Analysis,
            StageOutcome::from_result(StageResult::Analysis(analysis)),
        );
        self.registry.update(&run);

        // Recommendation, fed by whatever upstream summaries exist
        let recommendation = self
            .run_recommendation(transcript, &evaluation_summary, &analysis_summary)
            .await;
        run.record(
            StageName::Recommendation,
            StageOutcome::from_result(StageResult::Recommendation(recommendation)),
        );

        run.finalize();
        self.registry.update(&run);
        info!(
            "Pipeline run {} finished with status {:?}",
            run.run_id, run.overall_status
        );
        run
    }

    /// Dispatch a run onto the background executor; the caller does not
    /// block on inference and can poll the registry meanwhile
    pub fn spawn(
        self: &Arc<Self>,
        transcript: Transcript,
        transcript_id: String,
    ) -> tokio::task::JoinHandle<PipelineRun> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.process(&transcript, &transcript_id).await })
    }

    async fn run_evaluation(&self, transcript: &Transcript) -> EvaluationResult {
        let outcome = self
            .manager
            .run_stage(StageName::Evaluation, |model| async move {
                execute_evaluation(
                    self.backend.as_ref(),
                    &model,
                    transcript,
                    &self.config.stage,
                )
                .await
            })
            .await;
        outcome.unwrap_or_else(|e| {
            warn!("Evaluation stage could not acquire a model: {}", e);
            EvaluationResult::fallback(format!("model selection failed: {}", e))
        })
    }

    async fn run_analysis(&self, transcript: &Transcript) -> AnalysisResult {
        let outcome = self
            .manager
            .run_stage(StageName::Analysis, |model| async move {
                execute_analysis(
                    self.backend.as_ref(),
                    &model,
                    transcript,
                    &self.config.guidelines,
                    self.config.case_hint.as_deref(),
                    &self.config.stage,
                )
                .await
            })
            .await;
        outcome.unwrap_or_else(|e| {
            warn!("Analysis stage could not acquire a model: {}", e);
            AnalysisResult::fallback(
                &self.config.guidelines,
                format!("model selection failed: {}", e),
            )
        })
    }

    async fn run_recommendation(
        &self,
        transcript: &Transcript,
        evaluation_summary: &str,
        analysis_summary: &str,
    ) -> RecommendationResult {
        let outcome = self
            .manager
            .run_stage(StageName::Recommendation, |model| async move {
                execute_recommendation(
                    self.backend.as_ref(),
                    &model,
                    transcript,
                    evaluation_summary,
                    analysis_summary,
                    &self.config.stage,
                )
                .await
            })
            .await;
        outcome.unwrap_or_else(|e| {
            warn!("Recommendation stage could not acquire a model: {}", e);
            RecommendationResult::fallback(format!("model selection failed: {}", e))
        })
    }
}

/// A failed stage contributes an empty placeholder summary downstream
fn summary_or_placeholder(succeeded: bool, summary: &str) -> String {
    if succeeded {
        summary.to_string()
    } else {
        String::new()
    }
}
