pub mod io;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod stages;

pub use io::{
    parse_guidelines_file, parse_transcript_file, parse_transcript_json, render_report,
    write_report, write_run_json,
};
pub use llm::{
    BackendError, GenerateOptions, GenerationBackend, ModelDescriptor, ModelManager,
    ModelSelection, OllamaClient,
};
pub use models::{
    AnalysisResult, EvaluationResult, FeedbackPair, Guideline, GuidelineFinding, Message,
    OverallStatus, PipelineRun, RecommendationResult, ScoredMetric, Sender, StageName,
    StageOutcome, StageResult, StageStatus, Transcript, default_guidelines,
};
pub use pipeline::{Pipeline, PipelineConfig, RunRegistry};
pub use stages::{StageConfig, execute_analysis, execute_evaluation, execute_recommendation};
