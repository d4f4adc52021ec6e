use serde_json::{Map, Value};
use tracing::info;

use crate::llm::{
    ExtractionSpec, GenerationBackend, RequiredKey, build_evaluation_prompt, extract_object,
    lookup, string_field, validate_evaluation,
};
use crate::models::{EvaluationResult, ScoredMetric, Transcript};

use super::StageConfig;
use super::retry::run_with_retry;

const EVALUATION_KEYS: &[RequiredKey] = &[
    RequiredKey::object("coherence"),
    RequiredKey::object("relevance"),
    RequiredKey::object("politeness"),
    RequiredKey::object("resolution"),
];

const EVALUATION_SPEC: ExtractionSpec = ExtractionSpec {
    required: EVALUATION_KEYS,
};

/// Run the evaluation stage: numeric quality scoring of the transcript.
///
/// Never fails outward; when the retry budget is exhausted the deterministic
/// fallback result is returned with `error_message` set.
pub async fn execute_evaluation(
    backend: &dyn GenerationBackend,
    model: &str,
    transcript: &Transcript,
    config: &StageConfig,
) -> EvaluationResult {
    let options = config.generate_options();
    let options_ref = &options;

    let outcome = run_with_retry(
        "evaluation",
        config.max_attempts,
        |extra| {
            let prompt = build_evaluation_prompt(transcript, extra.as_deref());
            async move { backend.generate(model, &prompt, options_ref).await }
        },
        |raw| extract_object(raw, &EVALUATION_SPEC).map(|candidate| shape(&candidate)),
        validate_evaluation,
    )
    .await;

    match outcome.value {
        Some(result) => {
            info!(
                "Evaluation accepted after {} attempt(s): coherence={} relevance={} politeness={} resolution={}",
                outcome.attempts,
                result.coherence.score,
                result.relevance.score,
                result.politeness.score,
                result.resolution.score
            );
            result
        }
        None => EvaluationResult::fallback(outcome.failure_message()),
    }
}

/// Shape a reconciled candidate into the typed result; unreadable scores
/// become a sentinel that validation rejects
fn shape(candidate: &Map<String, Value>) -> EvaluationResult {
    EvaluationResult {
        coherence: metric(candidate, "coherence"),
        relevance: metric(candidate, "relevance"),
        politeness: metric(candidate, "politeness"),
        resolution: metric(candidate, "resolution"),
        summary: string_field(candidate, &["summary", "evaluation_summary"])
            .unwrap_or_else(|| "N/A".to_string()),
        error_message: None,
    }
}

fn metric(candidate: &Map<String, Value>, name: &str) -> ScoredMetric {
    let entry = lookup(candidate, name).and_then(Value::as_object);
    let score = entry
        .and_then(|o| lookup(o, "score"))
        .and_then(score_of)
        .unwrap_or(u8::MAX);
    let reasoning = entry
        .and_then(|o| lookup(o, "reasoning"))
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string();
    ScoredMetric { score, reasoning }
}

/// Accept integers, floats, and numeric strings; floats are rounded the way
/// models tend to mean them (4.2 is a 4)
fn score_of(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    let rounded = n.round();
    (0.0..=200.0).contains(&rounded).then_some(rounded as u8)
}
