use serde_json::{Map, Value};
use tracing::info;

use crate::llm::{
    ExtractionSpec, GenerationBackend, RequiredKey, build_recommendation_prompt, extract_object,
    string_field, validate_recommendation,
};
use crate::models::{FeedbackPair, RecommendationResult, Transcript};

use super::StageConfig;
use super::retry::run_with_retry;

const RECOMMENDATION_KEYS: &[RequiredKey] = &[RequiredKey::list("specific_feedback")];

const RECOMMENDATION_SPEC: ExtractionSpec = ExtractionSpec {
    required: RECOMMENDATION_KEYS,
};

/// Run the recommendation stage: coaching feedback derived from the
/// transcript and the summaries of the two earlier stages.
///
/// Upstream summaries may be empty placeholders when those stages failed.
pub async fn execute_recommendation(
    backend: &dyn GenerationBackend,
    model: &str,
    transcript: &Transcript,
    evaluation_summary: &str,
    analysis_summary: &str,
    config: &StageConfig,
) -> RecommendationResult {
    let options = config.generate_options();
    let options_ref = &options;

    let outcome = run_with_retry(
        "recommendation",
        config.max_attempts,
        |extra| {
            let prompt = build_recommendation_prompt(
                transcript,
                evaluation_summary,
                analysis_summary,
                extra.as_deref(),
            );
            async move { backend.generate(model, &prompt, options_ref).await }
        },
        |raw| extract_object(raw, &RECOMMENDATION_SPEC).map(|candidate| shape(&candidate)),
        validate_recommendation,
    )
    .await;

    match outcome.value {
        Some(result) => {
            info!(
                "Recommendation accepted after {} attempt(s): {} feedback pair(s)",
                outcome.attempts,
                result.specific_feedback.len()
            );
            result
        }
        None => RecommendationResult::fallback(outcome.failure_message()),
    }
}

fn shape(candidate: &Map<String, Value>) -> RecommendationResult {
    RecommendationResult {
        specific_feedback: feedback_pairs(candidate.get("specific_feedback")),
        long_term_coaching: string_field(candidate, &["long_term_coaching", "coaching"])
            .unwrap_or_default(),
        error_message: None,
    }
}

/// Read rewrite suggestions; pairs missing either side are dropped
fn feedback_pairs(value: Option<&Value>) -> Vec<FeedbackPair> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|entry| {
                    let original = string_field(entry, &["original_text", "original"])?;
                    let suggested = string_field(entry, &["suggested_text", "suggested"])?;
                    Some(FeedbackPair {
                        original,
                        suggested,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::models::{Message, Sender};

    fn transcript() -> Transcript {
        Transcript::new(vec![
            Message::new(Sender::Customer, "My order never arrived."),
            Message::new(Sender::Agent, "Not our problem, call the courier."),
        ])
    }

    #[tokio::test]
    async fn test_accepts_feedback_pairs() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        backend.push_reply(
            r#"{"specific_feedback": [
                    {"original_text": "Not our problem, call the courier.",
                     "suggested_text": "I'm sorry about the delay, let me track this down for you."}
                ],
                "long_term_coaching": "Take ownership of delivery issues."}"#,
        );

        let result = execute_recommendation(
            &backend,
            "m1",
            &transcript(),
            "Poor politeness.",
            "Empathy guideline failed.",
            &StageConfig::default(),
        )
        .await;

        assert!(result.error_message.is_none());
        assert_eq!(result.specific_feedback.len(), 1);
        assert!(result.specific_feedback[0].suggested.contains("sorry"));
        assert_eq!(
            result.long_term_coaching,
            "Take ownership of delivery issues."
        );
    }

    #[tokio::test]
    async fn test_summaries_are_embedded_in_prompt() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        backend.push_reply(
            r#"{"specific_feedback": [], "long_term_coaching": "Listen first."}"#,
        );

        execute_recommendation(
            &backend,
            "m1",
            &transcript(),
            "eval summary text",
            "analysis summary text",
            &StageConfig::default(),
        )
        .await;

        let prompt = &backend.prompts()[0];
        assert!(prompt.contains("eval summary text"));
        assert!(prompt.contains("analysis summary text"));
    }

    #[tokio::test]
    async fn test_empty_feedback_and_coaching_retries_then_falls_back() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        for _ in 0..3 {
            backend.push_reply(r#"{"specific_feedback": [], "long_term_coaching": ""}"#);
        }

        let result = execute_recommendation(
            &backend,
            "m1",
            &transcript(),
            "",
            "",
            &StageConfig::default(),
        )
        .await;

        assert_eq!(backend.prompts().len(), 3);
        assert!(result.error_message.is_some());
        assert!(result.specific_feedback.is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_pairs_are_dropped() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        backend.push_reply(
            r#"{"specific_feedback": [
                    {"original_text": "only one side"},
                    {"original": "a", "suggested": "b"}
                ],
                "long_term_coaching": "Be concrete."}"#,
        );

        let result = execute_recommendation(
            &backend,
            "m1",
            &transcript(),
            "",
            "",
            &StageConfig::default(),
        )
        .await;

        assert_eq!(result.specific_feedback.len(), 1);
        assert_eq!(result.specific_feedback[0].original, "a");
    }
}
