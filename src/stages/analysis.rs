use serde_json::{Map, Value};
use tracing::info;

use crate::llm::{
    ExtractionSpec, GenerationBackend, RequiredKey, align_guidelines, build_analysis_prompt,
    extract_object, lookup, string_field, string_items, validate_analysis,
};
use crate::models::{AnalysisResult, Guideline, GuidelineFinding, Transcript};

use super::StageConfig;
use super::retry::run_with_retry;

const ANALYSIS_KEYS: &[RequiredKey] = &[
    RequiredKey::list("key_issues"),
    RequiredKey::list("positive_highlights"),
    RequiredKey::list("guideline_adherence"),
];

const ANALYSIS_SPEC: ExtractionSpec = ExtractionSpec {
    required: ANALYSIS_KEYS,
};

/// Run the analysis stage: guideline compliance plus notable moments.
///
/// The accepted result always reports exactly one finding per configured
/// guideline. When retries are exhausted, a partial candidate is salvaged
/// with absent guidelines synthesized as failed; with no candidate at all
/// the full fallback is returned.
pub async fn execute_analysis(
    backend: &dyn GenerationBackend,
    model: &str,
    transcript: &Transcript,
    guidelines: &[Guideline],
    case_hint: Option<&str>,
    config: &StageConfig,
) -> AnalysisResult {
    let options = config.generate_options();
    let options_ref = &options;

    let outcome = run_with_retry(
        "analysis",
        config.max_attempts,
        |extra| {
            let prompt = build_analysis_prompt(transcript, guidelines, case_hint, extra.as_deref());
            async move { backend.generate(model, &prompt, options_ref).await }
        },
        |raw| extract_object(raw, &ANALYSIS_SPEC).map(|candidate| shape(&candidate)),
        |result| validate_analysis(result, guidelines),
    )
    .await;

    match outcome.value {
        Some(mut result) => {
            result.guidelines = align_guidelines(&result.guidelines, guidelines);
            info!(
                "Analysis accepted after {} attempt(s): {} issue(s), {} highlight(s)",
                outcome.attempts,
                result.issues.len(),
                result.highlights.len()
            );
            result
        }
        None => {
            let error = outcome.failure_message();
            match outcome.last_candidate {
                Some(mut partial) => {
                    partial.guidelines = align_guidelines(&partial.guidelines, guidelines);
                    partial.error_message = Some(error);
                    partial
                }
                None => AnalysisResult::fallback(guidelines, error),
            }
        }
    }
}

fn shape(candidate: &Map<String, Value>) -> AnalysisResult {
    AnalysisResult {
        guidelines: findings(candidate.get("guideline_adherence")),
        issues: string_items(candidate.get("key_issues")),
        highlights: string_items(candidate.get("positive_highlights")),
        summary: string_field(candidate, &["analysis_summary", "summary"])
            .unwrap_or_else(|| "N/A".to_string()),
        error_message: None,
    }
}

/// Read guideline verdicts, tolerating either a Passed/Failed status string
/// or a boolean `passed` field; entries with no name are dropped
fn findings(value: Option<&Value>) -> Vec<GuidelineFinding> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|entry| {
                    let guideline =
                        string_field(entry, &["guideline", "name", "key"])?;
                    let passed = lookup(entry, "passed")
                        .and_then(Value::as_bool)
                        .or_else(|| {
                            lookup(entry, "status")
                                .and_then(Value::as_str)
                                .map(|s| s.trim().eq_ignore_ascii_case("passed"))
                        })
                        .unwrap_or(false);
                    let detail = string_field(entry, &["details", "detail"])
                        .unwrap_or_else(|| "Unknown".to_string());
                    Some(GuidelineFinding {
                        guideline,
                        passed,
                        detail,
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
    use crate::models::{Message, Sender, default_guidelines};

    fn transcript() -> Transcript {
        Transcript::new(vec![
            Message::new(Sender::Customer, "My package is stuck in transit."),
            Message::new(Sender::Agent, "That's out of our hands."),
        ])
    }

    fn two_guidelines() -> Vec<Guideline> {
        vec![
            Guideline::new("A", "First rule."),
            Guideline::new("B", "Second rule."),
        ]
    }

    #[tokio::test]
    async fn test_accepts_complete_analysis() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        backend.push_reply(
            r#"{"key_issues": ["dismissive tone"], "positive_highlights": [],
                "guideline_adherence": [
                    {"guideline": "A", "status": "Passed", "details": "ok"},
                    {"guideline": "B", "status": "Failed", "details": "no empathy"}
                ],
                "analysis_summary": "Needs work."}"#,
        );

        let result = execute_analysis(
            &backend,
            "m1",
            &transcript(),
            &two_guidelines(),
            None,
            &StageConfig::default(),
        )
        .await;

        assert!(result.error_message.is_none());
        assert_eq!(result.guidelines.len(), 2);
        assert!(result.guidelines[0].passed);
        assert!(!result.guidelines[1].passed);
        assert_eq!(result.issues, vec!["dismissive tone".to_string()]);
        assert_eq!(result.summary, "Needs work.");
    }

    #[tokio::test]
    async fn test_missing_guideline_triggers_retry_then_synthesized_finding() {
        // Guideline B is never reported: one retry per remaining attempt,
        // then the partial candidate is salvaged with B marked failed/Unknown
        let backend = ScriptedBackend::with_models(&["m1"]);
        let omits_b = r#"Sure! Here you go: ```{"key_issues": ["x"], "positive_highlights": [],
            "guideline_adherence": [{"guideline": "A", "status": "Passed", "details": "ok"}]}```
            Let me know if you need more."#;
        for _ in 0..3 {
            backend.push_reply(omits_b);
        }

        let result = execute_analysis(
            &backend,
            "m1",
            &transcript(),
            &two_guidelines(),
            None,
            &StageConfig::default(),
        )
        .await;

        assert_eq!(backend.prompts().len(), 3);
        assert!(backend.prompts()[1].contains("guideline 'B' is missing"));

        assert!(result.error_message.is_some());
        assert_eq!(result.guidelines.len(), 2);
        assert_eq!(result.guidelines[0].guideline, "A");
        assert!(result.guidelines[0].passed);
        assert_eq!(result.guidelines[1].guideline, "B");
        assert!(!result.guidelines[1].passed);
        assert_eq!(result.guidelines[1].detail, "Unknown");
    }

    #[tokio::test]
    async fn test_unparseable_output_falls_back_with_all_guidelines() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        for _ in 0..3 {
            backend.push_reply("I am unable to analyze this conversation.");
        }

        let configured = default_guidelines();
        let result = execute_analysis(
            &backend,
            "m1",
            &transcript(),
            &configured,
            None,
            &StageConfig::default(),
        )
        .await;

        assert!(result.error_message.is_some());
        assert_eq!(result.guidelines.len(), configured.len());
        assert!(result.guidelines.iter().all(|f| !f.passed));
        assert!(result.issues.is_empty());
    }

    #[tokio::test]
    async fn test_boolean_passed_field_is_understood() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        backend.push_reply(
            r#"{"key_issues": [], "positive_highlights": ["quick escalation"],
                "guideline_adherence": [
                    {"guideline": "A", "passed": true, "details": "ok"},
                    {"guideline": "B", "passed": false, "details": "missed"}
                ]}"#,
        );

        let result = execute_analysis(
            &backend,
            "m1",
            &transcript(),
            &two_guidelines(),
            None,
            &StageConfig::default(),
        )
        .await;

        assert!(result.error_message.is_none());
        assert!(result.guidelines[0].passed);
        assert!(!result.guidelines[1].passed);
        assert_eq!(result.summary, "N/A");
    }

    #[tokio::test]
    async fn test_case_hint_reaches_prompt() {
        let backend = ScriptedBackend::with_models(&["m1"]);
        backend.push_reply(
            r#"{"key_issues": ["x"], "positive_highlights": [],
                "guideline_adherence": [
                    {"guideline": "A", "status": "Failed", "details": "y"},
                    {"guideline": "B", "status": "Failed", "details": "z"}
                ]}"#,
        );

        execute_analysis(
            &backend,
            "m1",
            &transcript(),
            &two_guidelines(),
            Some("agent deflects responsibility"),
            &StageConfig::default(),
        )
        .await;

        assert!(backend.prompts()[0].contains("agent deflects responsibility"));
    }
}
