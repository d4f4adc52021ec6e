use crate::models::{
    AnalysisResult, EvaluationResult, Guideline, GuidelineFinding, RecommendationResult,
    ScoredMetric,
};

/// Whitespace- and case-insensitive form used to match guideline names
fn normalized(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Configured guidelines absent from a set of findings, in configured order
pub fn missing_guidelines(findings: &[GuidelineFinding], configured: &[Guideline]) -> Vec<String> {
    configured
        .iter()
        .filter(|g| {
            !findings
                .iter()
                .any(|f| normalized(&f.guideline) == normalized(&g.key))
        })
        .map(|g| g.key.clone())
        .collect()
}

/// Rebuild a findings list in configured order: one entry per guideline,
/// duplicates dropped, absent guidelines synthesized as failed/Unknown
pub fn align_guidelines(
    findings: &[GuidelineFinding],
    configured: &[Guideline],
) -> Vec<GuidelineFinding> {
    configured
        .iter()
        .map(|guideline| {
            findings
                .iter()
                .find(|f| normalized(&f.guideline) == normalized(&guideline.key))
                .map(|found| GuidelineFinding {
                    guideline: guideline.key.clone(),
                    passed: found.passed,
                    detail: found.detail.clone(),
                })
                .unwrap_or_else(|| GuidelineFinding::unknown(&guideline.key))
        })
        .collect()
}

fn check_range(name: &str, metric: &ScoredMetric, min: u8, max: u8, errors: &mut Vec<String>) {
    if metric.score < min || metric.score > max {
        errors.push(format!(
            "{} score {} is outside the {}-{} range",
            name, metric.score, min, max
        ));
    }
}

/// Stage rules for evaluation: every score within its declared closed range
pub fn validate_evaluation(result: &EvaluationResult) -> Vec<String> {
    let mut errors = Vec::new();
    check_range("coherence", &result.coherence, 1, 5, &mut errors);
    check_range("relevance", &result.relevance, 1, 5, &mut errors);
    check_range("politeness", &result.politeness, 1, 5, &mut errors);
    check_range("resolution", &result.resolution, 0, 1, &mut errors);
    errors
}

/// Stage rules for analysis: every configured guideline reported, and at
/// least one issue or highlight present
pub fn validate_analysis(result: &AnalysisResult, configured: &[Guideline]) -> Vec<String> {
    let mut errors = Vec::new();
    for key in missing_guidelines(&result.guidelines, configured) {
        errors.push(format!(
            "guideline '{}' is missing from guideline_adherence",
            key
        ));
    }
    if result.issues.is_empty() && result.highlights.is_empty() {
        errors.push("at least one key issue or one positive highlight is required".to_string());
    }
    errors
}

/// Stage rules for recommendation: some feedback must exist
pub fn validate_recommendation(result: &RecommendationResult) -> Vec<String> {
    if result.specific_feedback.is_empty() && result.long_term_coaching.trim().is_empty() {
        vec![
            "at least one specific feedback pair or a long-term coaching paragraph is required"
                .to_string(),
        ]
    } else {
        vec![]
    }
}
