use serde::{Deserialize, Serialize};

use super::guideline::Guideline;

/// A single scored quality dimension with the model's justification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMetric {
    pub score: u8,
    pub reasoning: String,
}

impl ScoredMetric {
    pub fn new(score: u8, reasoning: impl Into<String>) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
        }
    }
}

/// Outcome of the evaluation stage: numeric quality scores for the exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// How well the conversation flows (1-5)
    pub coherence: ScoredMetric,
    /// How relevant the agent's responses are to the customer's needs (1-5)
    pub relevance: ScoredMetric,
    /// How polite and professional the agent is (1-5)
    pub politeness: ScoredMetric,
    /// Whether the customer's issue was resolved (0 or 1)
    pub resolution: ScoredMetric,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl EvaluationResult {
    /// Deterministic placeholder produced when the retry budget is exhausted.
    ///
    /// Mid-range scores are deliberate: a failed stage must not read as a
    /// strongly good or bad interaction downstream.
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            coherence: ScoredMetric::new(3, "Unknown"),
            relevance: ScoredMetric::new(3, "Unknown"),
            politeness: ScoredMetric::new(3, "Unknown"),
            resolution: ScoredMetric::new(0, "Unknown"),
            summary: "N/A".to_string(),
            error_message: Some(error.into()),
        }
    }
}

/// Pass/fail verdict for one configured guideline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuidelineFinding {
    pub guideline: String,
    pub passed: bool,
    pub detail: String,
}

impl GuidelineFinding {
    /// Sentinel finding for a guideline the model never reported on
    pub fn unknown(guideline: impl Into<String>) -> Self {
        Self {
            guideline: guideline.into(),
            passed: false,
            detail: "Unknown".to_string(),
        }
    }
}

/// Outcome of the analysis stage: guideline compliance plus notable moments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Exactly one finding per configured guideline, in configured order
    pub guidelines: Vec<GuidelineFinding>,
    pub issues: Vec<String>,
    pub highlights: Vec<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnalysisResult {
    /// Deterministic placeholder: every configured guideline marked failed
    pub fn fallback(configured: &[Guideline], error: impl Into<String>) -> Self {
        Self {
            guidelines: configured
                .iter()
                .map(|g| GuidelineFinding::unknown(&g.key))
                .collect(),
            issues: vec![],
            highlights: vec![],
            summary: "N/A".to_string(),
            error_message: Some(error.into()),
        }
    }
}

/// One concrete rewrite suggestion for an agent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPair {
    pub original: String,
    pub suggested: String,
}

/// Outcome of the recommendation stage: coaching feedback for the agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub specific_feedback: Vec<FeedbackPair>,
    pub long_term_coaching: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RecommendationResult {
    pub fn fallback(error: impl Into<String>) -> Self {
        Self {
            specific_feedback: vec![],
            long_term_coaching: "N/A".to_string(),
            error_message: Some(error.into()),
        }
    }
}

/// Result of one assessment stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum StageResult {
    Evaluation(EvaluationResult),
    Analysis(AnalysisResult),
    Recommendation(RecommendationResult),
}

impl StageResult {
    /// Failure cause, present only when the stage exhausted its retries
    pub fn error_message(&self) -> Option<&str> {
        match self {
            StageResult::Evaluation(r) => r.error_message.as_deref(),
            StageResult::Analysis(r) => r.error_message.as_deref(),
            StageResult::Recommendation(r) => r.error_message.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::guideline::default_guidelines;

    #[test]
    fn test_evaluation_fallback_is_schema_valid() {
        let result = EvaluationResult::fallback("budget exhausted");
        assert_eq!(result.coherence.score, 3);
        assert_eq!(result.relevance.score, 3);
        assert_eq!(result.politeness.score, 3);
        assert_eq!(result.resolution.score, 0);
        assert!(result.error_message.is_some());
    }

    #[test]
    fn test_analysis_fallback_covers_every_guideline() {
        let configured = default_guidelines();
        let result = AnalysisResult::fallback(&configured, "no output");
        assert_eq!(result.guidelines.len(), configured.len());
        for (finding, guideline) in result.guidelines.iter().zip(&configured) {
            assert_eq!(finding.guideline, guideline.key);
            assert!(!finding.passed);
            assert_eq!(finding.detail, "Unknown");
        }
    }

    #[test]
    fn test_stage_result_error_message() {
        let ok = StageResult::Recommendation(RecommendationResult {
            specific_feedback: vec![],
            long_term_coaching: "Listen more.".to_string(),
            error_message: None,
        });
        assert!(ok.error_message().is_none());

        let failed = StageResult::Evaluation(EvaluationResult::fallback("timed out"));
        assert_eq!(failed.error_message(), Some("timed out"));
    }

    #[test]
    fn test_stage_result_serializes_with_stage_tag() {
        let result = StageResult::Evaluation(EvaluationResult::fallback("x"));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["stage"], "evaluation");
        assert_eq!(json["coherence"]["score"], 3);
    }
}
