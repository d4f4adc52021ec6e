use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::models::{PipelineRun, StageName, StageOutcome, StageResult, StageStatus};

/// Write the finished run as pretty-printed JSON
pub fn write_run_json(run: &PipelineRun, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    serde_json::to_writer_pretty(file, run).context("Failed to write run JSON")?;
    Ok(())
}

/// Write the human-readable assessment report
pub fn write_report(run: &PipelineRun, path: &Path) -> Result<()> {
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create file: {:?}", path))?;
    write!(file, "{}", render_report(run))?;
    Ok(())
}

/// Render a run as a human-readable assessment report
pub fn render_report(run: &PipelineRun) -> String {
    let mut out = String::new();

    out.push_str("Chat Assessment Report\n");
    out.push_str("======================\n");
    out.push_str(&format!("Transcript: {}\n", run.transcript_id));
    out.push_str(&format!("Run:        {}\n", run.run_id));
    out.push_str(&format!("Status:     {:?}\n", run.overall_status));
    if let Some(error) = &run.error_message {
        out.push_str(&format!("Error:      {}\n", error));
    }
    out.push('\n');

    for stage in StageName::ALL {
        if let Some(outcome) = run.stage(stage) {
            render_stage(&mut out, stage, outcome);
        }
    }

    out
}

fn render_stage(out: &mut String, stage: StageName, outcome: &StageOutcome) {
    let title = match stage {
        StageName::Evaluation => "Evaluation",
        StageName::Analysis => "Analysis",
        StageName::Recommendation => "Recommendation",
    };
    out.push_str(title);
    out.push('\n');
    out.push_str(&"-".repeat(title.len()));
    out.push('\n');

    if outcome.status == StageStatus::Pending {
        out.push_str("(not run)\n\n");
        return;
    }
    if let Some(error) = &outcome.error_message {
        out.push_str(&format!("Error: {}\n", error));
    }

    match &outcome.result {
        Some(StageResult::Evaluation(result)) => {
            out.push_str(&format!(
                "Coherence:  {}/5  {}\n",
                result.coherence.score, result.coherence.reasoning
            ));
            out.push_str(&format!(
                "Relevance:  {}/5  {}\n",
                result.relevance.score, result.relevance.reasoning
            ));
            out.push_str(&format!(
                "Politeness: {}/5  {}\n",
                result.politeness.score, result.politeness.reasoning
            ));
            out.push_str(&format!(
                "Resolution: {}    {}\n",
                result.resolution.score, result.resolution.reasoning
            ));
            out.push_str(&format!("Summary: {}\n", result.summary));
        }
        Some(StageResult::Analysis(result)) => {
            for finding in &result.guidelines {
                let mark = if finding.passed { "PASS" } else { "FAIL" };
                out.push_str(&format!(
                    "[{}] {} - {}\n",
                    mark, finding.guideline, finding.detail
                ));
            }
            if !result.issues.is_empty() {
                out.push_str("Issues:\n");
                for issue in &result.issues {
                    out.push_str(&format!("  - {}\n", issue));
                }
            }
            if !result.highlights.is_empty() {
                out.push_str("Highlights:\n");
                for highlight in &result.highlights {
                    out.push_str(&format!("  - {}\n", highlight));
                }
            }
            out.push_str(&format!("Summary: {}\n", result.summary));
        }
        Some(StageResult::Recommendation(result)) => {
            for (i, pair) in result.specific_feedback.iter().enumerate() {
                out.push_str(&format!("{}. Original:  {}\n", i + 1, pair.original));
                out.push_str(&format!("   Suggested: {}\n", pair.suggested));
            }
            out.push_str(&format!("Coaching: {}\n", result.long_term_coaching));
        }
        None => {}
    }

    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AnalysisResult, EvaluationResult, GuidelineFinding, RecommendationResult, ScoredMetric,
    };

    fn sample_run() -> PipelineRun {
        let mut run = PipelineRun::new("t1");
        run.record(
            StageName::Evaluation,
            StageOutcome::from_result(StageResult::Evaluation(EvaluationResult {
                coherence: ScoredMetric::new(4, "flows"),
                relevance: ScoredMetric::new(5, "on point"),
                politeness: ScoredMetric::new(2, "curt"),
                resolution: ScoredMetric::new(1, "fixed"),
                summary: "Resolved but brusque.".to_string(),
                error_message: None,
            })),
        );
        run.record(
            StageName::Analysis,
            StageOutcome::from_result(StageResult::Analysis(AnalysisResult {
                guidelines: vec![
                    GuidelineFinding {
                        guideline: "Acknowledge and Empathize".to_string(),
                        passed: false,
                        detail: "No empathy shown.".to_string(),
                    },
                    GuidelineFinding::unknown("Proactive Help"),
                ],
                issues: vec!["curt replies".to_string()],
                highlights: vec![],
                summary: "Mixed.".to_string(),
                error_message: None,
            })),
        );
        run.record(
            StageName::Recommendation,
            StageOutcome::from_result(StageResult::Recommendation(RecommendationResult::fallback(
                "model never produced feedback",
            ))),
        );
        run.finalize();
        run
    }

    #[test]
    fn test_report_includes_all_stage_sections() {
        let report = render_report(&sample_run());
        assert!(report.contains("Chat Assessment Report"));
        assert!(report.contains("Coherence:  4/5"));
        assert!(report.contains("[FAIL] Acknowledge and Empathize - No empathy shown."));
        assert!(report.contains("  - curt replies"));
        assert!(report.contains("Error: model never produced feedback"));
    }

    #[test]
    fn test_report_marks_pending_stages() {
        let mut run = PipelineRun::new("t2");
        run.abort("backend unreachable");
        let report = render_report(&run);
        assert!(report.contains("Error:      backend unreachable"));
        assert!(report.contains("(not run)"));
    }

    #[test]
    fn test_write_run_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let run = sample_run();
        write_run_json(&run, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: PipelineRun = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.transcript_id, run.transcript_id);
        assert_eq!(parsed.overall_status, run.overall_status);
    }

    #[test]
    fn test_write_report_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        write_report(&sample_run(), &path).unwrap();
        assert!(std::fs::read_to_string(&path)
            .unwrap()
            .contains("Recommendation"));
    }
}
