use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::PipelineRun;

/// Shared in-memory projection of the latest run per transcript.
///
/// The orchestrator snapshots the run here after every stage, so a
/// concurrent status reader never observes a stage go backward. Best-effort
/// only: once a run is terminal, the persisted record is the source of
/// truth.
#[derive(Clone, Default)]
pub struct RunRegistry {
    inner: Arc<RwLock<HashMap<String, PipelineRun>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the current state of a run
    pub fn update(&self, run: &PipelineRun) {
        let mut runs = self.inner.write().unwrap_or_else(|e| e.into_inner());
        runs.insert(run.transcript_id.clone(), run.clone());
    }

    /// Latest known state for a transcript
    pub fn get(&self, transcript_id: &str) -> Option<PipelineRun> {
        let runs = self.inner.read().unwrap_or_else(|e| e.into_inner());
        runs.get(transcript_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OverallStatus, StageName, StageStatus};

    #[test]
    fn test_registry_round_trip() {
        let registry = RunRegistry::new();
        assert!(registry.get("t1").is_none());

        let run = PipelineRun::new("t1");
        registry.update(&run);

        let fetched = registry.get("t1").unwrap();
        assert_eq!(fetched.run_id, run.run_id);
        assert_eq!(fetched.overall_status, OverallStatus::Processing);
        assert_eq!(
            fetched.stage(StageName::Evaluation).unwrap().status,
            StageStatus::Pending
        );
    }

    #[test]
    fn test_registry_returns_latest_snapshot() {
        let registry = RunRegistry::new();
        let mut run = PipelineRun::new("t1");
        registry.update(&run);

        run.abort("backend unreachable");
        registry.update(&run);

        let fetched = registry.get("t1").unwrap();
        assert_eq!(fetched.overall_status, OverallStatus::Failed);
    }
}
