use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::llm::client::{BackendError, GenerationBackend};
use crate::models::StageName;

/// Per-stage model defaults plus an optional global override.
///
/// Resolution order: explicit override, then the stage default, then the
/// first model the backend reports.
#[derive(Debug, Clone, Default)]
pub struct ModelSelection {
    /// Used for every stage when set
    pub override_model: Option<String>,
    pub evaluation: Option<String>,
    pub analysis: Option<String>,
    pub recommendation: Option<String>,
}

impl ModelSelection {
    fn stage_default(&self, stage: StageName) -> Option<&str> {
        match stage {
            StageName::Evaluation => self.evaluation.as_deref(),
            StageName::Analysis => self.analysis.as_deref(),
            StageName::Recommendation => self.recommendation.as_deref(),
        }
    }
}

/// Chooses a model per stage and scopes its load around stage execution.
///
/// The backend serves a single active model per host, so an internal lock
/// guarantees at most one loaded model per manager even when several runs
/// execute concurrently. This is scoped acquisition, not a cache: nothing
/// stays loaded between stages.
pub struct ModelManager {
    backend: Arc<dyn GenerationBackend>,
    selection: ModelSelection,
    loaded: Mutex<Option<String>>,
}

impl ModelManager {
    pub fn new(backend: Arc<dyn GenerationBackend>, selection: ModelSelection) -> Self {
        Self {
            backend,
            selection,
            loaded: Mutex::new(None),
        }
    }

    /// Pick the model for a stage, falling back to the first available model
    /// when the requested one is not served
    pub async fn select_model(&self, stage: StageName) -> Result<String, BackendError> {
        let models = self.backend.list_models().await?;
        if models.is_empty() {
            return Err(BackendError::NoModels);
        }

        let wanted = self
            .selection
            .override_model
            .as_deref()
            .or_else(|| self.selection.stage_default(stage));

        if let Some(name) = wanted {
            if models.iter().any(|m| m.name == name) {
                return Ok(name.to_string());
            }
            warn!(
                "Model {} not available for {} stage, using {} instead",
                name, stage, models[0].name
            );
        }
        Ok(models[0].name.clone())
    }

    /// Run `f` with a model exclusively loaded for `stage`.
    ///
    /// The unload happens whether or not the stage produces a usable result;
    /// a result already produced is never discarded over unload trouble.
    pub async fn run_stage<T, F, Fut>(&self, stage: StageName, f: F) -> Result<T, BackendError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let model = self.select_model(stage).await?;

        let mut loaded = self.loaded.lock().await;
        *loaded = Some(model.clone());
        info!("Model {} loaded for {} stage", model, stage);

        let result = f(model.clone()).await;

        *loaded = None;
        info!("Model {} unloaded after {} stage", model, stage);

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn backend_with_models(models: &[&str]) -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend::with_models(models))
    }

    #[tokio::test]
    async fn test_select_prefers_override_then_default_then_first() {
        let backend = backend_with_models(&["m1", "m2", "m3"]);

        let manager = ModelManager::new(
            backend.clone(),
            ModelSelection {
                override_model: Some("m3".to_string()),
                evaluation: Some("m2".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            manager.select_model(StageName::Evaluation).await.unwrap(),
            "m3"
        );

        let manager = ModelManager::new(
            backend.clone(),
            ModelSelection {
                evaluation: Some("m2".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            manager.select_model(StageName::Evaluation).await.unwrap(),
            "m2"
        );
        assert_eq!(
            manager.select_model(StageName::Analysis).await.unwrap(),
            "m1"
        );
    }

    #[tokio::test]
    async fn test_select_falls_back_when_requested_model_is_missing() {
        let backend = backend_with_models(&["m1"]);
        let manager = ModelManager::new(
            backend,
            ModelSelection {
                override_model: Some("ghost".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            manager.select_model(StageName::Evaluation).await.unwrap(),
            "m1"
        );
    }

    #[tokio::test]
    async fn test_select_fails_with_no_models() {
        let backend = backend_with_models(&[]);
        let manager = ModelManager::new(backend, ModelSelection::default());
        assert!(matches!(
            manager.select_model(StageName::Evaluation).await,
            Err(BackendError::NoModels)
        ));
    }

    #[tokio::test]
    async fn test_run_stage_never_overlaps_loaded_models() {
        let backend = backend_with_models(&["m1"]);
        let manager = Arc::new(ModelManager::new(backend, ModelSelection::default()));

        let active = Arc::new(AtomicUsize::new(0));
        let max_active = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let manager = Arc::clone(&manager);
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            handles.push(tokio::spawn(async move {
                manager
                    .run_stage(StageName::Evaluation, |_model| async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        max_active.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_stage_unloads_after_completion() {
        let backend = backend_with_models(&["m1"]);
        let manager = ModelManager::new(backend, ModelSelection::default());

        let out = manager
            .run_stage(StageName::Analysis, |model| async move { model })
            .await
            .unwrap();
        assert_eq!(out, "m1");
        assert!(manager.loaded.lock().await.is_none());
    }
}
