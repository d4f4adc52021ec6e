use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors surfaced by the inference backend.
///
/// Typed variants let stage agents branch on the failure class without
/// string matching: unreachability aborts the whole run, while timeouts and
/// API errors only consume one retry attempt.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("inference backend is not reachable: {0}")]
    Unavailable(String),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("no models are available on the backend")]
    NoModels,
    #[error("backend returned an empty response")]
    EmptyResponse,
    #[error("transport error: {0}")]
    Transport(String),
}

/// A model the backend can serve
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Sampling and budget settings for one generation call
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub top_p: f32,
    /// Response length cap in tokens
    pub max_tokens: u32,
    /// Hard deadline for the call; expiry counts against the retry budget
    pub timeout: Duration,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.9,
            max_tokens: 2048,
            timeout: Duration::from_secs(300),
        }
    }
}

/// A text-generation service the pipeline can drive
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Cheap reachability probe; must not block for more than a few seconds
    async fn is_available(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError>;

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, BackendError>;
}

/// Client for a local Ollama server
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const LIST_TIMEOUT: Duration = Duration::from_secs(5);

impl OllamaClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a client from the OLLAMA_HOST environment variable,
    /// defaulting to the standard local port
    pub fn from_env() -> Self {
        let base_url =
            std::env::var("OLLAMA_HOST").unwrap_or_else(|_| "http://localhost:11434".to_string());
        Self::new(base_url)
    }

    /// Pull a model into the backend's local store
    pub async fn pull_model(&self, name: &str) -> Result<(), BackendError> {
        let response = self
            .client
            .post(format!("{}/api/pull", self.base_url))
            .json(&serde_json::json!({ "name": name, "stream": false }))
            .send()
            .await
            .map_err(classify_transport)?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            })
        }
    }
}

#[async_trait]
impl GenerationBackend for OllamaClient {
    async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!("Backend not reachable: {}", e);
                false
            }
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelDescriptor>, BackendError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(LIST_TIMEOUT)
            .send()
            .await
            .map_err(classify_transport)?;

        if !response.status().is_success() {
            return Err(BackendError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        Ok(tags.models)
    }

    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, BackendError> {
        debug!(
            "Generating with model {} ({} byte prompt)",
            model,
            prompt.len()
        );

        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
            options: SamplingOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(options.timeout)
                } else {
                    classify_transport(e)
                }
            })?;

        if !response.status().is_success() {
            return Err(BackendError::Api {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let text = strip_reasoning(&body.response);
        if text.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(text)
    }
}

fn classify_transport(error: reqwest::Error) -> BackendError {
    if error.is_connect() {
        BackendError::Unavailable(error.to_string())
    } else {
        BackendError::Transport(error.to_string())
    }
}

/// Drop `<think>` reasoning blocks some models emit before their answer
fn strip_reasoning(text: &str) -> String {
    if !text.contains("<think>") {
        return text.trim().to_string();
    }
    match text.split_once("</think>") {
        Some((_, answer)) => answer.trim().to_string(),
        None => text.replace("<think>", "").trim().to_string(),
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Serialize)]
struct SamplingOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelDescriptor>,
}
