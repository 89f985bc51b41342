use crate::device::Device;
use crate::pipelines::traits::{
    GeneratedSequence, GenerationOptions, Pipeline, PipelineError, Task,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Hugging Face inference endpoint (hosted API or any server speaking its
/// `inputs`/`parameters` wire format).
pub struct HuggingFacePipeline {
    name: String,
    base_url: String,
    model: String,
    task: Task,
    device: Device,
    api_key: Option<String>,
    client: Client,
}

// ─── Request Structures ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    #[serde(skip_serializing_if = "GenerationOptions::is_empty")]
    parameters: &'a GenerationOptions,
    options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

// ─── Response Structures ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GenerateResponse {
    Batch(Vec<GeneratedSequence>),
    Single(GeneratedSequence),
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

// ─── Implementation ───────────────────────────────────────────────────────────

impl HuggingFacePipeline {
    pub fn new(
        name: &str,
        base_url: &str,
        model: &str,
        task: Task,
        device: Device,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            task,
            device,
            api_key: api_key.map(ToString::to_string),
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn model_url(&self) -> String {
        format!("{}/models/{}", self.base_url, self.model)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key.as_deref() {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    fn generation_error(&self, message: impl Into<String>) -> PipelineError {
        PipelineError::Generation {
            backend: self.name.clone(),
            message: message.into(),
        }
    }

    fn error_message(body: &[u8]) -> String {
        match serde_json::from_slice::<ApiError>(body) {
            Ok(api) => super::sanitize_api_error(&api.error),
            Err(_) => super::sanitize_api_error(&String::from_utf8_lossy(body)),
        }
    }
}

#[async_trait]
impl Pipeline for HuggingFacePipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn task(&self) -> Task {
        self.task
    }

    fn device(&self) -> Device {
        self.device
    }

    async fn generate(
        &self,
        text: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedSequence>, PipelineError> {
        let request = GenerateRequest {
            inputs: text,
            parameters: options,
            options: RequestOptions {
                wait_for_model: true,
            },
        };
        let url = self.model_url();

        tracing::debug!(
            backend = %self.name,
            url = %url,
            task = %self.task,
            device = %self.device,
            input_chars = text.chars().count(),
            "pipeline request"
        );

        let response = self
            .authorized(self.client.post(&url).json(&request))
            .send()
            .await
            .map_err(|e| self.generation_error(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| self.generation_error(format!("reading response failed: {e}")))?;

        tracing::debug!(status = %status, bytes = body.len(), "pipeline response");

        if !status.is_success() {
            let message = Self::error_message(&body);
            tracing::error!(backend = %self.name, status = %status, body_excerpt = %message, "pipeline error response");
            return Err(self.generation_error(format!("API error ({status}): {message}")));
        }

        let parsed: GenerateResponse = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(
                backend = %self.name,
                body_excerpt = %super::sanitize_api_error(&String::from_utf8_lossy(&body)),
                "pipeline response deserialization failed: {e}"
            );
            self.generation_error(format!("failed to parse response: {e}"))
        })?;

        Ok(match parsed {
            GenerateResponse::Batch(sequences) => sequences,
            GenerateResponse::Single(sequence) => vec![sequence],
        })
    }

    async fn warmup(&self) -> Result<(), PipelineError> {
        let url = self.model_url();
        let startup_error = |message: String| PipelineError::Startup {
            backend: self.name.clone(),
            model: self.model.clone(),
            message,
        };

        let response = self
            .authorized(self.client.get(&url))
            .send()
            .await
            .map_err(|e| startup_error(format!("{url} unreachable: {e}")))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.bytes().await.unwrap_or_default();
        Err(startup_error(format!(
            "API error ({status}): {}",
            Self::error_message(&body)
        )))
    }
}
