use crate::device::Device;
use crate::pipelines::traits::{
    GeneratedSequence, GenerationOptions, Pipeline, PipelineError, Task,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

pub struct OllamaPipeline {
    base_url: String,
    model: String,
    task: Task,
    device: Device,
    client: Client,
}

// ─── Request Structures ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    /// Plain continuation without the model's prompt template.
    raw: bool,
    options: Options,
}

#[derive(Debug, Default, Serialize)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    /// `0` keeps every layer off the GPU.
    #[serde(skip_serializing_if = "Option::is_none")]
    num_gpu: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

// ─── Response Structures ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ApiGenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

// ─── Implementation ───────────────────────────────────────────────────────────

impl OllamaPipeline {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        task: Task,
        device: Device,
        timeout_secs: u64,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.to_string(),
            task,
            device,
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn options(&self, options: &GenerationOptions) -> Options {
        if options.truncation == Some(false) {
            tracing::debug!("Ollama truncates to its context window; truncation=false ignored");
        }
        Options {
            temperature: options.temperature,
            top_k: options.top_k,
            num_predict: options.max_length,
            num_gpu: (!self.device.is_accelerator()).then_some(0),
        }
    }

    fn generation_error(message: impl Into<String>) -> PipelineError {
        PipelineError::Generation {
            backend: "Ollama".into(),
            message: message.into(),
        }
    }

    fn error_message(body: &[u8]) -> String {
        match serde_json::from_slice::<ApiError>(body) {
            Ok(api) => super::sanitize_api_error(&api.error),
            Err(_) => super::sanitize_api_error(&String::from_utf8_lossy(body)),
        }
    }

    /// Send one non-streaming generate request and return the completion.
    async fn send_request(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, PipelineError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            raw: self.task == Task::TextGeneration,
            options: self.options(options),
        };

        let url = format!("{}/api/generate", self.base_url);

        tracing::debug!(
            url = %url,
            model = %self.model,
            device = %self.device,
            temperature = ?request.options.temperature,
            top_k = ?request.options.top_k,
            "Ollama request"
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Self::generation_error(format!("request to {url} failed: {e}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Self::generation_error(format!("reading response failed: {e}")))?;

        tracing::debug!(status = %status, bytes = body.len(), "Ollama response");

        if !status.is_success() {
            let message = Self::error_message(&body);
            tracing::error!(status = %status, body_excerpt = %message, "Ollama error response");
            return Err(Self::generation_error(format!(
                "API error ({status}): {message}"
            )));
        }

        let parsed: ApiGenerateResponse = serde_json::from_slice(&body).map_err(|e| {
            tracing::error!(
                body_excerpt = %super::sanitize_api_error(&String::from_utf8_lossy(&body)),
                "Ollama response deserialization failed: {e}"
            );
            Self::generation_error(format!("failed to parse Ollama response: {e}"))
        })?;

        Ok(parsed.response)
    }
}

#[async_trait]
impl Pipeline for OllamaPipeline {
    fn name(&self) -> &str {
        "Ollama"
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
        let count = options.num_return_sequences.unwrap_or(1).max(1);
        let mut sequences = Vec::with_capacity(count as usize);

        for _ in 0..count {
            let completion = self.send_request(text, options).await?;
            // Text-generation pipelines return the prompt followed by its continuation.
            let generated_text = match self.task {
                Task::TextGeneration => format!("{text}{completion}"),
                Task::Text2TextGeneration => completion,
            };
            sequences.push(GeneratedSequence { generated_text });
        }

        Ok(sequences)
    }

    async fn warmup(&self) -> Result<(), PipelineError> {
        let url = format!("{}/api/show", self.base_url);
        let startup_error = |message: String| PipelineError::Startup {
            backend: "Ollama".into(),
            model: self.model.clone(),
            message,
        };

        let response = self
            .client
            .post(&url)
            .json(&ShowRequest { model: &self.model })
            .send()
            .await
            .map_err(|e| startup_error(format!("{e}. Is Ollama running? (ollama serve)")))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(startup_error(format!(
                "model not found. Pull it first: ollama pull {}",
                self.model
            ))),
            status => {
                let body = response.bytes().await.unwrap_or_default();
                Err(startup_error(format!(
                    "API error ({status}): {}",
                    Self::error_message(&body)
                )))
            }
        }
    }
}
