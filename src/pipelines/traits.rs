use crate::device::Device;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// What the backend is asked to do with the input text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Task {
    TextGeneration,
    Text2TextGeneration,
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextGeneration => write!(f, "text-generation"),
            Self::Text2TextGeneration => write!(f, "text2text-generation"),
        }
    }
}

/// Generation options fixed at the call site.
///
/// `None` means the caller did not ask for the option; backends leave it
/// out of the request so their own defaults apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Candidate completions to request. Only the first is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_return_sequences: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    /// Truncate over-long inputs instead of failing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub truncation: Option<bool>,
}

impl GenerationOptions {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fill every option `other` sets, keeping the rest of `self`.
    pub fn merged_with(&self, other: &GenerationOptions) -> GenerationOptions {
        GenerationOptions {
            num_return_sequences: other.num_return_sequences.or(self.num_return_sequences),
            temperature: other.temperature.or(self.temperature),
            top_k: other.top_k.or(self.top_k),
            max_length: other.max_length.or(self.max_length),
            truncation: other.truncation.or(self.truncation),
        }
    }
}

/// One element of the list a backend returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSequence {
    pub generated_text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The backend could not be created or the model could not be loaded.
    #[error("failed to load {model} on {backend}: {message}")]
    Startup {
        backend: String,
        model: String,
        message: String,
    },
    /// The backend rejected a turn or failed while serving it.
    #[error("generation failed on {backend}: {message}")]
    Generation { backend: String, message: String },
    #[error(
        "unknown backend: {0}. Use \"huggingface\", \"ollama\" or \"custom:https://your-endpoint\""
    )]
    UnknownBackend(String),
}

impl PipelineError {
    pub fn is_startup(&self) -> bool {
        matches!(self, Self::Startup { .. } | Self::UnknownBackend(_))
    }
}

/// A text-generation capability bound to one model and one device.
#[async_trait]
pub trait Pipeline: Send + Sync {
    /// Backend name used in logs and error messages.
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    fn task(&self) -> Task;

    fn device(&self) -> Device;

    async fn generate(
        &self,
        text: &str,
        options: &GenerationOptions,
    ) -> Result<Vec<GeneratedSequence>, PipelineError>;

    /// Make sure the model is reachable before the first turn.
    /// Default implementation is a no-op.
    async fn warmup(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}
