pub mod huggingface;
pub mod ollama;
pub mod traits;

pub use traits::{GeneratedSequence, GenerationOptions, Pipeline, PipelineError, Task};

use crate::config::BackendConfig;
use crate::device::Device;
use regex::Regex;
use std::sync::OnceLock;

const MAX_API_ERROR_CHARS: usize = 200;

/// Factory: create the pipeline for `backend`, bound to `model` on `device`.
pub fn create_pipeline(
    backend: &str,
    model: &str,
    task: Task,
    device: Device,
    config: &BackendConfig,
) -> Result<Box<dyn Pipeline>, PipelineError> {
    let base_url = config.base_url.as_deref().filter(|u| !u.trim().is_empty());
    let api_key = config.api_key.as_deref().filter(|k| !k.trim().is_empty());

    match backend {
        "huggingface" | "hf" | "tgi" => Ok(Box::new(huggingface::HuggingFacePipeline::new(
            "Hugging Face",
            base_url.unwrap_or(huggingface::DEFAULT_BASE_URL),
            model,
            task,
            device,
            api_key,
            config.timeout_secs,
        ))),
        "ollama" => Ok(Box::new(ollama::OllamaPipeline::new(
            base_url,
            model,
            task,
            device,
            config.timeout_secs,
        ))),

        // Format: "custom:https://your-endpoint" speaking the Hugging Face wire format
        name if name.starts_with("custom:") => {
            let url = name.strip_prefix("custom:").unwrap_or("").trim();
            if url.is_empty() {
                return Err(PipelineError::Startup {
                    backend: "custom".into(),
                    model: model.into(),
                    message: "custom backend requires a URL. Format: custom:https://your-endpoint"
                        .into(),
                });
            }
            Ok(Box::new(huggingface::HuggingFacePipeline::new(
                "Custom",
                url,
                model,
                task,
                device,
                api_key,
                config.timeout_secs,
            )))
        }

        _ => Err(PipelineError::UnknownBackend(backend.to_string())),
    }
}

fn secret_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"(?i)(bearer\s+[A-Za-z0-9._\-]+|hf_[A-Za-z0-9]{8,}|sk-[A-Za-z0-9_\-]{8,})")
                .ok()
        })
        .as_ref()
}

/// Redact credentials from a backend error body and cap its length.
pub(crate) fn sanitize_api_error(raw: &str) -> String {
    let raw = raw.trim();
    let redacted = match secret_pattern() {
        Some(re) => re.replace_all(raw, "[REDACTED]").into_owned(),
        None => raw.to_string(),
    };
    match redacted.char_indices().nth(MAX_API_ERROR_CHARS) {
        Some((idx, _)) => format!("{}...", redacted[..idx].trim_end()),
        None => redacted,
    }
}
