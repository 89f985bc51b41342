//! HTTP backend tests against a local mock server.

use chatloop::chat;
use chatloop::config::BackendConfig;
use chatloop::device::{AcceleratorProbe, Device, DevicePolicy};
use chatloop::pipelines::{create_pipeline, GenerationOptions, PipelineError, Task};
use chatloop::presets::Preset;
use chatloop::session::{Session, SessionError};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct NoAccelerator;

impl AcceleratorProbe for NoAccelerator {
    fn accelerator_available(&self) -> bool {
        false
    }
}

fn backend_config(server: &MockServer, api_key: Option<&str>) -> BackendConfig {
    BackendConfig {
        name: "huggingface".into(),
        base_url: Some(server.uri()),
        api_key: api_key.map(ToString::to_string),
        timeout_secs: 5,
    }
}

fn sampled_options() -> GenerationOptions {
    GenerationOptions {
        num_return_sequences: Some(1),
        temperature: Some(0.7),
        top_k: Some(50),
        max_length: None,
        truncation: Some(true),
    }
}

// ── Hugging Face ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn huggingface_sends_inputs_and_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gpt2"))
        .and(header("authorization", "Bearer hf_test_token"))
        .and(body_partial_json(json!({
            "inputs": "Hello",
            "parameters": {
                "num_return_sequences": 1,
                "temperature": 0.7,
                "top_k": 50,
                "truncation": true
            },
            "options": {"wait_for_model": true}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"generated_text": "Hello there"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "huggingface",
        "gpt2",
        Task::TextGeneration,
        Device::Cpu,
        &backend_config(&server, Some("hf_test_token")),
    )
    .unwrap();

    let sequences = pipeline.generate("Hello", &sampled_options()).await.unwrap();
    assert_eq!(sequences.len(), 1);
    assert_eq!(sequences[0].generated_text, "Hello there");
}

#[tokio::test]
async fn huggingface_namespaced_model_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/EleutherAI/gpt-neo-1.3B"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"generated_text": "ok"})))
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "hf",
        "EleutherAI/gpt-neo-1.3B",
        Task::TextGeneration,
        Device::Cpu,
        &backend_config(&server, None),
    )
    .unwrap();

    let sequences = pipeline
        .generate("Hi", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(sequences[0].generated_text, "ok");
}

#[tokio::test]
async fn huggingface_rejection_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/t5-small"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": "Input validation error: inputs too long"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "huggingface",
        "t5-small",
        Task::Text2TextGeneration,
        Device::Cpu,
        &backend_config(&server, None),
    )
    .unwrap();

    let err = pipeline
        .generate("question", &GenerationOptions::default())
        .await
        .unwrap_err();
    match err {
        PipelineError::Generation { message, .. } => {
            assert!(message.contains("400"));
            assert!(message.contains("inputs too long"));
        }
        other => panic!("expected generation error, got {other}"),
    }
}

#[tokio::test]
async fn huggingface_malformed_body_is_generation_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gpt2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "huggingface",
        "gpt2",
        Task::TextGeneration,
        Device::Cpu,
        &backend_config(&server, None),
    )
    .unwrap();

    let err = pipeline
        .generate("Hello", &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Generation { .. }));
}

#[tokio::test]
async fn huggingface_missing_model_fails_warmup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/gpt9"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "Model gpt9 does not exist"})),
        )
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "huggingface",
        "gpt9",
        Task::TextGeneration,
        Device::Cpu,
        &backend_config(&server, None),
    )
    .unwrap();

    let err = pipeline.warmup().await.unwrap_err();
    assert!(err.is_startup());
    assert!(err.to_string().contains("does not exist"));
}

// ── Ollama ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ollama_maps_options_and_returns_full_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "llama3",
            "prompt": "Hello",
            "stream": false,
            "raw": true,
            "options": {"temperature": 0.7, "top_k": 50, "num_gpu": 0}
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": " there", "done": true})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = BackendConfig {
        name: "ollama".into(),
        ..backend_config(&server, None)
    };
    let pipeline =
        create_pipeline("ollama", "llama3", Task::TextGeneration, Device::Cpu, &config).unwrap();

    let sequences = pipeline.generate("Hello", &sampled_options()).await.unwrap();
    assert_eq!(sequences.len(), 1);
    assert_eq!(sequences[0].generated_text, "Hello there");
}

#[tokio::test]
async fn ollama_text2text_returns_answer_only() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({"raw": false})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "Paris", "done": true})),
        )
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "ollama",
        "flan-t5",
        Task::Text2TextGeneration,
        Device::Accelerator,
        &backend_config(&server, None),
    )
    .unwrap();

    let sequences = pipeline
        .generate("capital of France?", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(sequences[0].generated_text, "Paris");
}

#[tokio::test]
async fn ollama_serves_multiple_sequences_with_repeated_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "!", "done": true})),
        )
        .expect(3)
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "ollama",
        "llama3",
        Task::TextGeneration,
        Device::Cpu,
        &backend_config(&server, None),
    )
    .unwrap();

    let options = GenerationOptions {
        num_return_sequences: Some(3),
        ..GenerationOptions::default()
    };
    let sequences = pipeline.generate("Hi", &options).await.unwrap();
    assert_eq!(sequences.len(), 3);
}

#[tokio::test]
async fn ollama_missing_model_fails_warmup() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"error": "model 'llama9' not found"})),
        )
        .mount(&server)
        .await;

    let pipeline = create_pipeline(
        "ollama",
        "llama9",
        Task::TextGeneration,
        Device::Cpu,
        &backend_config(&server, None),
    )
    .unwrap();

    let err = pipeline.warmup().await.unwrap_err();
    assert!(err.is_startup());
    assert!(err.to_string().contains("ollama pull llama9"));
}

// ── Full session over HTTP ───────────────────────────────────────────────────

#[tokio::test]
async fn session_over_custom_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models/gpt2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"loaded": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/models/gpt2"))
        .and(body_partial_json(json!({"inputs": "Hello"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"generated_text": "Hi there"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let backend = format!("custom:{}", server.uri());
    let config = BackendConfig {
        base_url: None,
        ..backend_config(&server, None)
    };

    let mut out = Vec::new();
    let mut session = Session::initialize(
        Preset::Gpt2.profile(),
        DevicePolicy::Auto,
        &NoAccelerator,
        &backend,
        &config,
        &mut out,
    )
    .await
    .unwrap();

    chat::run(
        &mut session,
        "Hello\nexit\n".as_bytes(),
        &mut out,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(
        String::from_utf8(out).unwrap(),
        "Using device: cpu\n\
         Chat with the AI! Type 'exit' to quit.\n\
         You: AI: Hi there\n\n\
         You: Goodbye!\n"
    );
}

#[tokio::test]
async fn session_startup_fails_when_backend_unreachable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let config = BackendConfig {
        name: "ollama".into(),
        base_url: Some(uri),
        api_key: None,
        timeout_secs: 2,
    };

    let mut out = Vec::new();
    let result = Session::initialize(
        Preset::Normal.profile(),
        DevicePolicy::Cpu,
        &NoAccelerator,
        "ollama",
        &config,
        &mut out,
    )
    .await;

    assert!(matches!(result, Err(SessionError::Startup(_))));
    assert_eq!(String::from_utf8(out).unwrap(), "Using device: cpu\n");
}
