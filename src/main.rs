#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::module_name_repetitions,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result};
use chatloop::chat::{self, LoopExit};
use chatloop::config::Config;
use chatloop::device::{DevicePolicy, SystemProbe};
use chatloop::presets::Preset;
use chatloop::session::Session;
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

/// Chat with a text-generation model from the terminal.
#[derive(Parser, Debug)]
#[command(name = "chatloop")]
#[command(version)]
#[command(about = "Chat with a text-generation model from the terminal.", long_about = None)]
struct Cli {
    /// Built-in chat setup (model, options, labels)
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Model id, overriding the preset's
    #[arg(long)]
    model: Option<String>,

    /// Generation backend (huggingface, ollama, custom:<url>)
    #[arg(short, long)]
    backend: Option<String>,

    /// Backend endpoint, overriding its default
    #[arg(long)]
    base_url: Option<String>,

    /// Device selection policy
    #[arg(long, value_enum)]
    device: Option<DevicePolicy>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(short, long, value_parser = parse_temperature)]
    temperature: Option<f64>,

    /// Sample only from the k most likely next tokens
    #[arg(long)]
    top_k: Option<u32>,

    /// Cap on generated sequence length
    #[arg(long)]
    max_length: Option<u32>,

    /// Keep an in-memory chat history for the session
    #[arg(long)]
    history: bool,

    /// Single message mode (don't enter interactive mode)
    #[arg(short, long)]
    message: Option<String>,
}

fn parse_temperature(raw: &str) -> Result<f64, String> {
    let value: f64 = raw.parse().map_err(|e| format!("{e}"))?;
    if (0.0..=2.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("temperature must be within 0.0 - 2.0, got {value}"))
    }
}

impl Cli {
    /// CLI flags win over env and file settings.
    fn apply_to(&self, config: &mut Config) {
        if let Some(preset) = self.preset {
            config.chat.preset = preset;
        }
        if let Some(model) = &self.model {
            config.chat.model = Some(model.clone());
        }
        if let Some(backend) = &self.backend {
            config.backend.name = backend.clone();
        }
        if let Some(url) = &self.base_url {
            config.backend.base_url = Some(url.clone());
        }
        if let Some(device) = self.device {
            config.chat.device = device;
        }
        if self.history {
            config.chat.history = Some(true);
        }
        if self.temperature.is_some() {
            config.generation.temperature = self.temperature;
        }
        if self.top_k.is_some() {
            config.generation.top_k = self.top_k;
        }
        if self.max_length.is_some() {
            config.generation.max_length = self.max_length;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the conversation.
    // Respects RUST_LOG, defaults to WARN.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let mut config = Config::load_or_init()?;
    config.apply_env_overrides();
    cli.apply_to(&mut config);

    let profile = config.chat_profile();
    tracing::info!(
        preset = %config.chat.preset,
        backend = %config.backend.name,
        model = %profile.model,
        "starting chat session"
    );

    let mut stdout = std::io::stdout();
    let mut session = Session::initialize(
        profile,
        config.chat.device,
        &SystemProbe::new(),
        &config.backend.name,
        &config.backend,
        &mut stdout,
    )
    .await?;

    if let Some(message) = cli.message.as_deref() {
        chat::run_single(&mut session, message, &mut stdout).await?;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let exit = chat::run(&mut session, stdin, &mut stdout, &cancel).await?;
    if exit == LoopExit::Cancelled {
        // The blocking stdin read would otherwise hold the runtime open.
        println!();
        std::process::exit(130);
    }

    Ok(())
}
