//! Built-in chat presets.
//!
//! Each preset pins a model, the generation options passed on every turn and
//! the text the loop prints around the conversation.

use crate::pipelines::{GenerationOptions, Task};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    /// GPT-2 with light sampling.
    Gpt2,
    /// GPT-Neo 1.3B with light sampling.
    #[default]
    Normal,
    /// GPT-Neo 1.3B with a length cap and an in-memory chat history.
    Pipeline,
    /// T5-small question answering.
    T5,
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gpt2 => write!(f, "gpt2"),
            Self::Normal => write!(f, "normal"),
            Self::Pipeline => write!(f, "pipeline"),
            Self::T5 => write!(f, "t5"),
        }
    }
}

impl std::str::FromStr for Preset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s.trim(), true).map_err(|_| {
            anyhow::anyhow!("unknown preset: {s} (expected gpt2, normal, pipeline or t5)")
        })
    }
}

/// Everything a preset decides about a session.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatProfile {
    pub model: String,
    pub task: Task,
    pub options: GenerationOptions,
    /// Prefix of every reply line.
    pub speaker: &'static str,
    /// Leave a blank line after the device report.
    pub device_gap: bool,
    pub banner: &'static str,
    pub farewell: &'static str,
    /// Keep a user/assistant transcript for the session.
    pub history: bool,
    /// Strip surrounding whitespace from each input line.
    pub trim_input: bool,
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

impl Preset {
    pub fn profile(self) -> ChatProfile {
        match self {
            Self::Gpt2 => ChatProfile {
                model: "gpt2".into(),
                task: Task::TextGeneration,
                options: sampled_options(),
                speaker: "AI",
                device_gap: false,
                banner: "Chat with the AI! Type 'exit' to quit.",
                farewell: "Goodbye!",
                history: false,
                trim_input: false,
            },
            Self::Normal => ChatProfile {
                model: "EleutherAI/gpt-neo-1.3B".into(),
                task: Task::TextGeneration,
                options: sampled_options(),
                speaker: "AI",
                device_gap: false,
                banner: "Chat with the AI! Type 'exit' to quit.",
                farewell: "Goodbye!",
                history: false,
                trim_input: false,
            },
            Self::Pipeline => ChatProfile {
                model: "EleutherAI/gpt-neo-1.3B".into(),
                task: Task::TextGeneration,
                options: GenerationOptions {
                    num_return_sequences: Some(1),
                    max_length: Some(150),
                    ..GenerationOptions::default()
                },
                speaker: "Chatbot",
                device_gap: true,
                banner: "\nChatbot is ready! Type 'exit' to quit.\n",
                farewell: "Chatbot: Goodbye!",
                history: true,
                trim_input: true,
            },
            Self::T5 => ChatProfile {
                model: "t5-small".into(),
                task: Task::Text2TextGeneration,
                options: GenerationOptions::default(),
                speaker: "AI",
                device_gap: false,
                banner: "Ask a question! Type 'exit' to quit.",
                farewell: "Goodbye!",
                history: false,
                trim_input: false,
            },
        }
    }
}
