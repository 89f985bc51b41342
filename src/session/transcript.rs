//! In-memory record of the conversation.
//!
//! Entries are appended in user/assistant pairs and never fed back into
//! generation or written to disk.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one completed turn. Pairs keep the roles alternating.
    pub fn record_turn(&mut self, user: &str, assistant: &str) {
        self.entries.push(TranscriptEntry {
            role: Role::User,
            content: user.to_string(),
        });
        self.entries.push(TranscriptEntry {
            role: Role::Assistant,
            content: assistant.to_string(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn turns(&self) -> usize {
        self.entries.len() / 2
    }
}
