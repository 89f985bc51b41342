use crate::device::DevicePolicy;
use crate::pipelines::GenerationOptions;
use crate::presets::{ChatProfile, Preset};
use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const CONFIG_DIR: &str = ".chatloop";
const CONFIG_FILE: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub chat: ChatConfig,

    /// Per-option overrides applied on top of the preset.
    #[serde(default)]
    pub generation: GenerationOptions,
}

// ── Backend ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// "huggingface", "ollama" or "custom:<url>"
    #[serde(default = "default_backend_name")]
    pub name: String,
    /// Override the backend's default endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout; model loads on a cold endpoint can be slow
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_backend_name() -> String {
    "huggingface".into()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: default_backend_name(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

// ── Chat ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub preset: Preset,
    /// Model id override; the preset's model when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub device: DevicePolicy,
    /// Force the in-memory transcript on or off
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<bool>,
}

// ── Config impl ──────────────────────────────────────────────────

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let home = UserDirs::new()
            .map(|u| u.home_dir().to_path_buf())
            .context("Could not find home directory")?;
        Self::load_or_init_in(&home.join(CONFIG_DIR))
    }

    /// Load `config.toml` from `dir`, writing the defaults first if it is missing.
    pub fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            Ok(config)
        } else {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let config = Config {
                config_path,
                ..Config::default()
            };
            config.save()?;
            tracing::info!(path = %config.config_path.display(), "wrote default config");
            Ok(config)
        }
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    pub(crate) fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        // Backend: CHATLOOP_BACKEND
        if let Some(name) = non_empty("CHATLOOP_BACKEND") {
            self.backend.name = name;
        }

        if let Some(url) = non_empty("CHATLOOP_BASE_URL") {
            self.backend.base_url = Some(url);
        }

        // API key: CHATLOOP_API_KEY wins over the generic HF_TOKEN
        if let Some(key) = non_empty("CHATLOOP_API_KEY").or_else(|| non_empty("HF_TOKEN")) {
            self.backend.api_key = Some(key);
        }

        if let Some(model) = non_empty("CHATLOOP_MODEL") {
            self.chat.model = Some(model);
        }

        if let Some(preset) = non_empty("CHATLOOP_PRESET") {
            match preset.parse() {
                Ok(preset) => self.chat.preset = preset,
                Err(e) => tracing::warn!("ignoring CHATLOOP_PRESET: {e}"),
            }
        }

        if let Some(device) = non_empty("CHATLOOP_DEVICE") {
            match device.parse() {
                Ok(policy) => self.chat.device = policy,
                Err(e) => tracing::warn!("ignoring CHATLOOP_DEVICE: {e}"),
            }
        }

        // Temperature: CHATLOOP_TEMPERATURE
        if let Some(temp) = non_empty("CHATLOOP_TEMPERATURE").and_then(|t| t.parse::<f64>().ok())
        {
            if (0.0..=2.0).contains(&temp) {
                self.generation.temperature = Some(temp);
            }
        }
    }

    /// The preset's profile with this config's overrides applied.
    pub fn chat_profile(&self) -> ChatProfile {
        let mut profile = self.chat.preset.profile();
        if let Some(model) = self.chat.model.as_deref().filter(|m| !m.trim().is_empty()) {
            profile.model = model.to_string();
        }
        if let Some(history) = self.chat.history {
            profile.history = history;
        }
        profile.options = profile.options.merged_with(&self.generation);
        profile
    }

    pub fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;
        fs::create_dir_all(parent_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path) {
            let _ = fs::remove_file(&temp_path);
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        Ok(())
    }
}
