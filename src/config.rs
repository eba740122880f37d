//! Configuration module for forumrag.
//!
//! Handles loading, validating, and providing default configuration values,
//! and resolves the chat-completion API key once at startup into
//! [`Settings`], which is then passed by reference to every component.
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Error;
use crate::search::SearchStrategy;

/// Environment variable (and `.env` key) holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Config file used when none is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "forumrag.json";

// ── Default value functions ──────────────────────────────────────────

fn default_db_path() -> String {
    "./iracing_forum.db".to_string()
}

fn default_search_top_k() -> usize {
    5
}

fn default_env_file() -> String {
    ".env".to_string()
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_model_dir() -> String {
    "models/all-MiniLM-L6-v2".to_string()
}

fn default_chat_model() -> String {
    "gpt-5".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_max_post_chars() -> usize {
    500
}

fn default_max_context_chars() -> usize {
    8000
}

// ── Config structs ───────────────────────────────────────────────────

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Posts returned by `search` and used as context by `ask`.
    #[serde(default = "default_search_top_k")]
    pub search_top_k: usize,

    /// Local key-value file consulted for the API key.
    #[serde(default = "default_env_file")]
    pub env_file: String,

    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub prompt: PromptConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    /// Local sentence-transformer through ONNX Runtime.
    #[default]
    Onnx,
    /// Feature hashing; no model files, lexical similarity only.
    Hashing,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: EmbedderBackend,

    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    #[serde(default = "default_model_dir")]
    pub dir: String,

    #[serde(default = "default_true")]
    pub auto_download: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub strategy: SearchStrategy,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Extra attempts on transient failures; 0 disables retrying.
    #[serde(default)]
    pub max_retries: u32,

    /// First retry delay, doubled on each further attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PromptConfig {
    #[serde(default = "default_max_post_chars")]
    pub max_post_chars: usize,

    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,
}

// ── Default impls ────────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            search_top_k: default_search_top_k(),
            env_file: default_env_file(),
            model: ModelConfig::default(),
            search: SearchConfig::default(),
            generation: GenerationConfig::default(),
            prompt: PromptConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: EmbedderBackend::default(),
            name: default_model_name(),
            dimensions: default_dimensions(),
            dir: default_model_dir(),
            auto_download: default_true(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_chat_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: 0,
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_post_chars: default_max_post_chars(),
            max_context_chars: default_max_context_chars(),
        }
    }
}

// ── Config implementation ────────────────────────────────────────────

impl Config {
    /// Load configuration from a JSON file.
    ///
    /// If `config_path` is empty, defaults to [`DEFAULT_CONFIG_PATH`].
    /// If the file does not exist, returns a default config and generates a
    /// template for the default path.
    pub fn load(config_path: &str) -> Result<Self> {
        let path = if config_path.is_empty() {
            DEFAULT_CONFIG_PATH
        } else {
            config_path
        };

        if !Path::new(path).exists() {
            info!("{path} not found, using defaults");
            let cfg = Self::default();

            if path == DEFAULT_CONFIG_PATH {
                match cfg.save(path) {
                    Ok(()) => info!("Generated config template: {path}"),
                    Err(e) => warn!("Failed to generate config template: {e}"),
                }
            }

            return Ok(cfg);
        }

        let data = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;

        let cfg: Config = match serde_json::from_str(&data) {
            Ok(c) => c,
            Err(e) => {
                warn!("Invalid JSON in {path}: {e}");
                warn!("Using default configuration");
                return Ok(Self::default());
            }
        };

        info!("Loaded configuration from {path}");
        Ok(cfg)
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &str) -> Result<()> {
        let data = serde_json::to_string_pretty(self).context("failed to marshal config")?;
        std::fs::write(path, data).with_context(|| format!("failed to write config: {path}"))?;
        Ok(())
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.db_path.is_empty(), "db_path must be set");
        anyhow::ensure!(self.search_top_k > 0, "search_top_k must be positive");
        anyhow::ensure!(
            self.model.dimensions > 0,
            "model.dimensions must be positive"
        );
        anyhow::ensure!(
            !self.generation.base_url.is_empty(),
            "generation.base_url must be set"
        );
        anyhow::ensure!(
            self.generation.timeout_secs > 0,
            "generation.timeout_secs must be positive"
        );
        anyhow::ensure!(
            self.prompt.max_post_chars > 0,
            "prompt.max_post_chars must be positive"
        );
        Ok(())
    }
}

// ── Credentials ──────────────────────────────────────────────────────

/// Where the API key was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    Argument,
    Environment,
    EnvFile(PathBuf),
}

/// A resolved API key. `Debug` never prints the secret.
#[derive(Clone)]
pub struct ApiKey {
    value: String,
    source: KeySource,
}

impl ApiKey {
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn source(&self) -> &KeySource {
        &self.source
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Resolve the API key: explicit argument, then the environment value,
/// then `OPENAI_API_KEY` in `env_file`. Blank values are ignored.
///
/// The env file is parsed without touching the process environment.
pub fn resolve_api_key(
    explicit: Option<&str>,
    env_value: Option<String>,
    env_file: &Path,
) -> Result<ApiKey, Error> {
    let usable = |v: &str| !v.trim().is_empty();

    if let Some(key) = explicit.filter(|k| usable(k)) {
        return Ok(ApiKey {
            value: key.trim().to_string(),
            source: KeySource::Argument,
        });
    }

    if let Some(key) = env_value.filter(|k| usable(k)) {
        return Ok(ApiKey {
            value: key.trim().to_string(),
            source: KeySource::Environment,
        });
    }

    if env_file.exists() {
        let entries = dotenvy::from_path_iter(env_file).map_err(|e| {
            Error::Configuration(format!("failed to read {}: {e}", env_file.display()))
        })?;
        for entry in entries {
            match entry {
                Ok((name, value)) if name == API_KEY_ENV && usable(&value) => {
                    return Ok(ApiKey {
                        value: value.trim().to_string(),
                        source: KeySource::EnvFile(env_file.to_path_buf()),
                    });
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping malformed line in {}: {e}", env_file.display()),
            }
        }
    }

    Err(Error::Configuration(format!(
        "OpenAI API key not provided. Pass --api-key, set {API_KEY_ENV} in the environment, or add it to {}",
        env_file.display()
    )))
}

/// Everything a component needs, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub api_key: ApiKey,
}

impl Settings {
    /// Validate `config` and resolve the API key from `explicit_key`, the
    /// process environment and `config.env_file`, in that order.
    pub fn resolve(config: Config, explicit_key: Option<&str>) -> Result<Self, Error> {
        config
            .validate()
            .map_err(|e| Error::Configuration(e.to_string()))?;

        let api_key = resolve_api_key(
            explicit_key,
            std::env::var(API_KEY_ENV).ok(),
            Path::new(&config.env_file),
        )?;
        info!(source = ?api_key.source(), "API key resolved");

        Ok(Self { config, api_key })
    }
}

// ── Tests ────────────────────────────────────────────────────────────
