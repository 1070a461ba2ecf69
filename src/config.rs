//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` (optional; every field has a default) and then
//! applies overrides from the environment (`DATA_PATH`,
//! `OLLAMA_BASE_URL`, `OLLAMA_MODEL`, `OLLAMA_TEMPERATURE`,
//! `SERVER_PORT`). Secrets are referenced by env-var name and resolved
//! at runtime, never stored in the file.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::agent::DEFAULT_MAX_TOOL_ROUNDS;
use crate::llm::ollama::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TEMPERATURE};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Root directory holding one folder per dataset.
    pub path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Env var holding an optional bearer key for hosted endpoints.
    pub api_key_env: Option<String>,
    pub max_tool_rounds: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            api_key_env: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    /// A missing file means all defaults.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply overrides from `lookup` (the process environment in `load`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(path) = lookup("DATA_PATH") {
            self.data.path = PathBuf::from(path);
        }
        if let Some(url) = lookup("OLLAMA_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(raw) = lookup("OLLAMA_TEMPERATURE") {
            self.llm.temperature = raw
                .trim()
                .parse()
                .with_context(|| format!("OLLAMA_TEMPERATURE is not a number: {raw}"))?;
        }
        if let Some(raw) = lookup("SERVER_PORT") {
            self.server.port = raw
                .trim()
                .parse()
                .with_context(|| format!("SERVER_PORT is not a valid port: {raw}"))?;
        }
        Ok(())
    }

    /// Fail fast on settings nothing downstream can recover from.
    pub fn validate(&self) -> Result<()> {
        if !self.data.path.is_dir() {
            anyhow::bail!(
                "Data directory does not exist: {}. Set DATA_PATH or [data].path in config.toml",
                self.data.path.display()
            );
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be between 0 and 2, got {}", self.llm.temperature);
        }
        if self.llm.max_tool_rounds == 0 {
            anyhow::bail!("llm.max_tool_rounds must be at least 1");
        }
        Ok(())
    }

    /// Settings safe to log: secrets are reported as set or not set.
    pub fn summary(&self) -> BTreeMap<&'static str, String> {
        let api_key = match &self.llm.api_key_env {
            Some(env) if std::env::var(env).is_ok() => "***".to_string(),
            _ => "(not set)".to_string(),
        };
        BTreeMap::from([
            ("data_path", self.data.path.display().to_string()),
            ("llm_base_url", self.llm.base_url.clone()),
            ("llm_model", self.llm.model.clone()),
            ("llm_temperature", self.llm.temperature.to_string()),
            ("llm_max_tool_rounds", self.llm.max_tool_rounds.to_string()),
            ("llm_api_key", api_key),
            ("server_addr", format!("{}:{}", self.server.host, self.server.port)),
        ])
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name).with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
