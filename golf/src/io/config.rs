//! Experiment configuration stored at `<experiment_dir>/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::GameConfig;

/// Text-generation backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Openrouter,
    Gemini,
}

/// Backend selection and request options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: Provider,
    pub model: String,
    /// Override for the API base URL (OpenRouter-compatible proxies).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra request options forwarded verbatim to the backend
    /// (e.g. `temperature`, `max_output_tokens`).
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,
}

fn default_timeout_secs() -> u64 {
    120
}

/// Outer self-revision loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Number of play-and-revise iterations per `run`.
    pub iterations: u32,
    /// Accepted and echoed in run records; the engine's only seeded generator
    /// is the fixed-constant link down-sampler.
    pub seed: Option<u64>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            iterations: 1,
            seed: None,
        }
    }
}

/// A fixed start/goal pair used in evaluation mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalPair {
    pub start: String,
    pub goal: String,
}

/// Full experiment configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing `game`/`loop` fields default to sensible values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub game: GameConfig,
    #[serde(rename = "loop", default)]
    pub run_loop: LoopConfig,
    #[serde(default)]
    pub evaluation_pairs: Option<Vec<EvalPair>>,
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.llm.model.trim().is_empty() {
            return Err(anyhow!("llm.model must not be empty"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(anyhow!("llm.timeout_secs must be > 0"));
        }
        if self.game.max_steps == 0 {
            return Err(anyhow!("game.max_steps must be > 0"));
        }
        if self.game.retry_limit == 0 {
            return Err(anyhow!("game.retry_limit must be > 0"));
        }
        if self.run_loop.iterations == 0 {
            return Err(anyhow!("loop.iterations must be > 0"));
        }
        Ok(())
    }
}

/// Load and validate config from a TOML file. The `[llm]` section is required.
pub fn load_config(path: &Path) -> Result<ExperimentConfig> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ExperimentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
