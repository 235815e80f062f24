//! Persisted per-run records and experiment file layout.
//!
//! Everything under `<experiment_dir>/` is a product artifact, written
//! regardless of `RUST_LOG`: one book text per iteration under `books/`, one
//! JSON record per play-through under `logs/` (or `evaluates/` in evaluation
//! mode).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::{Message, Outcome, StepRecord};
use crate::core::usage::UsageCounters;
use crate::io::config::{EvalPair, ExperimentConfig};

/// Well-known paths inside an experiment directory.
#[derive(Debug, Clone)]
pub struct ExperimentPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub books_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub evaluates_dir: PathBuf,
    pub pairs_path: PathBuf,
}

impl ExperimentPaths {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            config_path: root.join("config.toml"),
            books_dir: root.join("books"),
            logs_dir: root.join("logs"),
            evaluates_dir: root.join("evaluates"),
            pairs_path: root.join("evaluation_pairs.json"),
        }
    }

    pub fn book_path(&self, index: u32) -> PathBuf {
        self.books_dir.join(format!("{index}.txt"))
    }

    pub fn log_path(&self, iteration: u32) -> PathBuf {
        self.logs_dir.join(format!("{iteration}.json"))
    }

    pub fn eval_log_path(&self, book_index: u32, pair_index: u32) -> PathBuf {
        self.evaluates_dir
            .join(format!("book_{book_index:02}_pair_{pair_index:02}.json"))
    }
}

/// Game section of a run record: the path taken and its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSection {
    pub start: String,
    pub goal: String,
    pub score: u32,
    pub history: Vec<StepRecord>,
}

/// One persisted play-through: config snapshot, full transcript, game
/// section, and token cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub config: ExperimentConfig,
    pub messages: Vec<Message>,
    pub game: GameSection,
    pub cost: UsageCounters,
}

impl RunRecord {
    pub fn new(config: &ExperimentConfig, outcome: &Outcome) -> Self {
        Self {
            config: config.clone(),
            messages: outcome.messages.clone(),
            game: GameSection {
                start: outcome.start.clone(),
                goal: outcome.goal.clone(),
                score: outcome.score,
                history: outcome.steps.clone(),
            },
            cost: outcome.usage.clone(),
        }
    }
}

/// Evaluation-mode record: a run tagged with the book version it tested and
/// the fixed input pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    #[serde(flatten)]
    pub run: RunRecord,
    pub book_index: u32,
    pub pair: EvalPair,
}

/// Serialize `value` to pretty-printed JSON with trailing newline.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
    payload.push('\n');
    write_text(path, &payload)
}

pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
