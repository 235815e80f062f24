//! Evaluation mode: replay saved books over a fixed pair dataset and
//! aggregate per-book success rates.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::types::SENTINEL_SCORE;
use crate::engine::Engine;
use crate::io::config::{EvalPair, ExperimentConfig, load_config};
use crate::io::llm::{ChatClient, build_chat_client};
use crate::io::run_log::{EvalRecord, ExperimentPaths, RunRecord, write_json};
use crate::io::wiki::{HttpWikiClient, WikiClient};

/// Book versions worth evaluating: the initial book and the final one of a
/// hundred-iteration run.
const EVAL_BOOK_INDICES: [u32; 2] = [0, 100];

/// Evaluate saved books against the live backends.
pub fn evaluate_books(experiment_dir: &Path) -> Result<()> {
    let paths = ExperimentPaths::new(experiment_dir);
    let config = load_config(&paths.config_path)?;
    let chat = build_chat_client(&config.llm)?;
    let wiki = HttpWikiClient::new()?;
    evaluate_books_with(experiment_dir, &config, chat.as_ref(), &wiki)
}

/// Evaluation loop with injected collaborators.
///
/// Plays every configured pair for every present book version with revision
/// disabled, writing one tagged record per run under `evaluates/`.
pub fn evaluate_books_with<C: ChatClient + ?Sized, W: WikiClient + ?Sized>(
    experiment_dir: &Path,
    config: &ExperimentConfig,
    chat: &C,
    wiki: &W,
) -> Result<()> {
    let paths = ExperimentPaths::new(experiment_dir);
    let engine = Engine::new(config.game.clone(), chat, wiki);
    let pairs = load_eval_pairs(config, experiment_dir)?;

    let targets: Vec<u32> = EVAL_BOOK_INDICES
        .into_iter()
        .filter(|index| paths.book_path(*index).exists())
        .collect();
    if targets.is_empty() {
        bail!("no evaluation targets found (books/<i>.txt missing)");
    }

    for book_index in targets {
        let book_path = paths.book_path(book_index);
        let guide = fs::read_to_string(&book_path)
            .with_context(|| format!("read {}", book_path.display()))?;
        for (offset, pair) in pairs.iter().enumerate() {
            let pair_index = offset as u32 + 1;
            let outcome = engine
                .play(&guide, Some(&pair.start), Some(&pair.goal), false)
                .with_context(|| format!("book {book_index}, pair {pair_index}"))?;
            let record = EvalRecord {
                run: RunRecord::new(config, &outcome),
                book_index,
                pair: pair.clone(),
            };
            write_json(&paths.eval_log_path(book_index, pair_index), &record)?;
            info!(book_index, pair_index, score = outcome.score, "pair evaluated");
        }
    }
    Ok(())
}

/// Per-book-version aggregate over evaluation records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookStats {
    pub book_index: u32,
    pub success_count: u32,
    pub total_runs: u32,
    pub success_rate: f64,
}

/// Aggregate `evaluates/*.json` into per-book success rates.
///
/// Success means the recorded score is not the failure sentinel. Unparsable
/// files are skipped with a warning rather than failing the summary.
pub fn summarize_evaluation_results(experiment_dir: &Path) -> Result<Vec<BookStats>> {
    let paths = ExperimentPaths::new(experiment_dir);
    if !paths.evaluates_dir.exists() {
        return Ok(Vec::new());
    }

    let mut stats: BTreeMap<u32, (u32, u32)> = BTreeMap::new();
    let entries = fs::read_dir(&paths.evaluates_dir)
        .with_context(|| format!("read {}", paths.evaluates_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let record: EvalRecord = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unparsable eval record");
                continue;
            }
        };
        let (success, total) = stats.entry(record.book_index).or_insert((0, 0));
        *total += 1;
        if record.run.game.score != SENTINEL_SCORE {
            *success += 1;
        }
    }

    Ok(stats
        .into_iter()
        .map(|(book_index, (success_count, total_runs))| BookStats {
            book_index,
            success_count,
            total_runs,
            success_rate: if total_runs == 0 {
                0.0
            } else {
                f64::from(success_count) / f64::from(total_runs)
            },
        })
        .collect())
}

/// Resolve the evaluation dataset: inline config pairs win, then
/// `evaluation_pairs.json` next to the config.
pub fn load_eval_pairs(config: &ExperimentConfig, experiment_dir: &Path) -> Result<Vec<EvalPair>> {
    if let Some(pairs) = &config.evaluation_pairs {
        if !pairs.is_empty() {
            return Ok(pairs.clone());
        }
    }
    let paths = ExperimentPaths::new(experiment_dir);
    if paths.pairs_path.exists() {
        let raw = fs::read_to_string(&paths.pairs_path)
            .with_context(|| format!("read {}", paths.pairs_path.display()))?;
        let pairs: Vec<EvalPair> =
            serde_json::from_str(&raw).with_context(|| format!("parse {}", paths.pairs_path.display()))?;
        return Ok(pairs);
    }
    Err(anyhow!(
        "evaluation pairs not provided: set evaluation_pairs in config.toml or add evaluation_pairs.json"
    ))
}

/// Draw `count` random start/goal pairs for a new evaluation dataset.
pub fn generate_pairs<W: WikiClient + ?Sized>(wiki: &W, count: usize) -> Result<Vec<EvalPair>> {
    let mut pairs = Vec::with_capacity(count);
    while pairs.len() < count {
        let titles = wiki.random_titles(2).context("sample random pages")?;
        let [start, goal] = titles.as_slice() else {
            continue;
        };
        if start == goal {
            continue;
        }
        pairs.push(EvalPair {
            start: start.clone(),
            goal: goal.clone(),
        });
    }
    Ok(pairs)
}
