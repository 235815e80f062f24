//! The self-revision experiment loop: play, revise the book, persist, repeat.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::engine::Engine;
use crate::io::config::{ExperimentConfig, load_config};
use crate::io::llm::{ChatClient, build_chat_client};
use crate::io::run_log::{ExperimentPaths, RunRecord, write_json, write_text};
use crate::io::wiki::{HttpWikiClient, WikiClient};

/// Run the experiment described by `<experiment_dir>/config.toml` against the
/// live backends.
pub fn run_experiment(experiment_dir: &Path) -> Result<()> {
    let paths = ExperimentPaths::new(experiment_dir);
    let config = load_config(&paths.config_path)?;
    let chat = build_chat_client(&config.llm)?;
    let wiki = HttpWikiClient::new()?;
    run_experiment_with(experiment_dir, &config, chat.as_ref(), &wiki)
}

/// Experiment loop with injected collaborators (tests pass scripted ones).
///
/// Writes the initial book to `books/0.txt`, then for each iteration plays one
/// game with book revision enabled, persisting `books/<i>.txt` and
/// `logs/<i>.json`.
pub fn run_experiment_with<C: ChatClient + ?Sized, W: WikiClient + ?Sized>(
    experiment_dir: &Path,
    config: &ExperimentConfig,
    chat: &C,
    wiki: &W,
) -> Result<()> {
    let paths = ExperimentPaths::new(experiment_dir);
    let engine = Engine::new(config.game.clone(), chat, wiki);

    let (initial_book, _messages, _usage) = engine
        .initialize_guide()
        .context("generate initial book")?;
    write_text(&paths.book_path(0), &initial_book)?;
    info!(chars = initial_book.chars().count(), "initial book written");

    let mut guide = initial_book;
    for iteration in 1..=config.run_loop.iterations {
        let outcome = engine
            .play(&guide, None, None, true)
            .with_context(|| format!("iteration {iteration}"))?;
        if let Some(book) = &outcome.final_book {
            guide = book.clone();
        }
        write_text(&paths.book_path(iteration), &guide)?;
        write_json(&paths.log_path(iteration), &RunRecord::new(config, &outcome))?;
        info!(
            iteration,
            start = %outcome.start,
            goal = %outcome.goal,
            score = outcome.score,
            "iteration finished"
        );
    }
    Ok(())
}
