//! Shared deterministic types for the game engine.
//!
//! These types define stable contracts between core components. They should not
//! depend on external state or I/O and must remain deterministic across runs.

use serde::{Deserialize, Serialize};

use crate::core::usage::UsageCounters;

/// Score recorded when a play-through fails to reach the goal.
pub const SENTINEL_SCORE: u32 = 9999;

/// Maximum number of characters allowed in the strategy book.
pub const BOOK_CHAR_LIMIT: usize = 2000;

/// Fixed seed for the link down-sampler. Re-seeded on every sampling call so
/// the same oversized link list always yields the same subset, regardless of
/// how often sampling has run elsewhere in the process.
pub const LINK_SAMPLE_SEED: u64 = 20251113;

/// Immutable per-play-through rules. Supplied once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Turn budget; exceeding it fails the play-through.
    pub max_steps: u32,
    /// Cap on forward links offered per turn; `0` disables down-sampling.
    pub max_links: usize,
    /// Drop candidate links whose title contains an ASCII or full-width digit.
    pub exclude_digit_links: bool,
    /// Invalid-move replies tolerated within one turn before the play-through
    /// is aborted.
    pub retry_limit: u32,
    /// Fetch the goal's short abstract and show it on turn 1.
    pub include_goal_abstract: bool,
    /// Minimum inbound-link count required of a randomly chosen goal page.
    pub min_goal_backlinks: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            max_links: 100,
            exclude_digit_links: true,
            retry_limit: 3,
            include_goal_abstract: false,
            min_goal_backlinks: 1,
        }
    }
}

/// Conversation role, serialized the way chat APIs expect it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One prompt or reply in the play-through transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// One successful turn: the page we stood on, the full ordered candidate set
/// offered, and the page the agent chose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub current: String,
    pub candidates: Vec<String>,
    pub choice: String,
}

/// Terminal artifact of one play-through.
///
/// `score` equals `steps.len()` iff `success` is true; otherwise it is
/// [`SENTINEL_SCORE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub start: String,
    pub goal: String,
    pub score: u32,
    pub success: bool,
    pub steps: Vec<StepRecord>,
    pub messages: Vec<Message>,
    pub usage: UsageCounters,
    /// Revised book text, present only when the caller requested an update.
    pub final_book: Option<String>,
}
