//! Play-through orchestration: the per-turn state machine.
//!
//! One [`Engine`] drives complete play-throughs against a chat backend and the
//! encyclopedia. All per-play mutable state lives in an owned [`PlaySession`]
//! threaded through the loop, so independent play-throughs share nothing but
//! the immutable config.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::book::revise_book;
use crate::core::candidates;
use crate::core::moves::extract_move;
use crate::core::types::{GameConfig, Message, Outcome, SENTINEL_SCORE, StepRecord};
use crate::core::usage::{UsageCounters, UsageReport, merge_usage};
use crate::io::llm::ChatClient;
use crate::io::prompt::{PromptEngine, TurnPromptInputs};
use crate::io::wiki::WikiClient;

/// Mutable state accumulated over one play-through.
struct PlaySession {
    history: Vec<String>,
    steps: Vec<StepRecord>,
    messages: Vec<Message>,
    usage: UsageCounters,
}

impl PlaySession {
    fn new(start: &str) -> Self {
        Self {
            history: vec![start.to_string()],
            steps: Vec::new(),
            messages: Vec::new(),
            usage: UsageCounters::new(),
        }
    }

    fn record_exchange(&mut self, prompt: String, reply_text: &str, usage: &UsageReport) {
        self.messages.push(Message::user(prompt));
        self.usage = merge_usage(&self.usage, usage);
        self.messages.push(Message::assistant(reply_text.to_string()));
    }
}

/// Drives play-throughs and book revisions for one experiment.
pub struct Engine<'a, C: ChatClient + ?Sized, W: WikiClient + ?Sized> {
    config: GameConfig,
    chat: &'a C,
    wiki: &'a W,
    prompts: PromptEngine,
}

impl<'a, C: ChatClient + ?Sized, W: WikiClient + ?Sized> Engine<'a, C, W> {
    pub fn new(config: GameConfig, chat: &'a C, wiki: &'a W) -> Self {
        Self {
            config,
            chat,
            wiki,
            prompts: PromptEngine::new(),
        }
    }

    /// Generate the first strategy book, before any play-through.
    pub fn initialize_guide(&self) -> Result<(String, Vec<Message>, UsageCounters)> {
        crate::book::generate_initial_book(self.chat, &self.prompts, self.config.max_steps)
    }

    /// One complete play-through.
    ///
    /// When `start`/`goal` are omitted the engine samples them itself,
    /// requiring the goal to meet the configured backlink minimum. With
    /// `update_book` the revision step runs afterwards — also on failure
    /// paths — and the outcome carries the new book.
    pub fn play(
        &self,
        guide: &str,
        start: Option<&str>,
        goal: Option<&str>,
        update_book: bool,
    ) -> Result<Outcome> {
        let (start, goal) = match (start, goal) {
            (Some(start), Some(goal)) => (start.to_string(), goal.to_string()),
            _ => self.choose_start_goal()?,
        };
        info!(%start, %goal, "starting play-through");

        let mut session = PlaySession::new(&start);
        let mut success = false;
        let goal_abstract = if self.config.include_goal_abstract {
            self.wiki
                .page_abstract(&goal)
                .with_context(|| format!("fetch abstract for {goal}"))?
        } else {
            None
        };

        for turn in 1..=self.config.max_steps {
            let current = session
                .history
                .last()
                .cloned()
                .ok_or_else(|| anyhow!("empty visit history"))?;
            let candidates = self.build_candidates(&current, &session.history)?;
            if candidates.is_empty() {
                warn!(%current, turn, "no candidates available, aborting play-through");
                break;
            }

            let prompt = self.prompts.render_turn(&TurnPromptInputs {
                guide,
                goal: &goal,
                current: &current,
                history: &session.history.join("->"),
                turn,
                max_steps: self.config.max_steps,
                max_links: self.config.max_links,
                candidates: &candidates.join("|"),
                goal_abstract: if turn == 1 { goal_abstract.as_deref() } else { None },
                intro: turn == 1,
            })?;

            session.messages.push(Message::user(prompt));
            let reply = self
                .chat
                .generate(&session.messages)
                .with_context(|| format!("agent call on turn {turn}"))?;
            session.usage = merge_usage(&session.usage, &reply.usage);
            session.messages.push(Message::assistant(reply.text.clone()));

            let (mut parsed, mut valid) = extract_move(&reply.text, &candidates);
            let mut invalid_attempts = 0u32;
            while !valid {
                invalid_attempts += 1;
                if invalid_attempts >= self.config.retry_limit {
                    warn!(turn, invalid_attempts, "retry budget exhausted");
                    return self.finalize(start, goal, session, false, update_book);
                }
                let correction = correction_prompt(parsed.as_deref(), &candidates);
                let retry = self
                    .chat
                    .generate(&with_pending(&session.messages, &correction))
                    .with_context(|| format!("correction retry on turn {turn}"))?;
                session.record_exchange(correction, &retry.text, &retry.usage);
                (parsed, valid) = extract_move(&retry.text, &candidates);
            }
            let choice = parsed.ok_or_else(|| anyhow!("validated move missing"))?;
            debug!(turn, %current, %choice, "move accepted");

            session.history.push(choice.clone());
            session.steps.push(StepRecord {
                current,
                candidates,
                choice: choice.clone(),
            });
            if choice == goal {
                success = true;
                break;
            }
        }

        self.finalize(start, goal, session, success, update_book)
    }

    /// Fetch outbound links and assemble the ordered candidate set. A page
    /// missing upstream yields an empty set, which the turn loop treats as
    /// terminal.
    fn build_candidates(&self, current: &str, history: &[String]) -> Result<Vec<String>> {
        let links = self
            .wiki
            .links(current)
            .with_context(|| format!("list links of {current}"))?
            .unwrap_or_default();
        Ok(candidates::assemble(
            current,
            history,
            &links,
            self.config.max_links,
            self.config.exclude_digit_links,
        ))
    }

    /// Sample start/goal by repeated random draws until the goal clears the
    /// backlink threshold.
    fn choose_start_goal(&self) -> Result<(String, String)> {
        loop {
            let pages = self.wiki.random_titles(2).context("sample random pages")?;
            let [start, goal] = pages.as_slice() else {
                continue;
            };
            if start == goal {
                continue;
            }
            if self.config.min_goal_backlinks > 0 {
                let backlinks = self
                    .wiki
                    .backlink_count(goal)
                    .with_context(|| format!("count backlinks of {goal}"))?;
                if backlinks < self.config.min_goal_backlinks {
                    debug!(%goal, backlinks, "goal rejected, too few backlinks");
                    continue;
                }
            }
            return Ok((start.clone(), goal.clone()));
        }
    }

    /// Package the immutable outcome, running the book revision when asked.
    fn finalize(
        &self,
        start: String,
        goal: String,
        mut session: PlaySession,
        success: bool,
        update_book: bool,
    ) -> Result<Outcome> {
        let score = if success {
            session.steps.len() as u32
        } else {
            SENTINEL_SCORE
        };
        let final_book = if update_book {
            Some(revise_book(
                self.chat,
                &self.prompts,
                &mut session.messages,
                &mut session.usage,
                &start,
                &goal,
                &session.steps,
                success,
            )?)
        } else {
            None
        };
        info!(%start, %goal, success, score, steps = session.steps.len(), "play-through finished");
        Ok(Outcome {
            start,
            goal,
            score,
            success,
            steps: session.steps,
            messages: session.messages,
            usage: session.usage,
            final_book,
        })
    }
}

/// Correction prompt restating the exact candidate set after an invalid move.
fn correction_prompt(invalid: Option<&str>, candidates: &[String]) -> String {
    format!(
        "「{}」は選択肢に存在しません。選択肢: {}。\nゴールに近づくため、次に移動するページを選択肢から1つだけ選んでください。1行目に『考察: 検討過程(100文字まで)』、2行目に『移動先: 選択肢』としてください。",
        invalid.unwrap_or("不明"),
        candidates.join("|")
    )
}

/// Transcript plus one not-yet-recorded prompt, for the retry call.
fn with_pending(messages: &[Message], prompt: &str) -> Vec<Message> {
    let mut pending = messages.to_vec();
    pending.push(Message::user(prompt.to_string()));
    pending
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Role;
    use crate::test_support::{ScriptedChat, ScriptedWiki};

    fn config(retry_limit: u32) -> GameConfig {
        GameConfig {
            retry_limit,
            ..GameConfig::default()
        }
    }

    #[test]
    fn one_move_win_scores_path_length() {
        let chat = ScriptedChat::new(vec!["考察: 直行する\n移動先: B".to_string()]);
        let wiki = ScriptedWiki::new().with_links("A", &["B", "C"]);
        let engine = Engine::new(config(3), &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("B"), false).expect("play");

        assert!(outcome.success);
        assert_eq!(outcome.score, 1);
        assert_eq!(
            outcome.steps,
            vec![StepRecord {
                current: "A".to_string(),
                candidates: vec!["B".to_string(), "C".to_string()],
                choice: "B".to_string(),
            }]
        );
        assert!(outcome.final_book.is_none());
        // one prompt, one reply
        assert_eq!(outcome.messages.len(), 2);
        assert_eq!(outcome.messages[0].role, Role::User);
        assert_eq!(outcome.usage.get("input_tokens"), Some(&10));
    }

    #[test]
    fn retry_exhaustion_aborts_whole_play_through() {
        let chat = ScriptedChat::new(vec![
            "移動先: Z".to_string(),
            "移動先: Z".to_string(),
            "移動先: Z".to_string(),
        ]);
        let wiki = ScriptedWiki::new().with_links("A", &["B", "C"]);
        let engine = Engine::new(config(3), &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("B"), false).expect("play");

        assert!(!outcome.success);
        assert_eq!(outcome.score, SENTINEL_SCORE);
        assert!(outcome.steps.is_empty());
        // turn prompt + 3 replies + 2 correction prompts
        assert_eq!(outcome.messages.len(), 6);
        assert!(outcome.messages[2].content.contains("「Z」は選択肢に存在しません"));
        assert!(outcome.messages[2].content.contains("選択肢: B|C。"));
        // usage merged across all three calls
        assert_eq!(outcome.usage.get("input_tokens"), Some(&30));
    }

    #[test]
    fn recovers_from_one_invalid_move() {
        let chat = ScriptedChat::new(vec![
            "移動先: Z".to_string(),
            "考察: 言い直し\n移動先: B".to_string(),
        ]);
        let wiki = ScriptedWiki::new().with_links("A", &["B"]);
        let engine = Engine::new(config(3), &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("B"), false).expect("play");

        assert!(outcome.success);
        assert_eq!(outcome.score, 1);
        // retry call saw the correction prompt at the end of the transcript
        let retry_transcript = chat.call(1);
        assert_eq!(retry_transcript.last().map(|m| m.role), Some(Role::User));
    }

    #[test]
    fn missing_page_fails_without_agent_call() {
        let chat = ScriptedChat::new(Vec::new());
        let wiki = ScriptedWiki::new().with_missing_page("A");
        let engine = Engine::new(config(3), &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("B"), false).expect("play");

        assert!(!outcome.success);
        assert_eq!(outcome.score, SENTINEL_SCORE);
        assert!(outcome.steps.is_empty());
        assert!(outcome.messages.is_empty());
        assert_eq!(chat.call_count(), 0);
    }

    #[test]
    fn turn_budget_exhaustion_fails_with_sentinel() {
        // Two pages linking to each other, goal unreachable.
        let chat = ScriptedChat::new(vec!["移動先: B".to_string(), "移動先: A".to_string()]);
        let wiki = ScriptedWiki::new()
            .with_links("A", &["B"])
            .with_links("B", &["A"]);
        let mut cfg = config(3);
        cfg.max_steps = 2;
        let engine = Engine::new(cfg, &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("G"), false).expect("play");

        assert!(!outcome.success);
        assert_eq!(outcome.score, SENTINEL_SCORE);
        assert_eq!(outcome.steps.len(), 2);
    }

    #[test]
    fn turn_one_carries_goal_abstract_when_configured() {
        let chat = ScriptedChat::new(vec!["移動先: B".to_string()]);
        let wiki = ScriptedWiki::new()
            .with_links("A", &["B"])
            .with_abstract("B", "Bの概要です。");
        let mut cfg = config(3);
        cfg.include_goal_abstract = true;
        let engine = Engine::new(cfg, &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("B"), false).expect("play");

        assert!(outcome.messages[0].content.contains("- ゴール概要: Bの概要です。"));
    }

    #[test]
    fn update_book_runs_revision_after_failure_too() {
        let chat = ScriptedChat::new(vec![
            "移動先: Z".to_string(),
            "移動先: Z".to_string(),
            "移動先: Z".to_string(),
            "新しい攻略本。".to_string(),
        ]);
        let wiki = ScriptedWiki::new().with_links("A", &["B"]);
        let engine = Engine::new(config(3), &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("G"), true).expect("play");

        assert!(!outcome.success);
        assert_eq!(outcome.final_book.as_deref(), Some("新しい攻略本。"));
        // revision prompt + reply appended to the audit transcript
        let last = outcome.messages.last().expect("messages");
        assert_eq!(last.content, "新しい攻略本。");
    }

    #[test]
    fn samples_start_goal_until_backlinks_clear_threshold() {
        let chat = ScriptedChat::new(vec!["移動先: 音楽".to_string()]);
        let wiki = ScriptedWiki::new()
            .push_random(&["日本", "日本"])
            .push_random(&["日本", "マイナー項目"])
            .push_random(&["日本", "音楽"])
            .with_backlinks("マイナー項目", 0)
            .with_backlinks("音楽", 50)
            .with_links("日本", &["音楽"]);
        let mut cfg = config(3);
        cfg.min_goal_backlinks = 10;
        let engine = Engine::new(cfg, &chat, &wiki);

        let outcome = engine.play("攻略本", None, None, false).expect("play");

        assert_eq!(outcome.start, "日本");
        assert_eq!(outcome.goal, "音楽");
        assert!(outcome.success);
    }

    #[test]
    fn candidate_sets_offered_never_contain_current_or_duplicates() {
        let chat = ScriptedChat::new(vec![
            "移動先: B".to_string(),
            "移動先: G".to_string(),
        ]);
        let wiki = ScriptedWiki::new()
            .with_links("A", &["B", "B", "A"])
            .with_links("B", &["A", "G", "B"]);
        let engine = Engine::new(config(3), &chat, &wiki);

        let outcome = engine.play("攻略本", Some("A"), Some("G"), false).expect("play");

        for step in &outcome.steps {
            let mut seen = std::collections::BTreeSet::new();
            for candidate in &step.candidates {
                assert_ne!(candidate, &step.current);
                assert!(seen.insert(candidate), "duplicate candidate {candidate}");
            }
        }
        assert!(outcome.success);
        assert_eq!(outcome.score, 2);
    }
}
