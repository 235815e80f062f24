//! Strategy-book generation and post-game revision.
//!
//! The book is a bounded-length Japanese text the agent both reads (turn-1
//! context) and rewrites after each play-through. Every revision produces a
//! new value; nothing is mutated in place.

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::core::types::{BOOK_CHAR_LIMIT, Message, StepRecord};
use crate::core::usage::{UsageCounters, merge_usage};
use crate::io::llm::ChatClient;
use crate::io::prompt::PromptEngine;

/// Literal phrase replacements stripping run-specific references from a
/// drafted book. Applied in order: the longer `このプレイ` must go before the
/// bare `プレイ` rewrite.
const REPLACEMENTS: [(&str, &str); 5] = [
    ("今回", ""),
    ("このプレイ", ""),
    ("このゲーム", ""),
    ("プレイ", "戦略"),
    ("移動履歴", "過去の判断"),
];

/// Best-effort cleanup of a drafted book. Not a semantic guarantee.
pub fn clean_book_text(text: &str) -> String {
    let mut cleaned = text.trim().to_string();
    for (phrase, replacement) in REPLACEMENTS {
        cleaned = cleaned.replace(phrase, replacement);
    }
    cleaned
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Hard-truncate to at most `limit` characters (not bytes).
fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Generate the very first book from scratch.
///
/// Returns the book together with the conversation and usage it cost, so the
/// caller can persist the exchange.
pub fn generate_initial_book<C: ChatClient + ?Sized>(
    chat: &C,
    prompts: &PromptEngine,
    max_steps: u32,
) -> Result<(String, Vec<Message>, UsageCounters)> {
    let prompt = prompts.render_initial_book(max_steps, BOOK_CHAR_LIMIT)?;
    let mut messages = vec![Message::user(prompt)];
    let reply = chat.generate(&messages).context("generate initial book")?;
    let mut usage = merge_usage(&UsageCounters::new(), &reply.usage);

    let book = clean_book_text(&reply.text);
    let book = if char_len(&book) > BOOK_CHAR_LIMIT {
        messages.push(Message::assistant(reply.text));
        request_shorter_book(chat, &mut messages, &mut usage, char_len(&book))?
    } else {
        messages.push(Message::assistant(reply.text));
        truncate_chars(&book, BOOK_CHAR_LIMIT)
    };
    Ok((book, messages, usage))
}

/// Post-game revision step: ask the agent to rewrite the book as generalized
/// advice, enforce the character budget, and return the new book text.
///
/// The review prompt and every retry are appended to `messages` and their
/// usage merged into `usage`, keeping the failure path fully auditable.
pub fn revise_book<C: ChatClient + ?Sized>(
    chat: &C,
    prompts: &PromptEngine,
    messages: &mut Vec<Message>,
    usage: &mut UsageCounters,
    start: &str,
    goal: &str,
    steps: &[StepRecord],
    success: bool,
) -> Result<String> {
    let status = if success { "成功" } else { "失敗" };
    let history = render_step_history(steps);
    let prompt =
        prompts.render_review(status, start, goal, steps.len(), BOOK_CHAR_LIMIT, &history)?;

    messages.push(Message::user(prompt));
    let reply = chat.generate(messages).context("generate book revision")?;
    *usage = merge_usage(usage, &reply.usage);
    messages.push(Message::assistant(reply.text.clone()));

    let draft = clean_book_text(&reply.text);
    let draft_len = char_len(&draft);
    if draft_len > BOOK_CHAR_LIMIT {
        debug!(draft_len, limit = BOOK_CHAR_LIMIT, "book draft over budget");
        return request_shorter_book(chat, messages, usage, draft_len);
    }
    Ok(truncate_chars(&draft, BOOK_CHAR_LIMIT))
}

/// One bounded re-draft round, then hard truncation as the last resort.
fn request_shorter_book<C: ChatClient + ?Sized>(
    chat: &C,
    messages: &mut Vec<Message>,
    usage: &mut UsageCounters,
    current_length: usize,
) -> Result<String> {
    let limit = BOOK_CHAR_LIMIT;
    messages.push(Message::user(format!(
        "攻略本は{limit}文字以内です。先ほどの草稿は{current_length}文字あり、制限を超えています。箇条書き中心の実践的な攻略本のみを書き直し、余分な前置きや説明は含めないでください。"
    )));
    let reply = chat.generate(messages).context("generate shortened book")?;
    *usage = merge_usage(usage, &reply.usage);
    messages.push(Message::assistant(reply.text.clone()));

    let mut cleaned = clean_book_text(&reply.text);
    if char_len(&cleaned) > limit {
        warn!(
            draft_len = char_len(&cleaned),
            limit, "shortened book still over budget, truncating"
        );
        cleaned = truncate_chars(&cleaned, limit);
    }
    Ok(cleaned)
}

/// Render steps as the numbered path shown in the review prompt.
fn render_step_history(steps: &[StepRecord]) -> String {
    if steps.is_empty() {
        return "(移動なし)".to_string();
    }
    steps
        .iter()
        .enumerate()
        .map(|(idx, step)| format!("- {}手目 {} -> {}", idx + 1, step.current, step.choice))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedChat;

    fn step(current: &str, choice: &str) -> StepRecord {
        StepRecord {
            current: current.to_string(),
            candidates: vec![choice.to_string()],
            choice: choice.to_string(),
        }
    }

    #[test]
    fn cleanup_strips_run_specific_phrases_in_order() {
        let cleaned = clean_book_text("今回のプレイでは移動履歴を見直す。このプレイは良かった。");
        assert!(!cleaned.contains("今回"));
        assert!(!cleaned.contains("このプレイ"));
        assert!(!cleaned.contains("移動履歴"));
        assert!(cleaned.contains("戦略"));
        assert!(cleaned.contains("過去の判断"));
    }

    #[test]
    fn revision_within_budget_is_returned_cleaned() {
        let chat = ScriptedChat::new(vec!["リンクの多いハブページを狙う。".to_string()]);
        let prompts = PromptEngine::new();
        let mut messages = Vec::new();
        let mut usage = UsageCounters::new();

        let book = revise_book(
            &chat,
            &prompts,
            &mut messages,
            &mut usage,
            "日本",
            "音楽",
            &[step("日本", "音楽")],
            true,
        )
        .expect("revise");

        assert_eq!(book, "リンクの多いハブページを狙う。");
        // review prompt + assistant reply recorded
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("- 1手目 日本 -> 音楽"));
    }

    #[test]
    fn over_budget_draft_triggers_one_shorten_round() {
        let long_draft = "あ".repeat(BOOK_CHAR_LIMIT + 100);
        let chat = ScriptedChat::new(vec![long_draft, "短い攻略本。".to_string()]);
        let prompts = PromptEngine::new();
        let mut messages = Vec::new();
        let mut usage = UsageCounters::new();

        let book = revise_book(
            &chat,
            &prompts,
            &mut messages,
            &mut usage,
            "日本",
            "音楽",
            &[],
            false,
        )
        .expect("revise");

        assert_eq!(book, "短い攻略本。");
        // review + draft + shorten request + shortened reply
        assert_eq!(messages.len(), 4);
        assert!(messages[2].content.contains("制限を超えています"));
        assert!(messages[0].content.contains("(移動なし)"));
    }

    #[test]
    fn stubborn_over_budget_reply_is_truncated() {
        let long_draft = "あ".repeat(BOOK_CHAR_LIMIT + 100);
        let still_long = "い".repeat(BOOK_CHAR_LIMIT + 50);
        let chat = ScriptedChat::new(vec![long_draft, still_long]);
        let prompts = PromptEngine::new();
        let mut messages = Vec::new();
        let mut usage = UsageCounters::new();

        let book = revise_book(
            &chat,
            &prompts,
            &mut messages,
            &mut usage,
            "日本",
            "音楽",
            &[],
            false,
        )
        .expect("revise");

        assert_eq!(book.chars().count(), BOOK_CHAR_LIMIT);
    }

    #[test]
    fn initial_book_generation_records_conversation_and_usage() {
        let chat = ScriptedChat::new(vec!["最初の攻略本。".to_string()]);
        let prompts = PromptEngine::new();

        let (book, messages, usage) =
            generate_initial_book(&chat, &prompts, 20).expect("generate");

        assert_eq!(book, "最初の攻略本。");
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("攻略本を執筆してください"));
        assert_eq!(usage.get("input_tokens"), Some(&10));
        assert_eq!(usage.get("output_tokens"), Some(&5));
    }
}
