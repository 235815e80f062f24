//! Prompt rendering for agent-facing text.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const REVIEW_TEMPLATE: &str = include_str!("prompts/review.md");
const INITIAL_BOOK_TEMPLATE: &str = include_str!("prompts/initial_book.md");

/// All inputs needed to render one turn prompt.
#[derive(Debug, Clone)]
pub struct TurnPromptInputs<'a> {
    /// Current strategy book; shown only on turn 1.
    pub guide: &'a str,
    pub goal: &'a str,
    pub current: &'a str,
    /// Visit path rendered as `A->B->C`.
    pub history: &'a str,
    pub turn: u32,
    pub max_steps: u32,
    pub max_links: usize,
    /// Pipe-joined candidate list.
    pub candidates: &'a str,
    /// Goal abstract, shown only on turn 1 when configured.
    pub goal_abstract: Option<&'a str>,
    /// Whether to include the rules preamble and the book (turn 1 only).
    pub intro: bool,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("turn", TURN_TEMPLATE)
            .expect("turn template should be valid");
        env.add_template("review", REVIEW_TEMPLATE)
            .expect("review template should be valid");
        env.add_template("initial_book", INITIAL_BOOK_TEMPLATE)
            .expect("initial book template should be valid");
        Self { env }
    }

    pub fn render_turn(&self, input: &TurnPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("turn")?;
        let rendered = template
            .render(context! {
                intro => input.intro,
                guide => input.guide.trim(),
                goal => input.goal,
                current => input.current,
                history => input.history,
                turn => input.turn,
                max_steps => input.max_steps,
                max_links => input.max_links,
                candidates => input.candidates,
                goal_abstract => input.goal_abstract,
            })
            .context("render turn prompt")?;
        Ok(rendered.trim_end().to_string())
    }

    /// Review prompt asking the agent to rewrite the book as evergreen advice.
    pub fn render_review(
        &self,
        status: &str,
        start: &str,
        goal: &str,
        move_count: usize,
        limit: usize,
        history: &str,
    ) -> Result<String> {
        let template = self.env.get_template("review")?;
        let rendered = template
            .render(context! {
                status => status,
                start => start,
                goal => goal,
                move_count => move_count,
                limit => limit,
                history => history,
            })
            .context("render review prompt")?;
        Ok(rendered.trim_end().to_string())
    }

    pub fn render_initial_book(&self, max_steps: u32, limit: usize) -> Result<String> {
        let template = self.env.get_template("initial_book")?;
        let rendered = template
            .render(context! { max_steps => max_steps, limit => limit })
            .context("render initial book prompt")?;
        Ok(rendered.trim_end().to_string())
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}
