//! Test-only helpers: scripted collaborators and experiment fixtures.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Result, anyhow};

use crate::core::types::Message;
use crate::core::usage::UsageReport;
use crate::io::llm::{ChatClient, ChatReply};
use crate::io::wiki::WikiClient;

/// [`ChatClient`] returning a fixed sequence of replies.
///
/// Each call reports 10 input / 5 output tokens so usage accounting is
/// observable in tests. Running out of scripted replies is an error, which
/// doubles as an assertion on the number of calls made.
pub struct ScriptedChat {
    replies: RefCell<VecDeque<String>>,
    calls: RefCell<Vec<Vec<Message>>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<String>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Number of generate calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Transcript snapshot passed to the n-th generate call.
    pub fn call(&self, index: usize) -> Vec<Message> {
        self.calls.borrow()[index].clone()
    }
}

impl ChatClient for ScriptedChat {
    fn generate(&self, messages: &[Message]) -> Result<ChatReply> {
        self.calls.borrow_mut().push(messages.to_vec());
        let text = self
            .replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted chat ran out of replies"))?;
        let usage = UsageReport::from([
            ("input_tokens".to_string(), Some(10)),
            ("output_tokens".to_string(), Some(5)),
        ]);
        Ok(ChatReply { text, usage })
    }
}

/// [`WikiClient`] serving canned pages.
///
/// Titles never registered via [`ScriptedWiki::with_links`] behave as missing
/// upstream (`links` returns `None`).
#[derive(Default)]
pub struct ScriptedWiki {
    links: BTreeMap<String, Option<Vec<String>>>,
    abstracts: BTreeMap<String, String>,
    backlinks: BTreeMap<String, u64>,
    random: RefCell<VecDeque<Vec<String>>>,
}

impl ScriptedWiki {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_links(mut self, title: &str, links: &[&str]) -> Self {
        self.links.insert(
            title.to_string(),
            Some(links.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    /// Register a title that exists but reports as missing upstream.
    pub fn with_missing_page(mut self, title: &str) -> Self {
        self.links.insert(title.to_string(), None);
        self
    }

    pub fn with_abstract(mut self, title: &str, text: &str) -> Self {
        self.abstracts.insert(title.to_string(), text.to_string());
        self
    }

    pub fn with_backlinks(mut self, title: &str, count: u64) -> Self {
        self.backlinks.insert(title.to_string(), count);
        self
    }

    /// Queue one batch of random titles to be returned by `random_titles`.
    pub fn push_random(self, titles: &[&str]) -> Self {
        self.random
            .borrow_mut()
            .push_back(titles.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl WikiClient for ScriptedWiki {
    fn random_titles(&self, _limit: u32) -> Result<Vec<String>> {
        self.random
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted wiki ran out of random batches"))
    }

    fn links(&self, title: &str) -> Result<Option<Vec<String>>> {
        Ok(self.links.get(title).cloned().unwrap_or(None))
    }

    fn page_abstract(&self, title: &str) -> Result<Option<String>> {
        Ok(self.abstracts.get(title).cloned())
    }

    fn backlink_count(&self, title: &str) -> Result<u64> {
        Ok(self.backlinks.get(title).copied().unwrap_or(0))
    }
}

/// Temporary experiment directory with a minimal `config.toml`.
pub struct TestExperiment {
    temp: tempfile::TempDir,
}

impl TestExperiment {
    pub fn new() -> Result<Self> {
        Self::with_config(
            r#"
[llm]
provider = "openrouter"
model = "scripted"

[loop]
iterations = 1
"#,
        )
    }

    pub fn with_config(config_toml: &str) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        fs::write(temp.path().join("config.toml"), config_toml)?;
        Ok(Self { temp })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }
}
