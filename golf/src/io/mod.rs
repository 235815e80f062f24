//! Side-effecting collaborators: config files, HTTP backends, persisted
//! records, prompt templates.

pub mod config;
pub mod llm;
pub mod prompt;
pub mod run_log;
pub mod wiki;
