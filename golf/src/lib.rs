//! Self-revising agent player for Wikipedia golf.
//!
//! An LLM agent navigates from a random start page to a goal page using only
//! links, guided by a strategy book it rewrites after every play-through. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (candidate assembly, move
//!   validation, usage accounting). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting collaborators (config, MediaWiki API, chat
//!   backends, persisted records). Isolated behind traits to enable scripted
//!   fakes in tests.
//!
//! Orchestration modules ([`engine`], [`book`], [`experiment`],
//! [`evaluation`]) coordinate core logic with I/O to implement CLI commands.

pub mod book;
pub mod core;
pub mod engine;
pub mod evaluation;
pub mod experiment;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
