//! botgate — an LLM gateway for game bots.
//!
//! Sits between chat-game bots and the Gemini backend: screens input
//! through a score-based injection guard, keeps per-chat history on a
//! checkpoint store, composes task prompts in TOON encoding, calls the
//! model with task-tuned parameters and key rotation, parses replies into
//! structured verdicts, and records token usage to the shared daily table.

pub mod config;
pub mod error;
pub mod games;
pub mod guard;
pub mod health;
pub mod http;
pub mod id;
pub mod llm;
pub mod nlp;
pub mod prompt;
pub mod session;
pub mod text;
pub mod toon;
pub mod unicode;
pub mod usage;

pub use error::{GatewayError, Result};
