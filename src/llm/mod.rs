//! Model endpoint integration.
//!
//! Provides an OpenAI-compatible vision client implementing [`crate::model::Model`]
//! and the prompts used to pose questions.

mod client;
mod prompts;

pub use client::LlmClient;
pub use prompts::{ANSWER_DELIMITER, Prompts};
