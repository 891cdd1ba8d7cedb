//! The inference model seen from the evaluation loop.

use crate::error::{EvalError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Vision + language payload for one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelInput {
    /// Prompt text, ending with the answer delimiter.
    pub prompt: String,
    /// Images referenced by the prompt, in order.
    pub images: Vec<PathBuf>,
}

/// Anything that can turn a sample input into decoded text.
///
/// The returned text is the full decoded transcript; the answer is located
/// by its delimiter, so implementations should include the prompt when the
/// backend does not echo it.
#[async_trait]
pub trait Model: Send + Sync {
    /// Generate a decoded transcript for one sample.
    async fn generate(&self, question_id: &str, input: &ModelInput) -> Result<String>;
}

#[async_trait]
impl<M: Model + ?Sized> Model for &M {
    async fn generate(&self, question_id: &str, input: &ModelInput) -> Result<String> {
        (**self).generate(question_id, input).await
    }
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    question_id: String,
    generation: String,
}

/// Serves precomputed generations, for re-scoring without a live model.
#[derive(Debug, Clone, Default)]
pub struct ReplayModel {
    generations: HashMap<String, String>,
}

impl ReplayModel {
    /// Load a JSONL file of `{"question_id": ..., "generation": ...}` lines.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;

        let mut generations = HashMap::new();
        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: ReplayLine = serde_json::from_str(line).map_err(|e| {
                EvalError::Dataset(format!(
                    "{} line {}: {}",
                    path.display(),
                    line_num + 1,
                    e
                ))
            })?;
            generations.insert(entry.question_id, entry.generation);
        }

        Ok(Self { generations })
    }

    /// Number of stored generations.
    pub fn len(&self) -> usize {
        self.generations.len()
    }

    /// Whether no generations are stored.
    pub fn is_empty(&self) -> bool {
        self.generations.is_empty()
    }
}

#[async_trait]
impl Model for ReplayModel {
    async fn generate(&self, question_id: &str, _input: &ModelInput) -> Result<String> {
        self.generations
            .get(question_id)
            .cloned()
            .ok_or_else(|| EvalError::Model(format!("no recorded generation for '{}'", question_id)))
    }
}
