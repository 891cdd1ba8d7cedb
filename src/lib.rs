//! MCQ Eval - a resumable evaluation harness for multimodal question answering.
//!
//! Samples from a list of (modality, dataset) jobs are streamed through a
//! model, the free-text answers are snapped onto each question's options by
//! fuzzy matching, and progress is checkpointed after every sample so an
//! interrupted run picks up exactly where it stopped.
//!
//! # Quick Start
//!
//! ```no_run
//! use mcq_eval::{
//!     config::Config,
//!     dataset::load_manifest,
//!     llm::LlmClient,
//!     runner::Evaluator,
//! };
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(None)?;
//!     config.validate()?;
//!     config.validate_model()?;
//!
//!     let output_dir = Path::new("output");
//!     let jobs = load_manifest(Path::new("manifest.json"), output_dir)?;
//!
//!     let model = LlmClient::new(config.model.clone());
//!     let evaluator = Evaluator::new(model, config.eval.clone(), output_dir);
//!     let summary = evaluator.run(&jobs).await?;
//!     summary.print_summary();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **matcher**: Ratcliff/Obershelp similarity and best-match search
//! - **resolver**: answer extraction and index-based choice comparison
//! - **checkpoint**: per-job checkpoints and the global job cursor
//! - **results**: write-once per-sample records and accuracy logs
//! - **runner**: the evaluation loop
//! - **report**: read-only progress and accuracy audits

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod llm;
pub mod matcher;
pub mod model;
pub mod persistence;
pub mod report;
pub mod resolver;
pub mod results;
pub mod runner;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, JobCheckpoint, ProgressCursor};
pub use config::Config;
pub use dataset::{Job, Sample, load_manifest};
pub use error::{ErrorKind, EvalError, Result};
pub use llm::LlmClient;
pub use matcher::{find_best_match, similarity};
pub use model::{Model, ModelInput, ReplayModel};
pub use runner::{Evaluator, JobSummary, RunSummary};
