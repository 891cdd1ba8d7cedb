//! Durable progress state: one checkpoint per job plus a global cursor.
//!
//! Layout under the output directory:
//! - `dataset_position.json` holds the ordinal of the job in progress.
//! - `test_position{ordinal}.json` holds a job's [`JobCheckpoint`].

use crate::error::{EvalError, Result};
use crate::persistence::{read_optional, write_json};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Filename of the global cursor record.
pub const CURSOR_FILENAME: &str = "dataset_position.json";

/// How far a job has progressed and how many samples it got right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCheckpoint {
    /// Index of the first sample not yet processed.
    pub next_sample_index: usize,
    /// Correct predictions among the processed samples.
    pub correct_count: usize,
}

impl JobCheckpoint {
    /// Record one more processed sample.
    pub fn advance(self, correct: bool) -> Self {
        Self {
            next_sample_index: self.next_sample_index + 1,
            correct_count: self.correct_count + usize::from(correct),
        }
    }

    /// Fraction of processed samples that were correct (0.0 before any).
    pub fn accuracy(&self) -> f64 {
        if self.next_sample_index == 0 {
            0.0
        } else {
            self.correct_count as f64 / self.next_sample_index as f64
        }
    }

    fn check(&self) -> std::result::Result<(), String> {
        if self.correct_count > self.next_sample_index {
            return Err(format!(
                "correct_count {} exceeds next_sample_index {}",
                self.correct_count, self.next_sample_index
            ));
        }
        Ok(())
    }
}

/// Per-job checkpoint records keyed by job ordinal.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    /// Store rooted at the run's output directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the checkpoint record for a job.
    pub fn path(&self, ordinal: usize) -> PathBuf {
        self.dir.join(format!("test_position{}.json", ordinal))
    }

    /// Whether the job has ever been started.
    pub fn exists(&self, ordinal: usize) -> bool {
        self.path(ordinal).is_file()
    }

    /// Load the job's checkpoint, or a zeroed one if the job never started.
    pub fn load_or_init(&self, ordinal: usize) -> Result<JobCheckpoint> {
        let path = self.path(ordinal);

        let Some(data) = read_optional(&path)? else {
            return Ok(JobCheckpoint::default());
        };

        let checkpoint: JobCheckpoint =
            serde_json::from_slice(&data).map_err(|e| EvalError::corrupt(&path, e.to_string()))?;
        checkpoint
            .check()
            .map_err(|reason| EvalError::corrupt(&path, reason))?;

        Ok(checkpoint)
    }

    /// Atomically persist the job's checkpoint.
    pub fn save(&self, ordinal: usize, checkpoint: &JobCheckpoint) -> Result<()> {
        let path = self.path(ordinal);
        checkpoint.check().map_err(EvalError::InvalidInput)?;
        write_json(&path, checkpoint)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CursorRecord {
    current_job_ordinal: usize,
}

/// Which job of the manifest the run is on.
#[derive(Debug, Clone)]
pub struct ProgressCursor {
    path: PathBuf,
}

impl ProgressCursor {
    /// Cursor stored in the run's output directory.
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CURSOR_FILENAME),
        }
    }

    /// Path of the cursor record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored ordinal, or 0 for a fresh output directory.
    pub fn load_or_init(&self) -> Result<usize> {
        let Some(data) = read_optional(&self.path)? else {
            return Ok(0);
        };

        let record: CursorRecord = serde_json::from_slice(&data)
            .map_err(|e| EvalError::corrupt(&self.path, e.to_string()))?;
        Ok(record.current_job_ordinal)
    }

    /// Atomically persist a new ordinal. Moving backwards is rejected.
    pub fn save(&self, ordinal: usize) -> Result<()> {
        let current = self.load_or_init()?;
        if ordinal < current {
            return Err(EvalError::InvalidInput(format!(
                "cursor cannot move back from job {} to {}",
                current, ordinal
            )));
        }

        write_json(
            &self.path,
            &CursorRecord {
                current_job_ordinal: ordinal,
            },
        )
    }
}
