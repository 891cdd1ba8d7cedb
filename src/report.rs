//! Read-only views over an output directory.
//!
//! [`progress`] reads the cursor and checkpoints; [`aggregate`] recounts
//! accuracy from the result records themselves, which makes it an audit of
//! the checkpoints.

use crate::checkpoint::{CheckpointStore, JobCheckpoint, ProgressCursor};
use crate::dataset::{Job, RESULTS_DIRNAME};
use crate::error::{EvalError, Result};
use crate::results::StoredResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Lifecycle state of a job as seen from persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    NotStarted,
    Running,
    Completed,
}

/// Progress of one manifest job.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub ordinal: usize,
    pub modality: String,
    pub dataset: String,
    pub state: JobState,
    pub checkpoint: JobCheckpoint,
    /// Sample count of the dataset file, if it could be read.
    pub total_samples: Option<usize>,
}

/// Cursor plus per-job progress.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    pub current_job_ordinal: usize,
    pub jobs: Vec<JobProgress>,
}

/// Inspect the persisted progress of `jobs` without modifying anything.
pub fn progress(output_dir: &Path, jobs: &[Job]) -> Result<ProgressReport> {
    let current_job_ordinal = ProgressCursor::new(output_dir).load_or_init()?;
    let checkpoints = CheckpointStore::new(output_dir);

    let jobs = jobs
        .iter()
        .map(|job| -> Result<JobProgress> {
            let checkpoint = checkpoints.load_or_init(job.ordinal)?;
            let state = if job.ordinal < current_job_ordinal {
                JobState::Completed
            } else if checkpoints.exists(job.ordinal) {
                JobState::Running
            } else {
                JobState::NotStarted
            };

            Ok(JobProgress {
                ordinal: job.ordinal,
                modality: job.modality.clone(),
                dataset: job.dataset.clone(),
                state,
                checkpoint,
                total_samples: job.load_samples().ok().map(|s| s.len()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ProgressReport {
        current_job_ordinal,
        jobs,
    })
}

impl ProgressReport {
    /// Print the report to stdout.
    pub fn print(&self) {
        println!("Current job: {}", self.current_job_ordinal);
        println!("{}", "─".repeat(60));
        for job in &self.jobs {
            let total = job
                .total_samples
                .map(|n| n.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "[{:>3}] {}/{} {:?}: {}/{} processed, accuracy {:.4}",
                job.ordinal,
                job.modality,
                job.dataset,
                job.state,
                job.checkpoint.next_sample_index,
                total,
                job.checkpoint.accuracy()
            );
        }
    }
}

/// Accuracy recounted from result records of one (modality, dataset).
#[derive(Debug, Clone, Default, Serialize)]
pub struct DatasetTally {
    pub modality: String,
    pub dataset: String,
    pub records: usize,
    pub correct: usize,
    pub errors: usize,
}

impl DatasetTally {
    pub fn accuracy(&self) -> f64 {
        if self.records == 0 {
            0.0
        } else {
            self.correct as f64 / self.records as f64
        }
    }
}

/// Recount every result record under `<output_dir>/saved_dir`.
///
/// Tallies are ordered by modality then dataset.
pub fn aggregate(output_dir: &Path) -> Result<Vec<DatasetTally>> {
    let root = output_dir.join(RESULTS_DIRNAME);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut tallies: BTreeMap<(String, String), DatasetTally> = BTreeMap::new();

    for entry in WalkDir::new(&root).min_depth(3).max_depth(3) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(&root).to_path_buf();
            EvalError::io(path, e.into())
        })?;

        let path = entry.path();
        let is_record = entry.file_type().is_file()
            && path.extension().is_some_and(|ext| ext == "json")
            && !entry.file_name().to_string_lossy().starts_with('.');
        if !is_record {
            continue;
        }

        let Some((modality, dataset)) = record_key(&root, path) else {
            continue;
        };

        let content = fs::read(path).map_err(|e| EvalError::io(path, e))?;
        let stored: StoredResult = serde_json::from_slice(&content)
            .map_err(|e| EvalError::Serialization(format!("{}: {}", path.display(), e)))?;

        let tally = tallies
            .entry((modality.clone(), dataset.clone()))
            .or_insert_with(|| DatasetTally {
                modality,
                dataset,
                ..Default::default()
            });
        tally.records += 1;
        tally.correct += usize::from(stored.correct);
        tally.errors += usize::from(stored.error.is_some());
    }

    Ok(tallies.into_values().collect())
}

fn record_key(root: &Path, path: &Path) -> Option<(String, String)> {
    let relative = path.strip_prefix(root).ok()?;
    let mut parts = relative.iter().filter_map(|c| c.to_str());
    let modality = parts.next()?.to_string();
    let dataset = parts.next()?.to_string();
    Some((modality, dataset))
}
