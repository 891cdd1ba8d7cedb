//! Job manifests and per-dataset sample files.
//!
//! A manifest is a JSON array of dataset file paths laid out as
//! `.../<modality>/<dataset>/<file>.json`. Each dataset file is a JSON array
//! of sample objects:
//!
//! ```json
//! [
//!   {
//!     "question_id": "vqa_rad_0001",
//!     "question": "Is there a fracture?",
//!     "image": "images/0001.png",
//!     "gt_content": "No",
//!     "choice_list": ["A", "B"],
//!     "choice_list_long": ["Yes", "No"]
//!   }
//! ]
//! ```
//!
//! Fields beyond these are kept verbatim and echoed into result records.

use crate::error::{EvalError, Result};
use crate::llm::Prompts;
use crate::model::ModelInput;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Subdirectory of the output directory holding result records.
pub const RESULTS_DIRNAME: &str = "saved_dir";

/// One (modality, dataset) evaluation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Position in the manifest.
    pub ordinal: usize,
    /// Imaging modality, e.g. "X-Ray".
    pub modality: String,
    /// Dataset name, e.g. "VQA-RAD".
    pub dataset: String,
    /// Dataset file with the job's samples.
    pub source: PathBuf,
    /// Directory receiving this job's result records.
    pub result_dir: PathBuf,
}

impl Job {
    /// Derive a job from a manifest entry.
    pub fn new(ordinal: usize, source: PathBuf, output_dir: &Path) -> Result<Self> {
        let mut dirs = source
            .parent()
            .into_iter()
            .flat_map(|p| p.iter().rev())
            .filter_map(|c| c.to_str());

        let (Some(dataset), Some(modality)) = (dirs.next(), dirs.next()) else {
            return Err(EvalError::Dataset(format!(
                "cannot derive modality/dataset from '{}'",
                source.display()
            )));
        };

        let result_dir = output_dir
            .join(RESULTS_DIRNAME)
            .join(modality)
            .join(dataset);

        Ok(Self {
            ordinal,
            modality: modality.to_string(),
            dataset: dataset.to_string(),
            result_dir,
            source,
        })
    }

    /// Load the job's samples in file order.
    pub fn load_samples(&self) -> Result<Vec<Sample>> {
        load_samples(&self.source)
    }
}

/// A single multiple-choice question with its image(s).
#[derive(Debug, Clone)]
pub struct Sample {
    /// Unique identifier of the question.
    pub question_id: String,
    /// What the model is given.
    pub input: ModelInput,
    /// Ground-truth answer text.
    pub ground_truth: String,
    /// Short option labels.
    pub short_choices: Vec<String>,
    /// Fully worded options, in the same order.
    pub long_choices: Vec<String>,
    /// The original sample object.
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageField {
    One(String),
    Many(Vec<String>),
}

impl Default for ImageField {
    fn default() -> Self {
        ImageField::Many(Vec::new())
    }
}

impl ImageField {
    fn into_vec(self) -> Vec<String> {
        match self {
            ImageField::One(path) => vec![path],
            ImageField::Many(paths) => paths,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawSample {
    question_id: String,
    #[serde(default)]
    question: String,
    #[serde(default)]
    image: ImageField,
    gt_content: String,
    #[serde(default)]
    choice_list: Vec<String>,
    choice_list_long: Vec<String>,
}

/// Load a manifest into jobs, in manifest order.
///
/// Relative dataset paths are resolved against the manifest's directory.
pub fn load_manifest(path: &Path, output_dir: &Path) -> Result<Vec<Job>> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    let entries: Vec<PathBuf> = serde_json::from_str(&content).map_err(|e| {
        EvalError::Dataset(format!("invalid manifest '{}': {}", path.display(), e))
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));

    entries
        .into_iter()
        .enumerate()
        .map(|(ordinal, entry)| {
            let source = if entry.is_absolute() {
                entry
            } else {
                base.join(entry)
            };
            Job::new(ordinal, source, output_dir)
        })
        .collect()
}

/// Load the samples of one dataset file.
///
/// Relative image paths are resolved against the dataset file's directory.
pub fn load_samples(path: &Path) -> Result<Vec<Sample>> {
    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    let objects: Vec<Map<String, Value>> = serde_json::from_str(&content).map_err(|e| {
        EvalError::Dataset(format!("invalid dataset '{}': {}", path.display(), e))
    })?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));

    objects
        .into_iter()
        .enumerate()
        .map(|(idx, object)| {
            parse_sample(object, base).map_err(|e| {
                EvalError::Dataset(format!(
                    "sample {} in '{}': {}",
                    idx,
                    path.display(),
                    e
                ))
            })
        })
        .collect()
}

fn parse_sample(object: Map<String, Value>, base: &Path) -> std::result::Result<Sample, String> {
    let raw: RawSample =
        serde_json::from_value(Value::Object(object.clone())).map_err(|e| e.to_string())?;

    if raw.question_id.trim().is_empty() {
        return Err("empty question_id".to_string());
    }

    if !raw.choice_list.is_empty() && raw.choice_list.len() != raw.choice_list_long.len() {
        warn!(
            question_id = %raw.question_id,
            short = raw.choice_list.len(),
            long = raw.choice_list_long.len(),
            "choice list lengths differ"
        );
    }

    let images = raw
        .image
        .into_vec()
        .into_iter()
        .map(|p| {
            let p = PathBuf::from(p);
            if p.is_absolute() { p } else { base.join(p) }
        })
        .collect();

    let prompt = Prompts::question(&raw.question, &raw.choice_list, &raw.choice_list_long);

    Ok(Sample {
        question_id: raw.question_id,
        input: ModelInput { prompt, images },
        ground_truth: raw.gt_content,
        short_choices: raw.choice_list,
        long_choices: raw.choice_list_long,
        metadata: object,
    })
}
