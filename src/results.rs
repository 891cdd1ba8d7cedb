//! Per-sample result records and per-job accuracy logs.

use crate::error::Result;
use crate::persistence::{append_line, read_json, write_json};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Outcome of one sample, written once as `<question_id>.json`.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleResult {
    /// Position of the sample in its dataset file.
    pub sample_index: usize,
    /// Question identifier.
    pub question_id: String,
    /// Extracted answer with surrounding whitespace trimmed, or the raw
    /// transcript when extraction failed.
    pub pred: String,
    /// Leading characters of the trimmed answer used for matching. The
    /// space after the answer delimiter does not count toward them.
    pub pred_compact: String,
    /// Whether the prediction resolved to the ground-truth option.
    pub correct: bool,
    /// Why the sample could not be scored, if it could not.
    pub error: Option<String>,
    /// The original sample object.
    pub metadata: Map<String, Value>,
}

impl SampleResult {
    /// The JSON record: original fields plus the prediction fields.
    pub fn to_record(&self) -> Value {
        let mut record = self.metadata.clone();
        record.insert("question_id".into(), Value::from(self.question_id.clone()));
        record.insert("sample_index".into(), Value::from(self.sample_index));
        record.insert("pred".into(), Value::from(self.pred.clone()));
        record.insert("pred_compact".into(), Value::from(self.pred_compact.clone()));
        record.insert("correct".into(), Value::from(self.correct));
        if let Some(error) = &self.error {
            record.insert("error".into(), Value::from(error.clone()));
        }
        Value::Object(record)
    }
}

/// The fields read back from a stored result record.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredResult {
    pub question_id: String,
    #[serde(default)]
    pub sample_index: Option<usize>,
    #[serde(deserialize_with = "deserialize_flag")]
    pub correct: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Accept `true`/`false` as well as the `1`/`0` of older records.
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(i) => i != 0,
    })
}

/// Directory of result records for one job.
#[derive(Debug, Clone)]
pub struct ResultStore {
    dir: PathBuf,
}

impl ResultStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the record for a question.
    pub fn path(&self, question_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(question_id)))
    }

    /// Durably write a result record.
    pub fn write(&self, result: &SampleResult) -> Result<()> {
        write_json(&self.path(&result.question_id), &result.to_record())
    }

    /// Read back a stored record, if any.
    pub fn load(&self, question_id: &str) -> Result<Option<StoredResult>> {
        read_json(&self.path(question_id))
    }
}

/// Question ids become filenames; path separators must not escape the dir.
fn file_stem(question_id: &str) -> String {
    question_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Append-only human-readable accuracy log for one job.
#[derive(Debug, Clone)]
pub struct AccuracyLog {
    path: PathBuf,
}

impl AccuracyLog {
    /// Log for a job ordinal, stored as `test_log{ordinal}.txt`.
    pub fn new(dir: &Path, ordinal: usize) -> Self {
        Self {
            path: dir.join(format!("test_log{}.txt", ordinal)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line.
    pub fn write(&self, line: &str) -> Result<()> {
        append_line(&self.path, line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_result(correct: bool) -> SampleResult {
        let mut metadata = Map::new();
        metadata.insert("question_id".into(), Value::from("q/7"));
        metadata.insert("modality".into(), Value::from("CT"));
        metadata.insert("correct".into(), Value::from("stale"));

        SampleResult {
            sample_index: 7,
            question_id: "q/7".to_string(),
            pred: "Pneumonia".to_string(),
            pred_compact: "Pneumo".to_string(),
            correct,
            error: None,
            metadata,
        }
    }

    #[test]
    fn test_record_echoes_metadata() {
        let record = sample_result(true).to_record();

        assert_eq!(record["modality"], "CT");
        assert_eq!(record["pred"], "Pneumonia");
        assert_eq!(record["pred_compact"], "Pneumo");
        assert_eq!(record["correct"], true);
        assert_eq!(record["sample_index"], 7);
        assert!(record.get("error").is_none());
    }

    #[test]
    fn test_write_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path().join("saved_dir/CT/SLAKE"));

        store.write(&sample_result(false)).unwrap();

        let path = store.path("q/7");
        assert_eq!(path.file_name().unwrap(), "q_7.json");
        assert!(path.is_file());

        let stored = store.load("q/7").unwrap().unwrap();
        assert_eq!(stored.question_id, "q/7");
        assert_eq!(stored.sample_index, Some(7));
        assert!(!stored.correct);

        assert!(store.load("other").unwrap().is_none());
    }

    #[test]
    fn test_load_integer_flag() {
        let dir = TempDir::new().unwrap();
        let store = ResultStore::new(dir.path());
        fs::write(
            store.path("legacy"),
            r#"{"question_id": "legacy", "pred": "x", "correct": 1}"#,
        )
        .unwrap();

        let stored = store.load("legacy").unwrap().unwrap();
        assert!(stored.correct);
        assert_eq!(stored.sample_index, None);
    }

    #[test]
    fn test_accuracy_log_appends() {
        let dir = TempDir::new().unwrap();
        let log = AccuracyLog::new(dir.path(), 2);

        log.write("line one").unwrap();
        log.write("line two").unwrap();

        assert!(log.path().ends_with("test_log2.txt"));
        assert_eq!(
            fs::read_to_string(log.path()).unwrap(),
            "line one\nline two\n"
        );
    }
}
