//! The resumable evaluation loop.
//!
//! Jobs run strictly in manifest order, samples strictly in file order, with
//! a single writer for all persisted state. For every sample the result
//! record is written before the job checkpoint, and the checkpoint is the
//! only thing consulted on resume, so the process can be killed at any point.

use crate::checkpoint::{CheckpointStore, JobCheckpoint, ProgressCursor};
use crate::config::EvalConfig;
use crate::dataset::{Job, Sample};
use crate::error::{EvalError, Result};
use crate::model::Model;
use crate::persistence::DirLock;
use crate::resolver::{clean_generation, compact, extract_answer, score};
use crate::results::{AccuracyLog, ResultStore, SampleResult};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// How a job ended in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    /// Finished in an earlier run; not touched.
    Skipped,
    /// All samples are processed.
    Completed,
}

/// Per-job outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub ordinal: usize,
    pub modality: String,
    pub dataset: String,
    pub outcome: JobOutcome,
    /// Samples processed in total, across runs. Zero for skipped jobs.
    pub processed: usize,
    /// Correct predictions in total, across runs.
    pub correct: usize,
    /// Samples scored by the model during this run.
    pub scored_this_run: usize,
    /// Samples recorded with a scoring error during this run.
    pub errors_this_run: usize,
}

impl JobSummary {
    fn skipped(job: &Job) -> Self {
        Self {
            ordinal: job.ordinal,
            modality: job.modality.clone(),
            dataset: job.dataset.clone(),
            outcome: JobOutcome::Skipped,
            processed: 0,
            correct: 0,
            scored_this_run: 0,
            errors_this_run: 0,
        }
    }

    /// Final accuracy of the job (0.0 when nothing was processed).
    pub fn accuracy(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.correct as f64 / self.processed as f64
        }
    }
}

/// Aggregated outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Ordinal the run resumed from.
    pub resumed_from: usize,
    pub jobs: Vec<JobSummary>,
    /// Wall-clock time of the run (seconds).
    pub total_time_secs: f64,
}

impl RunSummary {
    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Evaluation Results ==========");
        println!("Resumed from job: {}", self.resumed_from);
        println!("----------------------------------------");
        for job in &self.jobs {
            match job.outcome {
                JobOutcome::Skipped => {
                    println!(
                        "[{:>3}] {}/{}: skipped (completed earlier)",
                        job.ordinal, job.modality, job.dataset
                    );
                }
                JobOutcome::Completed => {
                    println!(
                        "[{:>3}] {}/{}: {}/{} correct ({:.1}%), {} scored now, {} errors",
                        job.ordinal,
                        job.modality,
                        job.dataset,
                        job.correct,
                        job.processed,
                        job.accuracy() * 100.0,
                        job.scored_this_run,
                        job.errors_this_run
                    );
                }
            }
        }
        println!("----------------------------------------");
        println!("Total time: {:.1}s", self.total_time_secs);
        println!("========================================\n");
    }
}

/// Drives jobs through a model and keeps their progress durable.
pub struct Evaluator<M> {
    model: M,
    config: EvalConfig,
    output_dir: PathBuf,
    checkpoints: CheckpointStore,
    cursor: ProgressCursor,
}

impl<M: Model> Evaluator<M> {
    /// Create an evaluator writing all state under `output_dir`.
    pub fn new(model: M, config: EvalConfig, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            model,
            config,
            checkpoints: CheckpointStore::new(&output_dir),
            cursor: ProgressCursor::new(&output_dir),
            output_dir,
        }
    }

    /// Run every job not completed by an earlier run.
    pub async fn run(&self, jobs: &[Job]) -> Result<RunSummary> {
        let start_time = Instant::now();
        self.config.validate()?;
        let _lock = DirLock::acquire(&self.output_dir)?;

        let resumed_from = self.cursor.load_or_init()?;
        if resumed_from > 0 {
            info!(resumed_from, "resuming run");
        }

        let mut summaries = Vec::with_capacity(jobs.len());
        for job in jobs {
            if job.ordinal < resumed_from {
                debug!(ordinal = job.ordinal, "job completed earlier, skipping");
                summaries.push(JobSummary::skipped(job));
                continue;
            }

            let samples = job.load_samples()?;
            summaries.push(self.run_job(job, &samples).await?);
        }

        Ok(RunSummary {
            resumed_from,
            jobs: summaries,
            total_time_secs: start_time.elapsed().as_secs_f64(),
        })
    }

    /// Run one job from its checkpoint to the end of its samples.
    ///
    /// The caller is responsible for holding the output directory exclusively.
    pub async fn run_job(&self, job: &Job, samples: &[Sample]) -> Result<JobSummary> {
        self.config.validate()?;
        let ordinal = job.ordinal;

        if self.cursor.load_or_init()? != ordinal {
            self.cursor.save(ordinal)?;
        }

        let log = AccuracyLog::new(&self.output_dir, ordinal);
        let results = ResultStore::new(&job.result_dir);

        let header = format!(
            "modality_now: {}, dataset_now: {}",
            job.modality, job.dataset
        );
        info!(ordinal, modality = %job.modality, dataset = %job.dataset, samples = samples.len(), "starting job");
        log.write(&header)?;

        let mut checkpoint = self.checkpoints.load_or_init(ordinal)?;
        if checkpoint.next_sample_index > samples.len() {
            return Err(EvalError::corrupt(
                self.checkpoints.path(ordinal),
                format!(
                    "next_sample_index {} is past the {} samples of '{}'",
                    checkpoint.next_sample_index,
                    samples.len(),
                    job.source.display()
                ),
            ));
        }
        if checkpoint.next_sample_index > 0 {
            info!(
                ordinal,
                next_sample_index = checkpoint.next_sample_index,
                correct_count = checkpoint.correct_count,
                "resuming job"
            );
        }

        let mut scored_this_run = 0;
        let mut errors_this_run = 0;

        for (index, sample) in samples.iter().enumerate().skip(checkpoint.next_sample_index) {
            let correct = match results.load(&sample.question_id)? {
                // Written before a crash that beat the checkpoint save.
                Some(stored) if stored.sample_index == Some(index) => {
                    debug!(index, question_id = %sample.question_id, "adopting stored result");
                    stored.correct
                }
                _ => {
                    let result = self.evaluate_sample(index, sample).await?;
                    results.write(&result)?;
                    scored_this_run += 1;
                    if result.error.is_some() {
                        errors_this_run += 1;
                    }
                    result.correct
                }
            };

            checkpoint = checkpoint.advance(correct);
            self.checkpoints.save(ordinal, &checkpoint)?;

            if checkpoint.next_sample_index % self.config.log_interval == 0 {
                let line = format!(
                    "The accuracy at {} is {}",
                    checkpoint.next_sample_index,
                    checkpoint.accuracy()
                );
                info!(ordinal, "{}", line);
                log.write(&line)?;
            }
        }

        self.finish_job(job, &checkpoint, &log)?;

        Ok(JobSummary {
            ordinal,
            modality: job.modality.clone(),
            dataset: job.dataset.clone(),
            outcome: JobOutcome::Completed,
            processed: checkpoint.next_sample_index,
            correct: checkpoint.correct_count,
            scored_this_run,
            errors_this_run,
        })
    }

    fn finish_job(&self, job: &Job, checkpoint: &JobCheckpoint, log: &AccuracyLog) -> Result<()> {
        let line = format!(
            "The test is end, we test {} samples, the final accuracy is {}",
            checkpoint.next_sample_index,
            checkpoint.accuracy()
        );
        info!(ordinal = job.ordinal, "{}", line);
        log.write(&line)?;

        self.cursor.save(job.ordinal + 1)
    }

    /// Generate and score one sample.
    ///
    /// Scoring failures are folded into the result; model failures are not.
    async fn evaluate_sample(&self, index: usize, sample: &Sample) -> Result<SampleResult> {
        let raw = self
            .model
            .generate(&sample.question_id, &sample.input)
            .await?;
        let cleaned = clean_generation(&raw);

        let (pred, pred_compact, correct, error) = match self.score_generation(&cleaned, sample) {
            Ok((pred, pred_compact, correct)) => (pred, pred_compact, correct, None),
            Err(e) if e.is_recoverable() => {
                warn!(index, question_id = %sample.question_id, error = %e, "sample recorded as incorrect");
                (cleaned, String::new(), false, Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        debug!(index, question_id = %sample.question_id, %pred_compact, correct, "scored sample");

        Ok(SampleResult {
            sample_index: index,
            question_id: sample.question_id.clone(),
            pred,
            pred_compact,
            correct,
            error,
            metadata: sample.metadata.clone(),
        })
    }

    fn score_generation(&self, cleaned: &str, sample: &Sample) -> Result<(String, String, bool)> {
        let answer = extract_answer(cleaned, &self.config.answer_delimiter)?;
        let pred_compact = compact(&answer, self.config.compact_len);
        let correct = score(
            &pred_compact,
            &sample.ground_truth,
            &sample.short_choices,
            &sample.long_choices,
        )?;
        Ok((answer, pred_compact, correct))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelInput;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers from a fixed table and remembers what it was asked.
    struct ScriptedModel {
        answers: HashMap<String, String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(answers: &[(&str, &str)]) -> Self {
            Self {
                answers: answers
                    .iter()
                    .map(|(id, text)| (id.to_string(), text.to_string()))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Model for ScriptedModel {
        async fn generate(&self, question_id: &str, input: &ModelInput) -> Result<String> {
            self.calls.lock().unwrap().push(question_id.to_string());
            match self.answers.get(question_id) {
                Some(answer) => Ok(format!("{} {}", input.prompt, answer)),
                None => Err(EvalError::Model(format!("unavailable for {}", question_id))),
            }
        }
    }

    fn sample(id: &str, ground_truth: &str) -> Sample {
        let long: Vec<String> = ["Pneumonia", "Fracture", "Normal"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let short: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();

        let mut metadata = Map::new();
        metadata.insert("question_id".into(), Value::from(id));

        Sample {
            question_id: id.to_string(),
            input: ModelInput {
                prompt: "Question: finding?\n### Answer:".to_string(),
                images: Vec::new(),
            },
            ground_truth: ground_truth.to_string(),
            short_choices: short,
            long_choices: long,
            metadata,
        }
    }

    fn job(dir: &Path) -> Job {
        Job::new(0, dir.join("X-Ray/Chest/test.json"), dir).unwrap()
    }

    fn config(log_interval: usize) -> EvalConfig {
        EvalConfig {
            log_interval,
            ..EvalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_three_sample_job() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let samples = vec![
            sample("s0", "Pneumonia"),
            sample("s1", "Fracture"),
            sample("s2", "Normal"),
        ];
        let model = ScriptedModel::new(&[("s0", "Pneumonia"), ("s1", "Normal"), ("s2", "Normal")]);

        let evaluator = Evaluator::new(&model, config(100), dir.path());
        let summary = evaluator.run_job(&job, &samples).await.unwrap();

        assert_eq!(summary.processed, 3);
        assert_eq!(summary.correct, 2);
        assert!((summary.accuracy() - 2.0 / 3.0).abs() < 1e-9);

        let results = ResultStore::new(&job.result_dir);
        let flags: Vec<bool> = ["s0", "s1", "s2"]
            .iter()
            .map(|id| results.load(id).unwrap().unwrap().correct)
            .collect();
        assert_eq!(flags, vec![true, false, true]);

        let checkpoint = CheckpointStore::new(dir.path()).load_or_init(0).unwrap();
        assert_eq!(
            checkpoint,
            JobCheckpoint {
                next_sample_index: 3,
                correct_count: 2
            }
        );
        assert_eq!(ProgressCursor::new(dir.path()).load_or_init().unwrap(), 1);

        let log = fs::read_to_string(dir.path().join("test_log0.txt")).unwrap();
        assert!(log.starts_with("modality_now: X-Ray, dataset_now: Chest"));
        assert!(log.contains("we test 3 samples"));
    }

    #[tokio::test]
    async fn test_malformed_generation_is_recorded() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let mut samples = vec![sample("s0", "Normal"), sample("s1", "Normal")];
        samples[0].input.prompt = "no delimiter here".to_string();

        let model = ScriptedModel::new(&[("s0", "Normal"), ("s1", "Normal")]);
        let evaluator = Evaluator::new(&model, config(1), dir.path());
        let summary = evaluator.run_job(&job, &samples).await.unwrap();

        assert_eq!(summary.processed, 2);
        assert_eq!(summary.correct, 1);
        assert_eq!(summary.errors_this_run, 1);

        let record: Value =
            serde_json::from_str(&fs::read_to_string(job.result_dir.join("s0.json")).unwrap())
                .unwrap();
        assert_eq!(record["correct"], false);
        assert_eq!(record["pred_compact"], "");
        assert!(record["error"].as_str().unwrap().contains("Malformed generation"));

        let log = fs::read_to_string(dir.path().join("test_log0.txt")).unwrap();
        assert!(log.contains("The accuracy at 1 is 0"));
        assert!(log.contains("The accuracy at 2 is 0.5"));
    }

    #[tokio::test]
    async fn test_model_failure_is_fatal_and_resumable() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let samples = vec![
            sample("s0", "Normal"),
            sample("s1", "Fracture"),
            sample("s2", "Normal"),
        ];

        // s1 is missing: the run stops there without recording it
        let flaky = ScriptedModel::new(&[("s0", "Normal"), ("s2", "Normal")]);
        let err = Evaluator::new(&flaky, config(100), dir.path())
            .run_job(&job, &samples)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::Model(_)));

        let checkpoints = CheckpointStore::new(dir.path());
        assert_eq!(checkpoints.load_or_init(0).unwrap().next_sample_index, 1);
        assert!(!job.result_dir.join("s1.json").exists());

        let model = ScriptedModel::new(&[("s0", "Normal"), ("s1", "Fracture"), ("s2", "Normal")]);
        let summary = Evaluator::new(&model, config(100), dir.path())
            .run_job(&job, &samples)
            .await
            .unwrap();

        assert_eq!(model.calls(), vec!["s1", "s2"]);
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.correct, 3);
        assert_eq!(summary.scored_this_run, 2);
    }

    #[tokio::test]
    async fn test_adopts_result_written_before_checkpoint() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let samples = vec![sample("s0", "Normal"), sample("s1", "Fracture")];

        // Simulate a crash between result write and checkpoint save for s0.
        let results = ResultStore::new(&job.result_dir);
        results
            .write(&SampleResult {
                sample_index: 0,
                question_id: "s0".to_string(),
                pred: "Normal".to_string(),
                pred_compact: "Normal".to_string(),
                correct: true,
                error: None,
                metadata: Map::new(),
            })
            .unwrap();

        let model = ScriptedModel::new(&[("s0", "Fracture"), ("s1", "Fracture")]);
        let summary = Evaluator::new(&model, config(100), dir.path())
            .run_job(&job, &samples)
            .await
            .unwrap();

        assert_eq!(model.calls(), vec!["s1"]);
        assert_eq!(summary.correct, 2);
        assert_eq!(summary.scored_this_run, 1);
    }

    #[tokio::test]
    async fn test_checkpoint_past_end_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        CheckpointStore::new(dir.path())
            .save(
                0,
                &JobCheckpoint {
                    next_sample_index: 5,
                    correct_count: 1,
                },
            )
            .unwrap();

        let model = ScriptedModel::new(&[]);
        let err = Evaluator::new(&model, config(100), dir.path())
            .run_job(&job, &[sample("s0", "Normal")])
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::CorruptCheckpoint { .. }));
    }

    #[tokio::test]
    async fn test_empty_job_completes() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let model = ScriptedModel::new(&[]);

        let summary = Evaluator::new(&model, config(100), dir.path())
            .run_job(&job, &[])
            .await
            .unwrap();

        assert_eq!(summary.processed, 0);
        assert_eq!(summary.accuracy(), 0.0);
        assert_eq!(ProgressCursor::new(dir.path()).load_or_init().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zero_log_interval_is_rejected() {
        let dir = TempDir::new().unwrap();
        let job = job(dir.path());
        let samples = vec![sample("s0", "Normal"), sample("s1", "Normal")];
        let model = ScriptedModel::new(&[("s0", "Normal"), ("s1", "Normal")]);

        let evaluator = Evaluator::new(&model, config(0), dir.path());
        let err = evaluator.run_job(&job, &samples).await.unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));

        let err = evaluator.run(std::slice::from_ref(&job)).await.unwrap_err();
        assert!(matches!(err, EvalError::Config(_)));

        assert!(model.calls().is_empty());
        assert!(!CheckpointStore::new(dir.path()).exists(0));
    }
}
