//! MCQ Eval CLI
//!
//! Resumable multiple-choice evaluation of a multimodal model.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcq_eval::{
    config::Config,
    dataset::load_manifest,
    llm::LlmClient,
    model::{Model, ReplayModel},
    report::{aggregate, progress},
    runner::Evaluator,
};
use std::path::{Path, PathBuf};

/// MCQ Eval - resumable multiple-choice evaluation harness
#[derive(Parser)]
#[command(name = "mcq-eval")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate every job in a manifest, resuming from earlier progress
    Run {
        /// Directory for checkpoints, logs and result records
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// JSON array of dataset files to evaluate, in order
        #[arg(short, long)]
        manifest: PathBuf,

        /// Re-score recorded generations (JSONL) instead of calling the model
        #[arg(long)]
        replay: Option<PathBuf>,

        /// Override the running-accuracy interval
        #[arg(long)]
        log_interval: Option<usize>,

        /// Save the run summary to a JSON file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Show the cursor and per-job checkpoints
    Status {
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        #[arg(short, long)]
        manifest: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recount accuracy from the result records on disk
    Report {
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Test the model endpoint connection
    Test,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Run {
            output_dir,
            manifest,
            replay,
            log_interval,
            summary,
        } => {
            cmd_run(
                config_path,
                output_dir,
                manifest,
                replay,
                log_interval,
                summary,
            )
            .await
        }
        Commands::Status {
            output_dir,
            manifest,
            json,
        } => cmd_status(output_dir, manifest, json),
        Commands::Report { output_dir, json } => cmd_report(output_dir, json),
        Commands::Test => cmd_test(config_path).await,
    }
}

async fn cmd_run(
    config_path: Option<&Path>,
    output_dir: PathBuf,
    manifest: PathBuf,
    replay: Option<PathBuf>,
    log_interval: Option<usize>,
    summary_path: Option<PathBuf>,
) -> Result<()> {
    let mut config = Config::load(config_path).context("Failed to load configuration")?;
    if let Some(interval) = log_interval {
        config.eval.log_interval = interval;
    }
    config.validate().context("Invalid configuration")?;

    let jobs = load_manifest(&manifest, &output_dir).context("Failed to load manifest")?;
    println!("Manifest: {} jobs", jobs.len());
    println!("Output:   {}", output_dir.display());

    let summary = match replay {
        Some(path) => {
            let model = ReplayModel::from_jsonl(&path).context("Failed to load generations")?;
            println!("Replaying {} recorded generations", model.len());
            run_with(model, &config, &output_dir, &jobs).await?
        }
        None => {
            config.validate_model().context("Invalid model configuration")?;
            println!("Using model: {}", config.model.model);
            let model = LlmClient::new(config.model.clone());
            run_with(model, &config, &output_dir, &jobs).await?
        }
    };

    summary.print_summary();

    if let Some(path) = summary_path {
        let json = serde_json::to_string_pretty(&summary)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write summary to {}", path.display()))?;
        println!("Summary saved to {}", path.display());
    }

    Ok(())
}

async fn run_with<M: Model>(
    model: M,
    config: &Config,
    output_dir: &Path,
    jobs: &[mcq_eval::Job],
) -> Result<mcq_eval::RunSummary> {
    let evaluator = Evaluator::new(model, config.eval.clone(), output_dir);
    evaluator.run(jobs).await.context("Evaluation aborted")
}

fn cmd_status(output_dir: PathBuf, manifest: PathBuf, json: bool) -> Result<()> {
    let jobs = load_manifest(&manifest, &output_dir).context("Failed to load manifest")?;
    let report = progress(&output_dir, &jobs).context("Failed to read progress")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }

    Ok(())
}

fn cmd_report(output_dir: PathBuf, json: bool) -> Result<()> {
    let tallies = aggregate(&output_dir).context("Failed to read result records")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tallies)?);
        return Ok(());
    }

    if tallies.is_empty() {
        println!("No result records under {}", output_dir.display());
        return Ok(());
    }

    println!("Results by dataset");
    println!("{}", "─".repeat(60));
    for tally in &tallies {
        println!(
            "  {}/{}: {}/{} correct ({:.1}%), {} errors",
            tally.modality,
            tally.dataset,
            tally.correct,
            tally.records,
            tally.accuracy() * 100.0,
            tally.errors
        );
    }

    Ok(())
}

async fn cmd_test(config_path: Option<&Path>) -> Result<()> {
    println!("Testing model connection...\n");

    let config = Config::load(config_path).context("Failed to load configuration")?;

    println!("Configuration:");
    println!("  API Base:  {}", config.model.api_base);
    println!("  Model:     {}", config.model.model);
    println!(
        "  API Key:   {}...",
        config.model.api_key.chars().take(8).collect::<String>()
    );
    println!();

    config
        .validate_model()
        .context("Invalid model configuration")?;

    let client = LlmClient::new(config.model);

    println!("Sending test request...");
    client
        .test_connection()
        .await
        .context("Connection failed")?;
    println!("Connection successful!");

    Ok(())
}
