use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use mlc::{InferenceModel, RunContext, run_training};
use mlc_io::Config;

#[derive(Parser)]
#[command(name = "mlc")]
#[command(about = "Imbalanced binary classifier training with calibrated, cost-optimal decisions")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate candidates, calibrate the best, pick a threshold, and write artifacts
    Train {
        /// Path to the YAML run configuration
        #[arg(long)]
        config: PathBuf,
    },

    /// Score a CSV with the artifacts of a previous training run
    Predict {
        /// Path to the YAML run configuration (locates the artifacts)
        #[arg(long)]
        config: PathBuf,

        /// Path to the CSV of rows to score
        #[arg(long)]
        input: PathBuf,

        /// Path of the output CSV (input columns plus proba and label)
        #[arg(long)]
        out: PathBuf,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct PredictOutput {
    artifacts_dir: PathBuf,
    output: PathBuf,
    n_rows: usize,
    n_positive: usize,
    threshold: f64,
}

fn load_config(path: &Path) -> Result<Config> {
    Config::from_path(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    match cli.command {
        Command::Train { config } => {
            let config = load_config(&config)?;
            let ctx = RunContext::new(config.random_state);
            let summary = run_training(&config, &ctx).context("training failed")?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Predict { config, input, out } => {
            let config = load_config(&config)?;
            let ctx = RunContext::new(config.random_state);
            let model = ctx
                .in_scope(|| InferenceModel::load(&config.artifacts_dir))
                .with_context(|| {
                    format!("failed to load artifacts from {}", config.artifacts_dir.display())
                })?;
            let predictions = model
                .predict_file(&input, &out, &ctx)
                .with_context(|| format!("failed to score {}", input.display()))?;

            let output = PredictOutput {
                artifacts_dir: config.artifacts_dir,
                output: out,
                n_rows: predictions.len(),
                n_positive: predictions.iter().filter(|p| p.label == 1).count(),
                threshold: model.threshold(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
