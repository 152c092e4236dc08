//! `podflow` -- runs the podcast pipeline over one transcript and writes the
//! fact-checked analysis to a timestamped markdown file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use podflow::backend::{GeminiBackend, GeminiConfig};
use podflow::cancellation::CancellationToken;
use podflow::config::{EnvFile, Settings};
use podflow::events::LoggingEventSink;
use podflow::observability::init_tracing;
use podflow::pipeline::{ExecutionStrategy, PipelineOrchestrator, PipelineResult};

/// Podcast transcript analysis pipeline.
#[derive(Parser, Debug)]
#[command(name = "podflow", about = "Summarize, extract insights from and fact-check a podcast transcript", version)]
struct Cli {
    /// Path to the transcript JSON file.
    #[arg(long, default_value = "data/input/ep001_remote_work.json")]
    input_dataset: PathBuf,

    /// Directory receiving the markdown output.
    #[arg(long, default_value = "data/output")]
    output_folder: PathBuf,

    /// Run stages one at a time instead of concurrently.
    #[arg(long)]
    sequential: bool,

    /// Enable verbose (debug-level) logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    json_logs: bool,

    /// Env file with model settings. Defaults to the nearest `.env`.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

impl Cli {
    fn env(&self) -> Result<EnvFile> {
        EnvFile::load(self.env_file.as_deref()).context("failed to load env file")
    }

    fn settings(&self, env: &EnvFile) -> Result<Settings> {
        let mut settings =
            Settings::from_lookup(|key| env.get(key)).context("failed to load pipeline settings")?;
        if self.sequential {
            settings.execution = ExecutionStrategy::Sequential;
        }
        if self.verbose {
            settings.logging.level = "debug".to_string();
        }
        if self.json_logs {
            settings.logging.json = true;
        }
        Ok(settings)
    }
}

fn output_path(folder: &Path, result: &PipelineResult) -> PathBuf {
    folder.join(format!("pipeline_output_{}.md", result.timestamp_label()))
}

fn write_output(folder: &Path, result: &PipelineResult) -> Result<PathBuf> {
    std::fs::create_dir_all(folder)
        .with_context(|| format!("failed to create output folder {}", folder.display()))?;
    let path = output_path(folder, result);
    std::fs::write(&path, &result.text)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let env = cli.env()?;
    let settings = cli.settings(&env)?;
    init_tracing(&settings.logging);

    let config = GeminiConfig::from_lookup(|key| env.get(key))
        .context("failed to load model backend settings")?;
    let backend = Arc::new(GeminiBackend::new(config));
    let orchestrator = PipelineOrchestrator::new(settings, backend)
        .with_event_sink(Arc::new(LoggingEventSink::debug()));

    let cancel = Arc::new(CancellationToken::new());
    let interrupt = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            interrupt.cancel("interrupted");
        }
    });

    let result = orchestrator
        .run_with_cancellation(&cli.input_dataset, &cancel)
        .await
        .with_context(|| format!("pipeline run failed for {}", cli.input_dataset.display()))?;

    if result.is_empty() {
        warn!(run_id = %result.run_id, "Pipeline produced no text");
    }

    let path = write_output(&cli.output_folder, &result)?;
    info!(path = %path.display(), "Pipeline output saved");
    Ok(())
}
