use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use upload_scheduler::config::{BlockingFailureScan, ProcessorConfig};
use upload_scheduler::processor::{JobProcessor, RunOutcome};
use upload_scheduler::scheduler::Job;
use upload_scheduler::upload::{collect_jobs, LocalUploader, UploadEntry};

#[derive(Parser, Debug)]
#[command(name = "upload-scheduler")]
#[command(version)]
#[command(about = "Upload a directory tree with bounded concurrency")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Upload a file or directory tree into a destination directory
    Upload(UploadArgs),
}

// =============================================================================
// Upload Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct UploadArgs {
    /// File or directory to upload
    source: PathBuf,

    /// Destination directory
    destination: PathBuf,

    /// Maximum number of jobs running at once
    #[arg(long, default_value = "4")]
    max_parallel: usize,

    /// Stop dispatching once this many jobs failed
    #[arg(long, default_value = "10")]
    max_failed: usize,

    /// Scheduler tick period in milliseconds
    #[arg(long, default_value = "500")]
    tick_ms: u64,

    /// Keep going after a directory fails to upload
    #[arg(long)]
    continue_on_blocking_error: bool,

    /// Which failed directories stop the run
    #[arg(long, default_value = "any")]
    blocking_scan: ScanArg,

    /// Retry failed jobs up to this many times
    #[arg(long, default_value = "0")]
    retries: u32,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum ScanArg {
    /// Any failed directory stops the run
    Any,
    /// Only a directory that was the most recent failure stops the run
    MostRecent,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

impl UploadArgs {
    fn processor_config(&self) -> ProcessorConfig {
        let scan = match self.blocking_scan {
            ScanArg::Any => BlockingFailureScan::AnyBlocking,
            ScanArg::MostRecent => BlockingFailureScan::MostRecent,
        };
        ProcessorConfig::default()
            .with_max_parallel_jobs(self.max_parallel)
            .with_max_failed_jobs(self.max_failed)
            .with_tick_interval(Duration::from_millis(self.tick_ms))
            .with_fail_on_blocking_error(!self.continue_on_blocking_error)
            .with_blocking_failure_scan(scan)
    }
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct FailedJobOutput {
    path: String,
    class: String,
    attempts: u32,
    error: String,
}

#[derive(Serialize)]
struct UploadSummaryOutput {
    source: String,
    destination: String,
    #[serde(flatten)]
    outcome: RunOutcome,
    retries_used: u32,
    failures: Vec<FailedJobOutput>,
}

fn failed_job_output(job: &Job<UploadEntry>) -> FailedJobOutput {
    FailedJobOutput {
        path: job.payload.relative_path.display().to_string(),
        class: job.class.to_string(),
        attempts: job.attempts,
        error: job
            .error
            .as_ref()
            .map(|e| {
                if e.full_message.is_empty() {
                    e.to_string()
                } else {
                    format!("{} ({})", e, e.full_message)
                }
            })
            .unwrap_or_default(),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_upload(args: UploadArgs) -> Result<bool, Box<dyn std::error::Error>> {
    let config = args.processor_config();
    let jobs = collect_jobs(&args.source).await?;

    tracing::info!(
        source = %args.source.display(),
        destination = %args.destination.display(),
        jobs = jobs.len(),
        max_parallel = config.max_parallel_jobs,
        max_failed = config.max_failed_jobs,
        "Starting upload"
    );

    tokio::fs::create_dir_all(&args.destination).await?;
    let uploader = Arc::new(LocalUploader::new(&args.destination));
    let processor = JobProcessor::builder(uploader.blocking_work(), uploader.non_blocking_work())
        .config(config)
        .before_start(|jobs| tracing::debug!(jobs = jobs.len(), "Upload queued"))
        .on_cleanup(|| tracing::debug!("Upload state reset"))
        .build()?;

    let mut outcome = processor.start(Some(jobs)).await?;
    let mut retries_used = 0;
    while outcome.failed > 0 && retries_used < args.retries {
        retries_used += 1;
        tracing::info!(attempt = retries_used, failed = outcome.failed, "Retrying failed jobs");
        outcome = processor.retry().await?;
    }

    let failures: Vec<FailedJobOutput> = processor
        .failed_jobs()
        .iter()
        .map(failed_job_output)
        .collect();

    match args.output {
        OutputFormat::Json => {
            let output = UploadSummaryOutput {
                source: args.source.display().to_string(),
                destination: args.destination.display().to_string(),
                outcome,
                retries_used,
                failures,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Upload {}", outcome.reason);
            println!("  Completed: {}", outcome.completed);
            println!("  Failed:    {}", outcome.failed);
            println!("  Skipped:   {}", outcome.pending);
            if retries_used > 0 {
                println!("  Retries:   {}", retries_used);
            }
            if !failures.is_empty() {
                println!();
                println!("{:<50} {:<14} {:<8} ERROR", "PATH", "CLASS", "ATTEMPTS");
                for failure in &failures {
                    println!(
                        "{:<50} {:<14} {:<8} {}",
                        failure.path, failure.class, failure.attempts, failure.error
                    );
                }
            }
        }
    }

    Ok(outcome.is_success())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let success = match args.command {
        Commands::Upload(upload_args) => run_upload(upload_args).await?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
