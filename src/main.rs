use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use printlog::config::{AppConfig, DEFAULT_CONFIG_PATH, MirrorType};
use printlog::core::{Orchestrator, RunSummary};
use printlog::devices::{self, HttpTransport, PrinterTransport, SimulatedFleet};
use printlog::sink::{CsvLog, MirrorOutcome, SaveOutcome};
use printlog::{context, logging};
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "printlog")]
#[command(about = "Collects 3D printer job history into a durable log", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Sweep every printer once and record new jobs
    Collect(CollectArgs),
    /// Summarize the job log
    Status,
}

#[derive(Args, Serialize)]
struct CollectArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    printers_file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    log_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    sheet_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    credentials_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    mirror: Option<MirrorType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    max_retries: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    retry_backoff: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    request_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    page_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    remote_batch_size: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    mirror_pacing_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    timezone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    json_logs: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    simulation: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.command {
        Commands::Collect(args) => AppConfig::new(&cli.config, Some(args))?,
        Commands::Status => AppConfig::new(&cli.config, None::<&CollectArgs>)?,
    };
    logging::init(logging::LogConfig::from(&config));

    match &cli.command {
        Commands::Collect(_) => run_collect(config)
            .await
            .context("Failed to collect print jobs")?,
        Commands::Status => run_status(&config)
            .await
            .context("Failed to read job log")?,
    }

    Ok(())
}

async fn run_collect(mut config: AppConfig) -> Result<()> {
    let addresses = devices::load_printer_addresses(&config.printers_file)?;
    info!(count = addresses.len(), "Loaded printers");

    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;

    let transport: Arc<dyn PrinterTransport> = if config.simulation {
        info!("Simulation mode: serving a demo fleet, mirroring disabled");
        config.mirror = MirrorType::None;
        Arc::new(SimulatedFleet::demo(&addresses))
    } else {
        Arc::new(HttpTransport::new(client.clone(), config.retry_policy()))
    };

    let ctx = context::AppContext::new(config, client, transport);
    let summary = Orchestrator::new(&ctx, &addresses)?.run().await?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Swept {} printer(s): {} history entries, {} new, {} already recorded",
        summary.printers, summary.entries_seen, summary.new_records, summary.duplicates
    );
    match &summary.outcome {
        SaveOutcome::Nothing => println!("Nothing to save"),
        SaveOutcome::Persisted { written, mirror } => {
            println!("Appended {} job(s) to the log", written);
            match mirror {
                MirrorOutcome::Mirrored { batches } => {
                    println!("Mirrored to spreadsheet in {} batch(es)", batches)
                }
                MirrorOutcome::Disabled => println!("Spreadsheet mirror disabled"),
                MirrorOutcome::Failed {
                    batches_sent,
                    error,
                } => println!(
                    "Spreadsheet mirror failed after {} batch(es): {}",
                    batches_sent, error
                ),
            }
        }
    }
}

async fn run_status(config: &AppConfig) -> Result<()> {
    let log = CsvLog::new(config.log_path.clone());
    let summary = log.summary().await?;

    println!("Job log: {}", log.path().display());
    println!("Recorded jobs: {}", summary.total);
    for (printer, count) in &summary.per_printer {
        println!("  {:<32} {}", printer, count);
    }
    Ok(())
}
