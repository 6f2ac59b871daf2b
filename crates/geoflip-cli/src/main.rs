//! Command-line interface for `Geoflip`, an asynchronous geospatial transformation pipeline.
//!
//! This binary drives the [`geoflip_core`] job pipeline in-process: it starts a
//! job orchestrator, submits a request, polls the job until it finishes and
//! delivers the result.
//!
//! # Architecture
//!
//! The CLI is built using [`clap`] for argument parsing and [`tracing`] for structured logging.
//! Library crates log through the `log` facade, which is bridged into `tracing`.
//!
//! # Available Commands
//!
//! - `transform` - Run a transformation request as a job
//! - `info` - Display dataset information and metadata
//! - `drivers` - List all available format drivers and their capabilities

mod display;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tabled::Table;
use tracing::{Level, info};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use geoflip_core::config::{DATA_PATH_ENV, JOB_EXPIRY_ENV, WORKERS_ENV};
use geoflip_core::drivers::get_available_drivers;
use geoflip_core::jobs::cleanup_job;
use geoflip_core::{
    GeoflipConfig, GeoflipError, JobId, JobOrchestrator, JobOutput, PipelineContext, TransformRequest, Upload,
    operations,
};

use crate::display::{DriverRow, display_dataset_info};

#[derive(Parser)]
#[command(
    name = "geoflip",
    version,
    about = "Asynchronous geospatial transformations in Rust",
    long_about = "Geoflip reads GeoJSON, zipped Shapefiles, DXF or WKT CSV, applies buffer and\n\
                  union transformations, reprojects and writes the result in any of those formats."
)]
/// Command-line arguments and options for the `Geoflip` CLI.
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `Geoflip` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Runs a transformation request as a job and delivers its result.
    ///
    /// File results are written into the output directory; inline results are
    /// printed to standard output.
    Transform {
        /// Path to the JSON request (`input`, `transformations`, `output`).
        #[arg(short, long, value_name = "REQUEST")]
        config: PathBuf,

        /// Input file to upload with the request.
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,

        /// Directory file results are copied into.
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        out_dir: PathBuf,

        /// Root directory for job artifacts (defaults to a directory under the system temp dir).
        #[arg(long, value_name = "DIR", env = DATA_PATH_ENV)]
        data_path: Option<PathBuf>,

        /// Seconds a job's result and artifacts are kept.
        #[arg(
            long,
            value_name = "SECS",
            env = JOB_EXPIRY_ENV,
            default_value_t = 3600,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        expiry_secs: u64,

        /// Number of worker tasks.
        #[arg(long, value_name = "N", env = WORKERS_ENV)]
        workers: Option<usize>,

        /// Status polling interval in milliseconds.
        #[arg(long, value_name = "MS", default_value_t = 100)]
        poll_ms: u64,
    },

    /// Displays information about a vector geospatial dataset.
    Info {
        /// Path to the input geospatial dataset.
        #[arg(value_name = "DATASET")]
        input: PathBuf,

        /// Driver used to read the dataset (e.g., "geojson", "shp").
        #[arg(short, long, value_name = "DRIVER")]
        format: String,

        /// EPSG code of the dataset; required for CSV and DXF.
        #[arg(long, value_name = "CODE")]
        epsg: Option<u32>,

        /// WKT geometry column for CSV input.
        #[arg(long, value_name = "NAME")]
        geometry_column: Option<String>,
    },

    /// Lists all available geospatial drivers and their capabilities.
    Drivers,
}

/// Entry point for the `Geoflip` command-line interface.
///
/// # Errors
///
/// Returns an error if command execution fails or if the logging system cannot be initialized.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Transform {
            config,
            input,
            out_dir,
            data_path,
            expiry_secs,
            workers,
            poll_ms,
        } => {
            let data_path = data_path.unwrap_or_else(|| std::env::temp_dir().join("geoflip"));
            let mut settings =
                GeoflipConfig::new(data_path).with_job_expiry(Duration::from_secs(expiry_secs));
            if let Some(workers) = workers {
                settings = settings.with_workers(workers);
            }
            handle_transform(
                &config,
                input.as_deref(),
                &out_dir,
                settings,
                Duration::from_millis(poll_ms),
            )
            .await?;
        },
        Commands::Info {
            input,
            format,
            epsg,
            geometry_column,
        } => {
            info!("Displaying info for {}", input.display());
            handle_info(&input, &format, epsg, geometry_column)?;
        },
        Commands::Drivers => {
            handle_drivers();
        },
    }

    Ok(())
}

/// Turn a pipeline error into a CLI error carrying its recovery hint.
fn report(err: GeoflipError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow!("{}\n\nHint: {hint}", err.user_message()),
        None => anyhow!(err.user_message()),
    }
}

async fn handle_transform(
    request_path: &Path,
    input: Option<&Path>,
    out_dir: &Path,
    config: GeoflipConfig,
    poll_interval: Duration,
) -> Result<()> {
    let text = tokio::fs::read_to_string(request_path)
        .await
        .with_context(|| format!("Failed to read request file {}", request_path.display()))?;
    let request = TransformRequest::from_json(&text).map_err(report)?;

    let mut uploads = Vec::new();
    if let Some(path) = input {
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read input file {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        uploads.push(Upload::new(file_name, data));
    }

    let data_path = config.data_path.clone();
    let orchestrator = JobOrchestrator::start(PipelineContext::new(config));
    let outcome = run_to_completion(&orchestrator, request, uploads, out_dir, poll_interval).await;
    if let Ok(job_id) | Err((Some(job_id), _)) = &outcome {
        cleanup_job(&data_path, job_id);
    }
    orchestrator.shutdown().await;
    outcome.map(|_| ()).map_err(|(_, err)| err)
}

async fn run_to_completion(
    orchestrator: &JobOrchestrator,
    request: TransformRequest,
    uploads: Vec<Upload>,
    out_dir: &Path,
    poll_interval: Duration,
) -> std::result::Result<JobId, (Option<JobId>, anyhow::Error)> {
    let receipt = orchestrator
        .submit(request, uploads)
        .await
        .map_err(|err| (None, report(err)))?;
    let job_id = receipt.job_id;
    info!("Job {job_id}: {}", receipt.message);

    let status = orchestrator
        .wait_for_terminal(&job_id, poll_interval)
        .await
        .map_err(|err| (Some(job_id), report(err)))?;
    if let Some(detail) = status.error {
        return Err((Some(job_id), anyhow!("Job {job_id} failed: {detail}")));
    }

    let output = orchestrator
        .result(&job_id)
        .await
        .map_err(|err| (Some(job_id), report(err)))?;
    deliver(output, out_dir).map_err(|err| (Some(job_id), err))?;
    Ok(job_id)
}

fn deliver(output: JobOutput, out_dir: &Path) -> Result<()> {
    match output {
        JobOutput::File { file_name, bytes, .. } => {
            std::fs::create_dir_all(out_dir)
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;
            let target = out_dir.join(file_name);
            std::fs::write(&target, &bytes)
                .with_context(|| format!("Failed to write {}", target.display()))?;
            info!("Wrote {} bytes to {}", bytes.len(), target.display());
            println!("{}", target.display());
        },
        JobOutput::Inline(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
        },
    }
    Ok(())
}

fn handle_info(
    input: &Path,
    format: &str,
    epsg: Option<u32>,
    geometry_column: Option<String>,
) -> Result<()> {
    let info = operations::describe(input, format, epsg, geometry_column).map_err(report)?;
    display_dataset_info(&info);
    Ok(())
}

/// Handles the `drivers` subcommand by displaying a formatted table of available drivers.
///
/// Lists every driver that is supported or planned for reading or writing.
fn handle_drivers() {
    let drivers = get_available_drivers();

    println!("\nAvailable Drivers ({} total):\n", drivers.len());

    let rows: Vec<DriverRow> = drivers.iter().map(DriverRow::from).collect();
    let table = Table::new(rows).to_string();
    println!("{table}");
}
