//! Pictor CLI: run uploads through the image pipeline from the command line.
//!
//! Configuration comes from the environment (and `.env`), see `PipelineConfig`.

use anyhow::Context;
use clap::{Parser, Subcommand};
use pictor_cli::{
    claimed_content_type, claimed_filename, ensure_within_upload_limit, init_tracing,
};
use pictor_core::{PipelineConfig, PipelineResult, PipelineStatus, UploadRequest};
use pictor_processing::{
    ConcurrencyGovernor, DimensionGuard, FormatSniffer, GovernorConfig, ImagePipeline,
};
use pictor_services::ClamAVScanner;
use pictor_storage::LocalStorage;
use pictor_worker::{UploadJobQueue, UploadQueueConfig};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "pictor", about = "Image ingestion and variant generation")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, scan, sanitize and render every configured variant of an image
    Process {
        /// Image files to process
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Directory the variants are written to
        #[arg(long, default_value = "./variants")]
        out: PathBuf,
        /// Base URL the output directory is served from
        #[arg(long, default_value = "http://localhost:3000/variants")]
        base_url: String,
        /// Uploader identity recorded in audit logs
        #[arg(long, default_value = "cli")]
        uploader: String,
    },
    /// Sniff the format and check size limits without decoding or scanning
    Check {
        /// Image file to check
        file: PathBuf,
    },
    /// Print the configured variant table
    Variants,
}

#[derive(Serialize)]
struct CheckReport {
    format: String,
    mime_type: &'static str,
    width: u32,
    height: u32,
    pixels: u64,
    bytes: usize,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = PipelineConfig::from_env().context("Failed to load pipeline configuration")?;

    match cli.command {
        Commands::Process {
            files,
            out,
            base_url,
            uploader,
        } => {
            let failed = process(&config, files, out, base_url, uploader).await?;
            if failed > 0 {
                std::process::exit(1);
            }
        }
        Commands::Check { file } => {
            ensure_within_upload_limit(file_len(&file).await?, config.max_file_size_bytes)?;
            let data = tokio::fs::read(&file)
                .await
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let format = FormatSniffer::sniff(&data)?;
            let image = DimensionGuard::from_config(&config).check(&data, format)?;
            print_json(&CheckReport {
                format: format.to_string(),
                mime_type: format.mime_type(),
                width: image.width(),
                height: image.height(),
                pixels: image.pixel_count(),
                bytes: image.byte_size(),
            })?;
        }
        Commands::Variants => {
            print_json(&config.variants)?;
        }
    }

    Ok(())
}

async fn file_len(path: &Path) -> anyhow::Result<u64> {
    let metadata = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    Ok(metadata.len())
}

/// Returns the number of uploads that did not succeed.
async fn process(
    config: &PipelineConfig,
    files: Vec<PathBuf>,
    out: PathBuf,
    base_url: String,
    uploader: String,
) -> anyhow::Result<usize> {
    let governor = ConcurrencyGovernor::start(GovernorConfig::from_pipeline_config(config));
    let scanner = Arc::new(ClamAVScanner::from_config(config));
    let storage = Arc::new(
        LocalStorage::new(&out, base_url)
            .await
            .context("Failed to initialize local storage")?,
    );
    let pipeline = Arc::new(ImagePipeline::new(config, governor.clone(), scanner));
    let queue = UploadJobQueue::new(
        pipeline,
        storage,
        UploadQueueConfig::from_pipeline_config(config),
    );

    let mut failed = 0;
    let mut handles = Vec::with_capacity(files.len());
    for file in &files {
        let len = file_len(file).await?;
        if let Err(error) = ensure_within_upload_limit(len, config.max_file_size_bytes) {
            tracing::warn!(file = %file.display(), bytes = len, "Upload over size limit, not read");
            print_json(&PipelineResult::from_error(Uuid::new_v4(), &error))?;
            failed += 1;
            continue;
        }
        let data = tokio::fs::read(file)
            .await
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let request = UploadRequest::new(
            data,
            claimed_filename(file),
            claimed_content_type(file),
            uploader.clone(),
        );
        tracing::info!(upload_id = %request.id, file = %file.display(), "Submitting upload");
        handles.push(queue.submit_async(request).await?);
    }

    for handle in handles {
        let outcome = handle.wait().await?;
        if outcome.status() != PipelineStatus::Success {
            failed += 1;
        }
        print_json(&outcome)?;
    }

    queue.shutdown();
    governor.shutdown().await;
    Ok(failed)
}
