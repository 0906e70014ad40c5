//! `anclora-watch` -- submit a document for ingestion and follow the job.
//!
//! Uploads one file, then tracks the resulting job over the push
//! channel (or by polling with `--poll`) and logs every status change.
//! Exits `0` when the document was ingested and `1` otherwise. Ctrl-C
//! stops tracking.
//!
//! Connection settings come from the environment (a `.env` file is
//! honoured); see `ClientConfig::from_env` for the variables.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anclora_client::client::ClientError;
use anclora_client::config::ClientConfig;
use anclora_client::manager::IngestManager;
use anclora_client::observer::{JobFailure, JobObserver};
use anclora_client::tracker::{Finalization, TransportPreference};
use anclora_core::job_status::{IngestResult, StatusEvent};
use anclora_core::upload::UploadRequest;
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "anclora-watch", version, about = "Ingest a document and watch the job")]
struct Args {
    /// Document to ingest (PDF, DOCX, Markdown or plain text).
    file: PathBuf,

    /// Poll for status instead of opening the push channel.
    #[arg(long)]
    poll: bool,

    /// Override the MIME type inferred from the file extension.
    #[arg(long, value_name = "MIME")]
    content_type: Option<String>,
}

/// Logs job lifecycle callbacks.
struct ConsoleObserver;

impl JobObserver for ConsoleObserver {
    fn on_connected(&self) {
        tracing::info!("Push channel connected");
    }

    fn on_progress(&self, event: &StatusEvent) {
        tracing::info!(job_id = %event.job_id, status = %event.status.summary(), "Progress");
    }

    fn on_transport_error(&self, error: &ClientError) {
        tracing::warn!(error = %error, "Transport problem, still tracking");
    }

    fn on_cancelled(&self) {
        tracing::info!("Tracking cancelled");
    }

    fn on_success(&self, result: &IngestResult) {
        tracing::info!(source = %result.source, chunks = result.chunks, "Document ingested");
    }

    fn on_failure(&self, failure: &JobFailure) {
        tracing::error!(code = failure.code(), "{}", failure.message());
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anclora_watch=info,anclora_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ClientConfig::from_env().context("Invalid client configuration")?;
    let manager = IngestManager::from_config(&config).context("Failed to build HTTP client")?;

    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .context("Path has no file name")?;
    let upload = UploadRequest::new(file_name, args.content_type, bytes)?;

    let preference = if args.poll {
        TransportPreference::Poll
    } else {
        TransportPreference::Push
    };

    tracing::info!(
        file = %args.file.display(),
        api_url = %config.api_url,
        transport = ?preference,
        "Starting anclora-watch",
    );

    let tracker = manager.tracker(Arc::new(ConsoleObserver));
    let submission = manager.submit(&upload).await;
    tracker.follow(submission, preference)?;

    let outcome = tokio::select! {
        outcome = tracker.wait() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            tracker.cancel();
            tracker.wait().await
        }
    };

    Ok(match outcome {
        Finalization::Succeeded(_) => ExitCode::SUCCESS,
        Finalization::Failed(_) | Finalization::Cancelled => ExitCode::FAILURE,
    })
}
