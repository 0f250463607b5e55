//! CLI entry point for the batchfetch tool.

use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use batchfetch_core::{
    CommandTransport, Dispatcher, DownloadStats, HttpTransport, ItemDownloader, OutputLayout,
    ResultSink, ResumePolicy, RetryPolicy, Transport, default_concurrency, discover_manifests,
};
use clap::Parser;
use tracing::{debug, info, warn};

mod cli;
mod progress;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let manifests = discover_manifests(&args.input)
        .with_context(|| format!("cannot list manifests in {}", args.input.display()))?;
    if manifests.is_empty() {
        info!(input = %args.input.display(), "No manifest CSV files found");
        return Ok(());
    }
    info!(manifests = manifests.len(), input = %args.input.display(), "Discovered manifests");

    let layout = OutputLayout::new(&args.output);
    layout
        .ensure_dirs()
        .await
        .with_context(|| format!("cannot create output layout in {}", args.output.display()))?;

    let primary = HttpTransport::with_connect_timeout(args.connect_timeout.map(Duration::from_secs))
        .context("failed to build HTTP client")?;
    let fallback: Option<Arc<dyn Transport>> = if args.no_fallback {
        debug!("fallback transport disabled");
        None
    } else {
        Some(Arc::new(CommandTransport::new(
            args.fallback_program.clone(),
            Duration::from_secs(args.fallback_timeout),
        )))
    };

    let resume = if args.refetch {
        ResumePolicy::Refetch
    } else {
        ResumePolicy::SkipExisting
    };
    let stats = Arc::new(DownloadStats::new());
    let downloader = ItemDownloader::new(Arc::new(primary), fallback)
        .with_retry_policy(RetryPolicy::new(
            u32::from(args.max_attempts),
            Duration::from_millis(args.backoff_ms),
        ))
        .with_resume_policy(resume)
        .with_pacing(Duration::from_millis(args.pacing_ms))
        .with_stats(Arc::clone(&stats));

    let concurrency = match args.concurrency {
        Some(value) => usize::try_from(value).context("concurrency does not fit this platform")?,
        None => default_concurrency(),
    };
    let mut dispatcher = Dispatcher::new(concurrency, Arc::new(downloader))?;
    if let Some(max_manifests) = args.max_manifests {
        dispatcher = dispatcher.with_max_active_manifests(
            usize::try_from(max_manifests).context("max-manifests does not fit this platform")?,
        );
    }

    let use_spinner = !args.no_progress && !args.quiet && io::stderr().is_terminal();
    let (spinner, stop) = progress::spawn_progress_ui(use_spinner, Arc::clone(&stats));

    let sink = ResultSink::new(layout.clone());
    let report = dispatcher.run(manifests, &layout, &sink).await;

    stop.store(true, Ordering::SeqCst);
    if let Some(handle) = spinner {
        let _ = handle.await;
    }

    info!(
        manifests = report.completed().len(),
        completed = stats.completed(),
        failed = stats.failed(),
        resumed = stats.resumed(),
        retried = stats.retried(),
        "Download complete"
    );

    for (path, error) in report.aborted() {
        warn!(manifest = %path.display(), error = %error, "Manifest was not processed");
    }
    if !report.aborted().is_empty() {
        bail!("{} manifest(s) could not be processed", report.aborted().len());
    }

    Ok(())
}
