//! Dispatcher: the bounded worker pool shared by every manifest.
//!
//! Concurrency is enforced with a single semaphore. Each item resolution
//! holds one permit for its whole lifetime (attempts, backoff sleeps and the
//! pacing delay included), so at most `concurrency` resolutions are in flight
//! across all manifests at any moment.
//!
//! Manifests themselves run concurrently without waiting for one another; the
//! number open at once is capped separately so a large input directory does
//! not hold thousands of log files open.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use batchfetch_core::download::{Dispatcher, HttpTransport, ItemDownloader, default_concurrency};
//! use batchfetch_core::output::{OutputLayout, ResultSink};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ItemDownloader::new(Arc::new(HttpTransport::new()?), None);
//! let dispatcher = Dispatcher::new(default_concurrency(), Arc::new(downloader))?;
//! let layout = OutputLayout::new("wukong");
//! layout.ensure_dirs().await?;
//! let sink = ResultSink::new(layout.clone());
//! let report = dispatcher.run(vec!["wukong_release/part_0.csv".into()], &layout, &sink).await;
//! println!("aborted manifests: {}", report.aborted().len());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use futures_util::StreamExt;
use futures_util::stream;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, instrument, warn};

use super::constants::MIN_DEFAULT_CONCURRENCY;
use super::diagnostics::DiagnosticLog;
use super::item::{DownloadResult, Item, ItemDownloader};
use super::worker::{ManifestReport, ManifestWorker, WorkerError};
use crate::output::{OutputLayout, ResultSink};

/// Error type for dispatcher operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid pool size provided.
    #[error("invalid concurrency value {value}: must be at least 1")]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Default pool size: available parallelism, never below
/// [`MIN_DEFAULT_CONCURRENCY`].
#[must_use]
pub fn default_concurrency() -> usize {
    thread::available_parallelism()
        .map_or(MIN_DEFAULT_CONCURRENCY, std::num::NonZeroUsize::get)
        .max(MIN_DEFAULT_CONCURRENCY)
}

/// Result of a whole run across manifests.
#[derive(Debug, Default)]
pub struct RunReport {
    completed: Vec<ManifestReport>,
    aborted: Vec<(PathBuf, WorkerError)>,
}

impl RunReport {
    /// Manifests that were processed to the end, in completion order.
    #[must_use]
    pub fn completed(&self) -> &[ManifestReport] {
        &self.completed
    }

    /// Manifests whose setup or finalization failed, with the cause.
    #[must_use]
    pub fn aborted(&self) -> &[(PathBuf, WorkerError)] {
        &self.aborted
    }

    /// Total successful items over completed manifests.
    #[must_use]
    pub fn succeeded_items(&self) -> usize {
        self.completed.iter().map(|m| m.succeeded).sum()
    }

    /// Total failed items over completed manifests.
    #[must_use]
    pub fn failed_items(&self) -> usize {
        self.completed.iter().map(|m| m.failed).sum()
    }
}

/// Bounded pool of download tasks.
///
/// # Concurrency Model
///
/// - Each item resolution runs in its own Tokio task
/// - A semaphore permit is acquired before the task is spawned
/// - Permits are released automatically when the resolution completes (RAII)
/// - The semaphore is shared by every manifest, so the cap is global
#[derive(Debug)]
pub struct Dispatcher {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Manifests processed at the same time.
    max_active_manifests: usize,
    /// Resolves every submitted item.
    downloader: Arc<ItemDownloader>,
}

impl Dispatcher {
    /// Creates a dispatcher with `concurrency` permits.
    ///
    /// The manifest cap defaults to `concurrency`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is zero.
    #[instrument(level = "debug", skip(downloader))]
    pub fn new(concurrency: usize, downloader: Arc<ItemDownloader>) -> Result<Self, EngineError> {
        if concurrency == 0 {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(
            concurrency,
            max_attempts = downloader.retry_policy().max_attempts(),
            resume = ?downloader.resume_policy(),
            "creating dispatcher"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            max_active_manifests: concurrency,
            downloader,
        })
    }

    /// Sets how many manifests may be open at once (at least 1).
    #[must_use]
    pub fn with_max_active_manifests(mut self, max_active_manifests: usize) -> Self {
        self.max_active_manifests = max_active_manifests.max(1);
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the manifest cap.
    #[must_use]
    pub fn max_active_manifests(&self) -> usize {
        self.max_active_manifests
    }

    /// Returns the item downloader shared by all tasks.
    #[must_use]
    pub fn downloader(&self) -> &Arc<ItemDownloader> {
        &self.downloader
    }

    /// Waits for a free slot, then starts resolving `item` in the background.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the pool was shut down.
    pub async fn submit(
        &self,
        item: Item,
        log: Arc<DiagnosticLog>,
    ) -> Result<JoinHandle<DownloadResult>, EngineError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::SemaphoreClosed)?;
        let downloader = Arc::clone(&self.downloader);

        Ok(tokio::spawn(async move {
            // Permit is dropped when this block exits (RAII)
            let _permit = permit;
            downloader.resolve(item, &log).await
        }))
    }

    /// Resolves every item with at most `concurrency` in flight and returns
    /// the results in completion order.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SemaphoreClosed`] if the pool was shut down.
    /// Individual download failures do NOT cause this method to error.
    #[instrument(skip(self, items, log), fields(items = items.len()))]
    pub async fn resolve_all(
        &self,
        items: Vec<Item>,
        log: Arc<DiagnosticLog>,
    ) -> Result<Vec<DownloadResult>, EngineError> {
        let mut results = Vec::with_capacity(items.len());
        let mut tasks = JoinSet::new();

        for item in items {
            // Acquire semaphore permit (blocks if at concurrency limit)
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;
            let downloader = Arc::clone(&self.downloader);
            let log = Arc::clone(&log);

            tasks.spawn(async move {
                let _permit = permit;
                downloader.resolve(item, &log).await
            });

            while let Some(joined) = tasks.try_join_next() {
                collect(joined, &mut results);
            }
        }

        debug!(remaining = tasks.len(), "waiting for downloads to complete");
        while let Some(joined) = tasks.join_next().await {
            collect(joined, &mut results);
        }

        Ok(results)
    }

    /// Processes every manifest and finalizes its output.
    ///
    /// A manifest whose setup fails is recorded in
    /// [`RunReport::aborted`]; the other manifests carry on.
    #[instrument(skip(self, manifests, layout, sink), fields(manifests = manifests.len()))]
    pub async fn run(
        &self,
        manifests: Vec<PathBuf>,
        layout: &OutputLayout,
        sink: &ResultSink,
    ) -> RunReport {
        info!(
            concurrency = self.concurrency,
            max_active_manifests = self.max_active_manifests,
            "starting run"
        );

        let worker = ManifestWorker::new(self, layout, sink);
        let mut outcomes = stream::iter(manifests)
            .map(|path| {
                let worker = &worker;
                async move {
                    let result = worker.run(&path).await;
                    (path, result)
                }
            })
            .buffer_unordered(self.max_active_manifests);

        let mut report = RunReport::default();
        while let Some((path, result)) = outcomes.next().await {
            match result {
                Ok(manifest) => report.completed.push(manifest),
                Err(e) => {
                    warn!(manifest = %path.display(), error = %e, "manifest aborted");
                    report.aborted.push((path, e));
                }
            }
        }

        info!(
            manifests = report.completed.len(),
            aborted = report.aborted.len(),
            succeeded = report.succeeded_items(),
            failed = report.failed_items(),
            "run complete"
        );
        report
    }
}

fn collect(joined: Result<DownloadResult, JoinError>, results: &mut Vec<DownloadResult>) {
    match joined {
        Ok(result) => results.push(result),
        // resolve() does not panic; a JoinError here means the runtime is going down.
        Err(e) => warn!(error = %e, "download task panicked"),
    }
}
