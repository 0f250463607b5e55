//! Manifest worker: expands one manifest into items and collects results.
//!
//! The worker is the single consumer of its manifest's results. Download
//! tasks return immutable [`DownloadResult`] values; only the worker appends
//! them to the [`ManifestOutcome`], so the outcome needs no locking.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use super::diagnostics::DiagnosticLog;
use super::engine::{Dispatcher, EngineError};
use super::item::{DownloadResult, Item, ResumePolicy};
use crate::manifest::{Manifest, ManifestError};
use crate::output::{
    FailureRecord, ManifestOutcome, OutputLayout, ResultSink, SinkError, SuccessRecord,
};

/// Errors that abort a whole manifest. Item failures never show up here.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The manifest could not be read.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// The output directory or log file could not be prepared.
    #[error("failed to prepare {path}: {source}")]
    Setup {
        /// Directory or file being prepared.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Writing the annotation or miss file failed.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// The worker pool is unusable.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A blocking helper task did not finish.
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl WorkerError {
    fn setup(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Setup {
            path: path.into(),
            source,
        }
    }
}

/// Per-manifest counts after finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestReport {
    /// Manifest identifier.
    pub id: String,
    /// Items in the manifest.
    pub total: usize,
    /// Items written to the annotation file.
    pub succeeded: usize,
    /// Items written to the miss file.
    pub failed: usize,
    /// Successful items that were skipped because the file existed.
    pub resumed: usize,
}

/// Extension for an item's output file.
///
/// Source URLs spell `jpeg` as `jepg`; those keep the `jpeg` extension,
/// everything else is saved as `jpg`.
#[must_use]
pub fn infer_extension(url: &str) -> &'static str {
    if url.contains("jepg") { "jpeg" } else { "jpg" }
}

/// Output file name for the item at `index`: `<index>.<ext>`.
#[must_use]
pub fn item_file_name(index: usize, url: &str) -> String {
    format!("{index}.{}", infer_extension(url))
}

/// Processes manifests through a shared [`Dispatcher`].
#[derive(Debug, Clone, Copy)]
pub struct ManifestWorker<'a> {
    dispatcher: &'a Dispatcher,
    layout: &'a OutputLayout,
    sink: &'a ResultSink,
}

impl<'a> ManifestWorker<'a> {
    /// Creates a worker writing under `layout` and finalizing through `sink`.
    #[must_use]
    pub fn new(
        dispatcher: &'a Dispatcher,
        layout: &'a OutputLayout,
        sink: &'a ResultSink,
    ) -> Self {
        Self {
            dispatcher,
            layout,
            sink,
        }
    }

    /// Loads the manifest at `path`, processes it and writes its output files.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError`] if the manifest cannot be loaded, its output
    /// cannot be prepared or its results cannot be written.
    pub async fn run(&self, path: &Path) -> Result<ManifestReport, WorkerError> {
        let source = path.to_path_buf();
        let manifest = tokio::task::spawn_blocking(move || Manifest::load(&source)).await??;

        let outcome = self.process(&manifest).await?;
        let report = ManifestReport {
            id: manifest.id().to_string(),
            total: manifest.len(),
            succeeded: outcome.successes.len(),
            failed: outcome.failures.len(),
            resumed: outcome.resumed,
        };
        self.sink.finalize(manifest.id(), outcome).await?;

        info!(
            manifest = %report.id,
            succeeded = report.succeeded,
            failed = report.failed,
            resumed = report.resumed,
            "manifest complete"
        );
        Ok(report)
    }

    /// Downloads every item of `manifest` and partitions the results.
    ///
    /// Both outcome sequences are sorted by item index.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Setup`] if the data directory or log file cannot
    /// be prepared; no item is attempted in that case.
    #[instrument(skip(self, manifest), fields(manifest = %manifest.id(), items = manifest.len()))]
    pub async fn process(&self, manifest: &Manifest) -> Result<ManifestOutcome, WorkerError> {
        info!("manifest start");

        let data_dir = self.layout.data_dir(manifest.id());
        self.prepare_data_dir(&data_dir).await?;

        let log_path = self.layout.log_path(manifest.id());
        let log = DiagnosticLog::create(&log_path)
            .await
            .map_err(|e| WorkerError::setup(&log_path, e))?;

        let items = expand_items(manifest, &data_dir).await;
        let results = self.dispatcher.resolve_all(items, Arc::new(log)).await?;

        let mut outcome = ManifestOutcome::default();
        for result in results {
            match result {
                DownloadResult::Success {
                    index,
                    path,
                    caption,
                    resumed,
                } => {
                    let file_name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    outcome.successes.push(SuccessRecord {
                        index,
                        path: self.layout.relative_data_path(manifest.id(), &file_name),
                        caption,
                    });
                    if resumed {
                        outcome.resumed += 1;
                    }
                }
                DownloadResult::Failure {
                    index,
                    url,
                    caption,
                    error,
                } => {
                    debug!(index, error = %error, "item failed");
                    outcome.failures.push(FailureRecord {
                        index,
                        url,
                        caption,
                    });
                }
            }
        }
        outcome.sort_by_index();

        Ok(outcome)
    }

    async fn prepare_data_dir(&self, data_dir: &Path) -> Result<(), WorkerError> {
        if self.dispatcher.downloader().resume_policy() == ResumePolicy::Refetch {
            match tokio::fs::remove_dir_all(data_dir).await {
                Ok(()) => debug!(dir = %data_dir.display(), "cleared previous output"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(WorkerError::setup(data_dir, e)),
            }
        }
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| WorkerError::setup(data_dir, e))
    }
}

/// Builds the item list, probing whether each destination already exists.
async fn expand_items(manifest: &Manifest, data_dir: &Path) -> Vec<Item> {
    let mut items = Vec::with_capacity(manifest.len());
    for (index, entry) in manifest.entries().iter().enumerate() {
        let dest = data_dir.join(item_file_name(index, &entry.url));
        let exists = tokio::fs::try_exists(&dest).await.unwrap_or(false);
        items.push(Item {
            index,
            url: entry.url.clone(),
            caption: entry.caption.clone(),
            dest,
            exists,
        });
    }
    items
}
