//! Per-manifest outcome and its persistence.
//!
//! [`ResultSink::finalize`] turns a [`ManifestOutcome`] into the annotation
//! file (every success) and, only when something failed, the miss file. The
//! miss file is the input of a later re-run; nothing is re-submitted within
//! the same run.

mod layout;

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

pub use layout::OutputLayout;

/// Errors writing annotation or miss files.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The CSV writer failed (includes the underlying IO errors).
    #[error("failed to write {path}: {source}")]
    Csv {
        /// File being written.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// Flushing or removing a file failed.
    #[error("IO error on {path}: {source}")]
    Io {
        /// File being written or removed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The blocking writer task did not finish.
    #[error("writer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// One row of the annotation file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuccessRecord {
    /// Item index; used for ordering, not written.
    #[serde(skip)]
    pub index: usize,
    /// File path relative to the output root.
    pub path: String,
    /// Caption carried through from the manifest.
    pub caption: String,
}

/// One row of the miss file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    /// Item index.
    pub index: usize,
    /// Source URL.
    pub url: String,
    /// Caption carried through from the manifest.
    pub caption: String,
}

/// Successes and failures of one manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestOutcome {
    /// Items whose file is on disk.
    pub successes: Vec<SuccessRecord>,
    /// Items that exhausted their attempts.
    pub failures: Vec<FailureRecord>,
    /// How many of `successes` were skipped because the file existed.
    pub resumed: usize,
}

impl ManifestOutcome {
    /// Total number of items accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    /// Orders both sequences by item index.
    pub fn sort_by_index(&mut self) {
        self.successes.sort_by_key(|r| r.index);
        self.failures.sort_by_key(|r| r.index);
    }
}

/// Writes finalized outcomes under an [`OutputLayout`].
#[derive(Debug, Clone)]
pub struct ResultSink {
    layout: OutputLayout,
}

impl ResultSink {
    /// Creates a sink writing under `layout`.
    #[must_use]
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }

    /// Writes the annotation file and, if any item failed, the miss file.
    ///
    /// The annotation file is always written (header only when nothing
    /// succeeded). A miss file left by an earlier run is removed when this
    /// run has no failures.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError`] if either file cannot be written.
    #[instrument(
        skip(self, outcome),
        fields(successes = outcome.successes.len(), failures = outcome.failures.len())
    )]
    pub async fn finalize(
        &self,
        manifest_id: &str,
        outcome: ManifestOutcome,
    ) -> Result<(), SinkError> {
        let annotation_path = self.layout.annotation_path(manifest_id);
        let miss_path = self.layout.miss_path(manifest_id);

        tokio::task::spawn_blocking(move || {
            write_csv(&annotation_path, &["path", "caption"], &outcome.successes)?;
            if outcome.failures.is_empty() {
                remove_stale(&miss_path)
            } else {
                write_csv(&miss_path, &["index", "url", "caption"], &outcome.failures)
            }
        })
        .await??;

        debug!("outcome written");
        Ok(())
    }
}

fn write_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<(), SinkError> {
    let csv_error = |source: csv::Error| SinkError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_path(path)
        .map_err(csv_error)?;
    writer.write_record(header).map_err(csv_error)?;
    for row in rows {
        writer.serialize(row).map_err(csv_error)?;
    }
    writer.flush().map_err(|source| SinkError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn remove_stale(path: &Path) -> Result<(), SinkError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale miss file");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(SinkError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
