//! Per-item resolution: resume check, (primary, fallback) attempts, backoff.
//!
//! [`ItemDownloader::resolve`] is the boundary where every transport error
//! is absorbed. It always returns a [`DownloadResult`]; a failed item becomes
//! a `Failure` value plus one line in the manifest's [`DiagnosticLog`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use super::constants::DEFAULT_PACING_DELAY;
use super::diagnostics::DiagnosticLog;
use super::error::DownloadError;
use super::retry::{RetryDecision, RetryPolicy};
use super::stats::DownloadStats;
use super::transport::Transport;

/// What to do with an item whose destination file is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResumePolicy {
    /// Treat an existing file as a finished download. Only existence is
    /// checked; size and content are not validated.
    #[default]
    SkipExisting,
    /// Ignore existing files and fetch every item again.
    Refetch,
}

/// One (url, caption) pair of a manifest, ready to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Position within the manifest.
    pub index: usize,
    /// Source URL.
    pub url: String,
    /// Caption carried through unchanged.
    pub caption: String,
    /// Absolute destination path.
    pub dest: PathBuf,
    /// Whether `dest` was occupied when the manifest was expanded.
    pub exists: bool,
}

/// Outcome of resolving one [`Item`].
#[derive(Debug)]
pub enum DownloadResult {
    /// The file is at `path`.
    Success {
        /// Item index.
        index: usize,
        /// Destination path.
        path: PathBuf,
        /// Item caption.
        caption: String,
        /// True if no fetch happened because the file already existed.
        resumed: bool,
    },
    /// Every attempt failed.
    Failure {
        /// Item index.
        index: usize,
        /// Source URL.
        url: String,
        /// Item caption.
        caption: String,
        /// Why the item failed (usually `RetryExhausted`).
        error: DownloadError,
    },
}

impl DownloadResult {
    /// Returns the index of the item this result belongs to.
    #[must_use]
    pub fn index(&self) -> usize {
        match self {
            Self::Success { index, .. } | Self::Failure { index, .. } => *index,
        }
    }

    /// Returns true for `Success`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Resolves items through a primary transport and an optional fallback.
pub struct ItemDownloader {
    primary: Arc<dyn Transport>,
    fallback: Option<Arc<dyn Transport>>,
    retry_policy: RetryPolicy,
    resume: ResumePolicy,
    pacing: Duration,
    stats: Arc<DownloadStats>,
}

impl std::fmt::Debug for ItemDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemDownloader")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|t| t.name()))
            .field("retry_policy", &self.retry_policy)
            .field("resume", &self.resume)
            .field("pacing", &self.pacing)
            .finish_non_exhaustive()
    }
}

impl ItemDownloader {
    /// Creates a downloader with default retry, resume and pacing settings.
    #[must_use]
    pub fn new(primary: Arc<dyn Transport>, fallback: Option<Arc<dyn Transport>>) -> Self {
        Self {
            primary,
            fallback,
            retry_policy: RetryPolicy::default(),
            resume: ResumePolicy::default(),
            pacing: DEFAULT_PACING_DELAY,
            stats: Arc::new(DownloadStats::new()),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Sets the resume policy.
    #[must_use]
    pub fn with_resume_policy(mut self, resume: ResumePolicy) -> Self {
        self.resume = resume;
        self
    }

    /// Sets the delay applied after every resolved item.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Shares `stats` instead of the downloader's private counters.
    #[must_use]
    pub fn with_stats(mut self, stats: Arc<DownloadStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Returns the resume policy.
    #[must_use]
    pub fn resume_policy(&self) -> ResumePolicy {
        self.resume
    }

    /// Returns the retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Returns the shared run counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<DownloadStats> {
        &self.stats
    }

    /// Resolves one item. Never fails; transport errors end up in the
    /// returned `Failure` and in `log`.
    #[instrument(skip(self, item, log), fields(index = item.index, url = %item.url))]
    pub async fn resolve(&self, item: Item, log: &DiagnosticLog) -> DownloadResult {
        let result = if item.exists && self.resume == ResumePolicy::SkipExisting {
            debug!(dest = %item.dest.display(), "file already present, skipping");
            self.stats.increment_resumed();
            DownloadResult::Success {
                index: item.index,
                path: item.dest,
                caption: item.caption,
                resumed: true,
            }
        } else {
            match self.fetch_with_retry(&item).await {
                Ok(()) => DownloadResult::Success {
                    index: item.index,
                    path: item.dest,
                    caption: item.caption,
                    resumed: false,
                },
                Err(error) => {
                    log.record_failure(&error.summary(), &item.url).await;
                    discard_leftover(&item).await;
                    DownloadResult::Failure {
                        index: item.index,
                        url: item.url,
                        caption: item.caption,
                        error,
                    }
                }
            }
        };

        if result.is_success() {
            self.stats.increment_completed();
        } else {
            self.stats.increment_failed();
        }

        tokio::time::sleep(self.pacing).await;
        result
    }

    /// Tries (primary, fallback) pairs until one succeeds or the budget runs out.
    ///
    /// # Returns
    ///
    /// - `Ok(())` - the file was written by one of the transports
    /// - `Err(DownloadError::RetryExhausted)` - wrapping the last primary error
    async fn fetch_with_retry(&self, item: &Item) -> Result<(), DownloadError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "attempting download");

            let primary_error = match self.primary.fetch(&item.url, &item.dest).await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            debug!(
                transport = self.primary.name(),
                error = %primary_error,
                "primary fetch failed"
            );

            if let Some(fallback) = &self.fallback {
                match fallback.fetch(&item.url, &item.dest).await {
                    Ok(()) => {
                        debug!(transport = fallback.name(), "recovered via fallback");
                        return Ok(());
                    }
                    Err(e) => {
                        debug!(transport = fallback.name(), error = %e, "fallback fetch failed");
                    }
                }
            }

            match self.retry_policy.should_retry(attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url = %item.url,
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %primary_error,
                        "retrying download"
                    );
                    self.stats.increment_retried();
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(
                        url = %item.url,
                        error = %primary_error,
                        %reason,
                        "download failed after all attempts"
                    );
                    return Err(DownloadError::retry_exhausted(
                        &item.url,
                        attempt,
                        primary_error,
                    ));
                }
            }
        }
    }
}

/// Removes whatever a failed attempt left at the destination, so a later
/// resume pass does not mistake it for a finished download.
async fn discard_leftover(item: &Item) {
    match tokio::fs::remove_file(&item.dest).await {
        Ok(()) => debug!(dest = %item.dest.display(), "removed partial file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(dest = %item.dest.display(), error = %e, "failed to remove partial file"),
    }
}
