//! The single-attempt download capability.
//!
//! A [`Transport`] makes exactly one attempt at writing `url` to `dest`.
//! Retry, backoff and fallback ordering belong to
//! [`ItemDownloader`](super::ItemDownloader); transports only report whether
//! their one attempt worked.

use std::path::Path;

use async_trait::async_trait;

use super::DownloadError;

/// One way of fetching a URL into a local file.
///
/// Implementations must not panic on remote or process failures; every
/// failure is reported as a [`DownloadError`]. A transport may leave a
/// partially written file at `dest`; resumable transports continue from it.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Short name used in log fields ("http", "wget", ...).
    fn name(&self) -> &str;

    /// Performs a single attempt at fetching `url` into `dest`.
    ///
    /// # Errors
    ///
    /// Returns a [`DownloadError`] describing why the attempt failed.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}
