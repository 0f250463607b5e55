//! Per-manifest diagnostic log of items that ran out of attempts.
//!
//! One line per exhausted item: `<error>. <url>`. Concurrent tasks share the
//! log through an `Arc`; the async mutex keeps lines from interleaving.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Append-only, truncated-on-open diagnostic log file.
#[derive(Debug)]
pub struct DiagnosticLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl DiagnosticLog {
    /// Creates (or truncates) the log at `path`.
    ///
    /// # Errors
    ///
    /// Returns the IO error if the file cannot be created.
    pub async fn create(path: impl Into<PathBuf>) -> Result<Self, std::io::Error> {
        let path = path.into();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Returns the path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `"<error>. <url>\n"`.
    ///
    /// Write failures are reported through `tracing` and otherwise ignored;
    /// losing a diagnostic line must not turn into a failed item.
    pub async fn record_failure(&self, error: &(dyn std::fmt::Display + Sync), url: &str) {
        let line = format!("{error}. {url}\n");
        let mut file = self.file.lock().await;
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "failed to write diagnostic log line");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_create_truncates_existing_log() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.log");
        std::fs::write(&path, "stale line\n").unwrap();

        let log = DiagnosticLog::create(&path).await.unwrap();

        assert_eq!(log.path(), path);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }

    #[tokio::test]
    async fn test_record_failure_formats_error_dot_url() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.log");
        let log = DiagnosticLog::create(&path).await.unwrap();

        log.record_failure(&"HTTP 404", "http://x/y.jpg").await;

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "HTTP 404. http://x/y.jpg\n"
        );
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.log");
        let log = Arc::new(DiagnosticLog::create(&path).await.unwrap());

        let mut handles = Vec::new();
        for i in 0..50 {
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                log.record_failure(&format!("error {i}"), &format!("http://x/{i}.jpg"))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 50);
        for line in lines {
            assert!(line.starts_with("error "), "mangled line: {line}");
            assert!(line.ends_with(".jpg"), "mangled line: {line}");
        }
    }
}
