//! Directory layout of a run's output root.
//!
//! ```text
//! <root>/Data/<id>/<index>.<ext>   downloaded files
//! <root>/Annotation/<id>.csv       path,caption for every success
//! <root>/Miss/<id>.csv             index,url,caption for every failure
//! <root>/Logs/<id>.log             one line per exhausted item
//! ```

use std::path::{Path, PathBuf};

const DATA_DIR: &str = "Data";
const ANNOTATION_DIR: &str = "Annotation";
const MISS_DIR: &str = "Miss";
const LOGS_DIR: &str = "Logs";

/// Paths of every per-manifest artifact under one output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    /// Creates a layout rooted at `root`. Nothing is created on disk.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The output root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates the four top-level directories if they are missing.
    ///
    /// # Errors
    ///
    /// Returns the IO error of the first directory that cannot be created.
    pub async fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        for dir in [DATA_DIR, ANNOTATION_DIR, MISS_DIR, LOGS_DIR] {
            tokio::fs::create_dir_all(self.root.join(dir)).await?;
        }
        Ok(())
    }

    /// Directory holding the downloaded files of manifest `id`.
    #[must_use]
    pub fn data_dir(&self, id: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(id)
    }

    /// Annotation CSV of manifest `id`.
    #[must_use]
    pub fn annotation_path(&self, id: &str) -> PathBuf {
        self.root.join(ANNOTATION_DIR).join(format!("{id}.csv"))
    }

    /// Miss CSV of manifest `id`.
    #[must_use]
    pub fn miss_path(&self, id: &str) -> PathBuf {
        self.root.join(MISS_DIR).join(format!("{id}.csv"))
    }

    /// Diagnostic log of manifest `id`.
    #[must_use]
    pub fn log_path(&self, id: &str) -> PathBuf {
        self.root.join(LOGS_DIR).join(format!("{id}.log"))
    }

    /// Path of a downloaded file relative to the root, as written to the
    /// annotation file: `Data/<id>/<file_name>`.
    #[must_use]
    pub fn relative_data_path(&self, id: &str, file_name: &str) -> String {
        format!("{DATA_DIR}/{id}/{file_name}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_paths_follow_layout() {
        let layout = OutputLayout::new("/out");
        assert_eq!(layout.data_dir("m_1"), Path::new("/out/Data/m_1"));
        assert_eq!(layout.annotation_path("m_1"), Path::new("/out/Annotation/m_1.csv"));
        assert_eq!(layout.miss_path("m_1"), Path::new("/out/Miss/m_1.csv"));
        assert_eq!(layout.log_path("m_1"), Path::new("/out/Logs/m_1.log"));
        assert_eq!(layout.relative_data_path("m_1", "3.jpeg"), "Data/m_1/3.jpeg");
    }

    #[tokio::test]
    async fn test_ensure_dirs_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let layout = OutputLayout::new(temp_dir.path().join("out"));

        layout.ensure_dirs().await.unwrap();
        layout.ensure_dirs().await.unwrap();

        for dir in ["Data", "Annotation", "Miss", "Logs"] {
            assert!(layout.root().join(dir).is_dir(), "{dir} missing");
        }
    }
}
