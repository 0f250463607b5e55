//! Error types for manifest loading and discovery.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while locating or reading manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest file or input directory could not be opened or listed.
    #[error("cannot read {path}: {source}")]
    Io {
        /// File or directory being read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV layer rejected the file (bad encoding, ragged rows).
    #[error("malformed manifest {path}: {source}")]
    Csv {
        /// Manifest being read.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },

    /// A required header column is absent.
    #[error(
        "manifest {path} has no '{column}' column\n  Suggestion: the header row must contain 'url' and 'caption'"
    )]
    MissingColumn {
        /// Manifest being read.
        path: PathBuf,
        /// Name of the missing column.
        column: &'static str,
    },

    /// The manifest path has no usable file stem to derive an identifier from.
    #[error("cannot derive a manifest id from {path}")]
    InvalidName {
        /// Offending path.
        path: PathBuf,
    },
}

impl ManifestError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a CSV error.
    pub fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}
