//! Manifests: ordered (url, caption) batches read from CSV files.
//!
//! A manifest file has a header row with `url` and `caption` columns; other
//! columns are ignored. The manifest identifier is the file stem, so
//! `release/wukong_100m_3.csv` becomes `wukong_100m_3`.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use batchfetch_core::manifest::{Manifest, discover_manifests};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! for path in discover_manifests(Path::new("wukong_release"))? {
//!     let manifest = Manifest::load(&path)?;
//!     println!("{}: {} items", manifest.id(), manifest.len());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod reader;

use std::path::{Path, PathBuf};

pub use error::ManifestError;
pub use reader::discover_manifests;

/// One row of a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Source URL.
    pub url: String,
    /// Opaque caption, carried to the annotation output unchanged.
    pub caption: String,
}

impl ManifestEntry {
    /// Creates an entry.
    pub fn new(url: impl Into<String>, caption: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            caption: caption.into(),
        }
    }
}

/// An immutable, ordered batch of entries processed as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    id: String,
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Creates a manifest from already-parsed entries.
    pub fn new(id: impl Into<String>, entries: Vec<ManifestEntry>) -> Self {
        Self {
            id: id.into(),
            entries,
        }
    }

    /// Reads the manifest CSV at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError`] if the file is missing, malformed, lacks the
    /// `url`/`caption` columns, or has no usable file stem.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let id = manifest_id(path)?;
        let entries = reader::read_entries(path)?;
        Ok(Self { id, entries })
    }

    /// Identifier used for output file and directory names.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Entries in manifest order; an entry's position is its item index.
    #[must_use]
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the manifest has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Derives the manifest identifier (the file stem) from its path.
///
/// # Errors
///
/// Returns [`ManifestError::InvalidName`] if the path has no UTF-8 file stem.
pub fn manifest_id(path: &Path) -> Result<String, ManifestError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ManifestError::InvalidName {
            path: PathBuf::from(path),
        })
}
