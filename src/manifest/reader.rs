//! CSV reading and input-directory discovery.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use super::{ManifestEntry, ManifestError};

const URL_COLUMN: &str = "url";
const CAPTION_COLUMN: &str = "caption";

/// Reads all entries of the manifest at `path`, in file order.
#[instrument(level = "debug", fields(path = %path.display()))]
pub(super) fn read_entries(path: &Path) -> Result<Vec<ManifestEntry>, ManifestError> {
    let file = std::fs::File::open(path).map_err(|e| ManifestError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| ManifestError::csv(path, e))?
        .clone();
    let column = |name: &'static str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ManifestError::MissingColumn {
                path: path.to_path_buf(),
                column: name,
            })
    };
    let url_idx = column(URL_COLUMN)?;
    let caption_idx = column(CAPTION_COLUMN)?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ManifestError::csv(path, e))?;
        // Uniform row length is enforced by the reader, so both indexes exist.
        let url = record.get(url_idx).unwrap_or_default().trim();
        let caption = record.get(caption_idx).unwrap_or_default();
        entries.push(ManifestEntry::new(url, caption));
    }

    debug!(entries = entries.len(), "manifest read");
    Ok(entries)
}

/// Lists the `.csv` manifests in `dir`, ordered by their numeric suffix.
///
/// `part_2.csv` sorts before `part_10.csv`. Files whose stem does not end in
/// `_<number>` come after all numbered files, ordered by name.
///
/// # Errors
///
/// Returns [`ManifestError::Io`] if the directory cannot be listed.
#[instrument(fields(dir = %dir.display()))]
pub fn discover_manifests(dir: &Path) -> Result<Vec<PathBuf>, ManifestError> {
    let mut manifests = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| ManifestError::io(dir, e))? {
        let path = entry.map_err(|e| ManifestError::io(dir, e))?.path();
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            manifests.push(path);
        }
    }

    manifests.sort_by(|a, b| compare_manifest_paths(a, b));
    debug!(count = manifests.len(), "discovered manifests");
    Ok(manifests)
}

fn numeric_suffix(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let (_, suffix) = stem.rsplit_once('_')?;
    suffix.parse().ok()
}

fn compare_manifest_paths(a: &Path, b: &Path) -> Ordering {
    match (numeric_suffix(a), numeric_suffix(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
