//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use batchfetch_core::download::constants::{
    DEFAULT_FALLBACK_PROGRAM, DEFAULT_FALLBACK_TIMEOUT_SECS, DEFAULT_MAX_ATTEMPTS,
};

const OUTPUT_FORMAT_HELP: &str = "Output files:
  Annotation/<manifest>.csv   header `path,caption`, paths relative to the output root
  Miss/<manifest>.csv         header `index,url,caption`, written only when items failed
  Logs/<manifest>.log         one `<error>. <url>` line per failed item

These headers replace the older `pth,annoation` and `ind,url,annoation` spellings.";

/// Bulk-download image/caption manifests into an annotated dataset.
///
/// Every `.csv` manifest in the input directory (columns `url` and `caption`)
/// is fetched into `<output>/Data/<manifest>/`, with an annotation file per
/// manifest and a miss file listing the items that could not be fetched.
#[derive(Parser, Debug)]
#[command(name = "batchfetch")]
#[command(author, version, about)]
#[command(after_help = OUTPUT_FORMAT_HELP)]
pub struct Args {
    /// Directory containing the manifest CSV files
    #[arg(short, long, default_value = "wukong_release")]
    pub input: PathBuf,

    /// Output root (Data/, Annotation/, Miss/, Logs/ are created inside)
    #[arg(short, long, default_value = "wukong")]
    pub output: PathBuf,

    /// Maximum concurrent downloads across all manifests [default: max(CPUs, 10)]
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u64).range(1..))]
    pub concurrency: Option<u64>,

    /// Maximum manifests open at the same time [default: concurrency]
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_manifests: Option<u64>,

    /// Attempts per item, each trying the primary then the fallback transport (1-10)
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: u8,

    /// Backoff unit in milliseconds; the wait after attempt n is unit * (n + 1)
    #[arg(long, default_value_t = 500, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub backoff_ms: u64,

    /// Delay after every item in milliseconds (0 to disable)
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub pacing_ms: u64,

    /// Resumable-download program used as fallback (wget-compatible arguments)
    #[arg(long, default_value = DEFAULT_FALLBACK_PROGRAM)]
    pub fallback_program: String,

    /// Ceiling for one fallback invocation in seconds (1-3600)
    #[arg(long, default_value_t = DEFAULT_FALLBACK_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub fallback_timeout: u64,

    /// Disable the fallback transport
    #[arg(long)]
    pub no_fallback: bool,

    /// Connect timeout for the primary transport in seconds (no timeout if unset)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub connect_timeout: Option<u64>,

    /// Re-download everything: clear each manifest's data directory instead of skipping existing files
    #[arg(long)]
    pub refetch: bool,

    /// Disable the progress spinner
    #[arg(long)]
    pub no_progress: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
