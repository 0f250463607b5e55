//! Constants for the download module (retry budget, pacing, fallback limits).

use std::time::Duration;

/// Default number of (primary, fallback) attempt pairs per item.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Unit of the linear backoff between attempts (0.5 seconds).
pub const DEFAULT_BACKOFF_UNIT: Duration = Duration::from_millis(500);

/// Politeness delay applied after every resolved item.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(5);

/// Hard ceiling on a single fallback command invocation.
pub const DEFAULT_FALLBACK_TIMEOUT_SECS: u64 = 30;

/// Fallback utility invoked when the primary fetch fails.
pub const DEFAULT_FALLBACK_PROGRAM: &str = "wget";

/// Lower bound for the default worker pool size.
pub const MIN_DEFAULT_CONCURRENCY: usize = 10;
