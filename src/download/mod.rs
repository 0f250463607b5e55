//! Bounded-concurrency download engine.
//!
//! Leaves first:
//!
//! - [`Transport`] - one attempt at fetching a URL ([`HttpTransport`] primary,
//!   [`CommandTransport`] fallback)
//! - [`ItemDownloader`] - retry, backoff, fallback and resume for one item
//! - [`ManifestWorker`] - expands a manifest and partitions its results
//! - [`Dispatcher`] - the semaphore-bounded pool shared by all manifests
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use batchfetch_core::download::{
//!     CommandTransport, Dispatcher, HttpTransport, ItemDownloader, default_concurrency,
//! };
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let downloader = ItemDownloader::new(
//!     Arc::new(HttpTransport::new()?),
//!     Some(Arc::new(CommandTransport::default())),
//! );
//! let dispatcher = Dispatcher::new(default_concurrency(), Arc::new(downloader))?;
//! assert!(dispatcher.concurrency() >= 10);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod diagnostics;
mod engine;
mod error;
mod fallback;
mod item;
mod retry;
mod stats;
mod transport;
mod worker;

pub use client::HttpTransport;
pub use diagnostics::DiagnosticLog;
pub use engine::{Dispatcher, EngineError, RunReport, default_concurrency};
pub use error::{DownloadError, FallbackError};
pub use fallback::CommandTransport;
pub use item::{DownloadResult, Item, ItemDownloader, ResumePolicy};
pub use retry::{RetryDecision, RetryPolicy};
pub use stats::DownloadStats;
pub use transport::Transport;
pub use worker::{ManifestReport, ManifestWorker, WorkerError, infer_extension, item_file_name};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
