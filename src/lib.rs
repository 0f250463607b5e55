//! Batchfetch Core Library
//!
//! Bulk-downloads manifests of (url, caption) pairs into an annotated image
//! dataset, with bounded concurrency, a fallback transport, retries and
//! resume-by-existence.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`manifest`] - Manifest discovery and CSV reading
//! - [`download`] - Transports, per-item retry, the manifest worker and the
//!   bounded dispatcher
//! - [`output`] - Output directory layout and annotation/miss persistence

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod manifest;
pub mod output;

// Re-export commonly used types
pub use download::{
    CommandTransport, Dispatcher, DownloadError, DownloadResult, DownloadStats, EngineError,
    HttpTransport, Item, ItemDownloader, ManifestWorker, ResumePolicy, RetryPolicy, RunReport,
    Transport, default_concurrency,
};
pub use manifest::{Manifest, ManifestEntry, ManifestError, discover_manifests};
pub use output::{ManifestOutcome, OutputLayout, ResultSink};
