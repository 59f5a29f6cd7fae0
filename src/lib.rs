//! # codeindex: incremental structural code indexer
//!
//! Walks a source tree and, for every file, records named definitions,
//! import edges, embedding-ready chunks and complexity metrics. Re-scans only
//! touch files whose content actually changed.
//!
//! ## Architecture
//!
//! - **[`config`]**: Configuration loading and validation
//! - **[`db`]**: SQLite index store with per-row write acknowledgement
//! - **[`embedder`]**: Embedding trait, text truncation and a deterministic mock
//! - **[`indexer`]**: Language registry, line-scanning extractor, chunker, scan pipeline
//! - **[`registry`]**: One lazily built indexer per project root
//! - **[`watcher`]**: notify adapter with a debounced change queue

pub mod config;
pub mod db;
pub mod embedder;
pub mod indexer;
pub mod registry;
pub mod watcher;
