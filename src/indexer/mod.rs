//! Structural indexing: walk, detect changes, extract, persist.
pub mod change;
pub mod chunker;
pub mod classifier;
pub mod complexity;
pub mod core;
pub mod dependencies;
pub mod extractor;
pub mod languages;
pub mod markup;
pub mod progress;
pub(crate) mod scope;
pub mod types;
pub mod walker;

pub use self::core::{Indexer, ScanError, ScanMode, ScanReport, ScanStats};
pub use progress::{ProgressEvent, ProgressReporter, ScanPhase};
