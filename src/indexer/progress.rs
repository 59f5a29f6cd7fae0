//! Fire-and-forget scan progress over a broadcast channel.
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use super::core::{ScanMode, ScanStats};

/// Where a scan currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Idle,
    Scanning,
    ReadingAndFiltering,
    Embedding,
    Analyzing,
    Persisting,
    Complete,
    Error,
}

impl ScanPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanPhase::Idle => "idle",
            ScanPhase::Scanning => "scanning",
            ScanPhase::ReadingAndFiltering => "reading_and_filtering",
            ScanPhase::Embedding => "embedding",
            ScanPhase::Analyzing => "analyzing",
            ScanPhase::Persisting => "persisting",
            ScanPhase::Complete => "complete",
            ScanPhase::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    ScanStarted {
        project: String,
        root: String,
        mode: ScanMode,
        total_files: usize,
    },
    ScanProgress {
        phase: ScanPhase,
        processed: usize,
        total: usize,
        batch: usize,
        batches: usize,
    },
    FileIndexed {
        path: String,
        language: String,
        line_count: usize,
        had_embedding: bool,
    },
    ScanCompleted {
        root: String,
        /// Files the run considered
        file_count: usize,
        total_lines: usize,
        stats: ScanStats,
        duration_ms: u64,
        success: bool,
    },
}

/// Sending never blocks and never fails the scan; events without
/// subscribers are dropped and slow subscribers observe `Lagged`.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            trace!("Progress event dropped, no subscribers");
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let reporter = ProgressReporter::default();
        reporter.emit(ProgressEvent::ScanStarted {
            project: "p".into(),
            root: "/tmp".into(),
            mode: ScanMode::Incremental,
            total_files: 0,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let reporter = ProgressReporter::new(8);
        let mut rx = reporter.subscribe();
        reporter.emit(ProgressEvent::FileIndexed {
            path: "a.ts".into(),
            language: "typescript".into(),
            line_count: 12,
            had_embedding: true,
        });
        reporter.emit(ProgressEvent::ScanProgress {
            phase: ScanPhase::Persisting,
            processed: 1,
            total: 1,
            batch: 1,
            batches: 1,
        });
        assert!(matches!(rx.recv().await.unwrap(), ProgressEvent::FileIndexed { line_count: 12, had_embedding: true, .. }));
        match rx.recv().await.unwrap() {
            ProgressEvent::ScanProgress { phase, .. } => assert_eq!(phase, ScanPhase::Persisting),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let json = serde_json::to_value(ProgressEvent::ScanProgress {
            phase: ScanPhase::ReadingAndFiltering,
            processed: 3,
            total: 10,
            batch: 1,
            batches: 1,
        })
        .unwrap();
        assert_eq!(json["type"], "scan_progress");
        assert_eq!(json["phase"], "reading_and_filtering");

        let started = serde_json::to_value(ProgressEvent::ScanStarted {
            project: "p".into(),
            root: "/src".into(),
            mode: ScanMode::Force,
            total_files: 4,
        })
        .unwrap();
        assert_eq!(started["type"], "scan_started");
        assert_eq!(started["mode"], "force");
    }
}
