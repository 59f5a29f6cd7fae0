use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex as TokioMutex, Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{Config, ScanConfig};
use crate::db::{IndexStore, StoreError, StoredFile};
use crate::embedder::{Embedder, EmbedderError, embed_all, prepare_text};
use crate::registry::project_key;

use super::change::{ChangeDetector, ChangeStatus};
use super::classifier::{ExtensionClassifier, LanguageClassifier, LanguageInfo};
use super::extractor::StructuralExtractor;
use super::progress::{ProgressEvent, ProgressReporter, ScanPhase};
use super::types::{IndexedFileRecord, stable_id};
use super::walker::{
    ExclusionPolicy, GlobExclusionPolicy, WalkOptions, WalkedFile, admits_path, relative_path, walk_tree,
};

/// Bytes handed to the classifier for shebang and binary sniffing.
const CLASSIFY_PREFIX: usize = 1024;
const PAGE_SIZE: u64 = 4096;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("invalid root: {0}")]
    InvalidRoot(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid exclude pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// mtime first, then content hash
    Incremental,
    /// Re-read and re-analyze everything
    Force,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub total_files: usize,
    pub processed: usize,
    pub indexed: usize,
    /// Lines across the files indexed by this run
    pub total_lines: usize,
    pub skipped_mtime: usize,
    pub skipped_hash: usize,
    pub skipped_oversize: usize,
    pub embedded: usize,
    pub embedding_failures: usize,
    pub ack_success: usize,
    pub ack_failed: usize,
    pub failed: usize,
    pub pruned: usize,
    pub memory_shrinks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub project: String,
    pub stats: ScanStats,
    pub duration_ms: u64,
    pub success: bool,
    pub error: Option<String>,
}

/// `max(floor, candidates / target_batch_count)`, capped at the ceiling.
pub fn batch_size(candidates: usize, scan: &ScanConfig) -> usize {
    (candidates / scan.target_batch_count.max(1))
        .max(scan.batch_floor)
        .min(scan.batch_ceiling)
        .max(1)
}

/// Deterministic file id within a project.
pub fn file_id(project: &str, path: &str) -> String {
    stable_id(&[project, path])
}

#[derive(Debug, Clone, Copy, Default)]
struct Position {
    processed: usize,
    total: usize,
    batch: usize,
    batches: usize,
}

struct Candidate {
    walked: WalkedFile,
    mtime: DateTime<Utc>,
    content: String,
    content_hash: String,
    size: u64,
    info: LanguageInfo,
}

enum ReadOutcome {
    UnchangedByMtime { walked: WalkedFile, size: u64 },
    UnchangedByHash { walked: WalkedFile, mtime: DateTime<Utc> },
    Oversize,
    Ready(Candidate),
}

/// stat, then read and hash only if the mtime cannot settle it.
fn read_one(
    walked: WalkedFile,
    recorded: Option<&StoredFile>,
    detector: ChangeDetector,
    classifier: &dyn LanguageClassifier,
    max_bytes: u64,
) -> io::Result<ReadOutcome> {
    let meta = std::fs::metadata(&walked.absolute_path)?;
    if meta.len() > max_bytes {
        return Ok(ReadOutcome::Oversize);
    }
    let mtime: DateTime<Utc> = meta.modified()?.into();

    let detection = detector.detect(recorded, mtime, || std::fs::read(&walked.absolute_path))?;
    match detection.status {
        ChangeStatus::UnchangedByMtime => {
            return Ok(ReadOutcome::UnchangedByMtime {
                walked,
                size: meta.len(),
            });
        }
        ChangeStatus::UnchangedByHash => return Ok(ReadOutcome::UnchangedByHash { walked, mtime }),
        ChangeStatus::New | ChangeStatus::Changed => {}
    }

    let content = detection.content.unwrap_or_default();
    let prefix = &content.as_bytes()[..content.len().min(CLASSIFY_PREFIX)];
    let info = classifier.classify(file_name(&walked.relative_path), prefix);
    Ok(ReadOutcome::Ready(Candidate {
        mtime,
        content_hash: detection.content_hash.unwrap_or_default(),
        size: detection.size,
        info,
        content,
        walked,
    }))
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension_of(path: &str) -> String {
    Path::new(file_name(path))
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Resident set size of this process, where the platform exposes it.
fn resident_memory_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE)
}

/// Incremental scan pipeline for one project root.
///
/// Batches run strictly one after another; parallelism lives inside a batch
/// (reads, analysis). The path → record index is only touched by this loop.
pub struct Indexer<S: IndexStore + 'static> {
    project: String,
    root: PathBuf,
    store: Arc<TokioMutex<S>>,
    embedder: Arc<dyn Embedder>,
    classifier: Arc<dyn LanguageClassifier>,
    policy: Arc<dyn ExclusionPolicy>,
    extractor: Arc<StructuralExtractor>,
    walk_options: WalkOptions,
    config: Config,
    progress: ProgressReporter,
    phase: ScanPhase,
    records: HashMap<String, IndexedFileRecord>,
}

impl<S: IndexStore + 'static> Indexer<S> {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<TokioMutex<S>>,
        embedder: Arc<dyn Embedder>,
        config: Config,
    ) -> Result<Self, ScanError> {
        let root: PathBuf = root.into();
        let root = root.canonicalize().unwrap_or(root);
        let policy = GlobExclusionPolicy::new(&config.exclude_patterns)?;
        Ok(Self {
            project: project_key(&root),
            root,
            store,
            embedder,
            classifier: Arc::new(ExtensionClassifier),
            policy: Arc::new(policy),
            extractor: Arc::new(StructuralExtractor::new(config.chunking)),
            walk_options: WalkOptions::from_config(&config.scan),
            config,
            progress: ProgressReporter::default(),
            phase: ScanPhase::Idle,
            records: HashMap::new(),
        })
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn LanguageClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_exclusion_policy(mut self, policy: Arc<dyn ExclusionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    pub fn record(&self, path: &str) -> Option<&IndexedFileRecord> {
        self.records.get(path)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Walk the root and bring the store in line with it.
    pub async fn scan(&mut self, mode: ScanMode) -> ScanReport {
        let started = Instant::now();
        let mut stats = ScanStats::default();
        let result = self.run_scan(mode, &mut stats).await;
        self.finish(started, stats, result)
    }

    /// Re-index (or drop) specific paths, e.g. from the file watcher.
    /// Paths may be absolute or root-relative; anything the walk would not
    /// admit is ignored.
    pub async fn index_paths(&mut self, paths: &[PathBuf]) -> ScanReport {
        let started = Instant::now();
        let mut stats = ScanStats::default();
        let result = self.run_paths(paths, &mut stats).await;
        self.finish(started, stats, result)
    }

    /// Drop root-relative paths from the store and the record index.
    pub async fn remove_paths(&mut self, paths: &[String]) -> Result<usize, ScanError> {
        let store = self.store.clone();
        let mut guard = store.lock().await;
        let mut removed = 0;
        for path in paths {
            if guard.remove_file(&self.project, path)? {
                removed += 1;
            }
            self.records.remove(path);
        }
        Ok(removed)
    }

    // ── Scan driver ──────────────────────────────────────────────────

    async fn run_scan(&mut self, mode: ScanMode, stats: &mut ScanStats) -> Result<(), ScanError> {
        self.enter(ScanPhase::Scanning, Position::default());
        if !self.root.is_dir() {
            return Err(ScanError::InvalidRoot(self.root.display().to_string()));
        }

        let files = {
            let root = self.root.clone();
            let options = self.walk_options.clone();
            let policy = self.policy.clone();
            tokio::task::spawn_blocking(move || walk_tree(&root, &options, policy))
                .await
                .map_err(|e| ScanError::Task(e.to_string()))??
        };
        let stored = self.store.lock().await.load_file_states(&self.project)?;
        stats.total_files = files.len();
        info!(
            "Scanning {} ({} files, {} known, mode {mode:?})",
            self.root.display(),
            files.len(),
            stored.len()
        );
        self.progress.emit(ProgressEvent::ScanStarted {
            project: self.project.clone(),
            root: self.root.display().to_string(),
            mode,
            total_files: files.len(),
        });

        let present: HashSet<String> = files.iter().map(|f| f.relative_path.clone()).collect();
        let detector = ChangeDetector::new(mode == ScanMode::Force);
        self.process_files(&files, &stored, detector, stats).await?;

        if self.config.scan.prune_missing {
            self.prune_missing(&stored, &present, stats).await;
        }
        Ok(())
    }

    async fn run_paths(&mut self, paths: &[PathBuf], stats: &mut ScanStats) -> Result<(), ScanError> {
        self.enter(ScanPhase::Scanning, Position::default());
        if !self.root.is_dir() {
            return Err(ScanError::InvalidRoot(self.root.display().to_string()));
        }

        let mut present: Vec<WalkedFile> = Vec::new();
        let mut gone: Vec<String> = Vec::new();
        for path in paths {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                self.root.join(path)
            };
            let absolute = absolute.canonicalize().unwrap_or(absolute);
            let Some(rel) = relative_path(&self.root, &absolute) else {
                debug!("Ignoring path outside root: {}", absolute.display());
                continue;
            };
            if !admits_path(&rel, &self.walk_options, self.policy.as_ref()) {
                continue;
            }
            if absolute.is_file() {
                present.push(WalkedFile {
                    relative_path: rel,
                    absolute_path: absolute,
                });
            } else if !absolute.exists() {
                gone.push(rel);
            }
        }
        present.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        present.dedup_by(|a, b| a.relative_path == b.relative_path);
        gone.sort();
        gone.dedup();

        stats.total_files = present.len();
        self.progress.emit(ProgressEvent::ScanStarted {
            project: self.project.clone(),
            root: self.root.display().to_string(),
            mode: ScanMode::Incremental,
            total_files: present.len(),
        });

        if !gone.is_empty() {
            stats.pruned += self.remove_paths(&gone).await?;
        }
        if present.is_empty() {
            return Ok(());
        }
        let stored = self.store.lock().await.load_file_states(&self.project)?;
        self.process_files(&present, &stored, ChangeDetector::new(false), stats)
            .await
    }

    async fn process_files(
        &mut self,
        files: &[WalkedFile],
        stored: &HashMap<String, StoredFile>,
        detector: ChangeDetector,
        stats: &mut ScanStats,
    ) -> Result<(), ScanError> {
        let size = batch_size(files.len(), &self.config.scan);
        let mut position = Position {
            processed: 0,
            total: files.len(),
            batch: 0,
            batches: files.len().div_ceil(size),
        };
        for (index, batch) in files.chunks(size).enumerate() {
            position.batch = index + 1;
            debug!("Batch {}/{} ({} files)", position.batch, position.batches, batch.len());
            self.process_batch(batch, stored, detector, stats, position).await;
            position.processed += batch.len();
        }
        Ok(())
    }

    async fn process_batch(
        &mut self,
        batch: &[WalkedFile],
        stored: &HashMap<String, StoredFile>,
        detector: ChangeDetector,
        stats: &mut ScanStats,
        position: Position,
    ) {
        // (a) stat / read / hash in parallel
        self.enter(ScanPhase::ReadingAndFiltering, position);
        let ready = self.read_batch(batch, stored, detector, stats).await;
        if ready.is_empty() {
            self.check_memory(stats);
            return;
        }

        // (b) one embedding call for the whole batch
        self.enter(ScanPhase::Embedding, position);
        let mut embedding_ok = true;
        let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; ready.len()];
        if self.config.embedding.enabled {
            let targets: Vec<usize> = (0..ready.len())
                .filter(|&i| ready[i].info.supports_embedding)
                .collect();
            if !targets.is_empty() {
                let max_chars = self.config.embedding.max_chars;
                let texts: Vec<String> = targets
                    .iter()
                    .map(|&i| prepare_text(&ready[i].content, max_chars).into_owned())
                    .collect();
                match self.embed_texts(texts).await {
                    Ok(vectors) => {
                        stats.embedded += vectors.len();
                        for (i, vector) in targets.into_iter().zip(vectors) {
                            embeddings[i] = Some(vector);
                        }
                    }
                    Err(e) => {
                        warn!("Embedding failed for batch {}: {e}", position.batch);
                        stats.embedding_failures += 1;
                        embedding_ok = false;
                    }
                }
            }
        }

        let mut records: Vec<(IndexedFileRecord, bool)> = ready
            .into_iter()
            .zip(embeddings)
            .map(|(candidate, embedding)| {
                let analyze = candidate.info.supports_structural_analysis;
                (self.build_record(candidate, embedding), analyze)
            })
            .collect();

        // (c) per-file extraction on blocking workers
        self.enter(ScanPhase::Analyzing, position);
        let mut analyses = JoinSet::new();
        for (slot, (record, analyze)) in records.iter_mut().enumerate() {
            if !*analyze {
                continue;
            }
            let content = std::mem::take(&mut record.content);
            let extractor = self.extractor.clone();
            let (id, path, language) = (record.id.clone(), record.path.clone(), record.language.clone());
            analyses.spawn_blocking(move || {
                let analysis = extractor.analyze(&id, &path, &content, &language);
                (slot, content, analysis)
            });
        }
        while let Some(joined) = analyses.join_next().await {
            match joined {
                Ok((slot, content, analysis)) => {
                    records[slot].0.content = content;
                    records[slot].0.analysis = Some(analysis);
                }
                Err(e) => warn!("Analysis task failed: {e}"),
            }
        }
        if self.config.embedding.enabled && self.config.embedding.embed_chunks && embedding_ok {
            self.embed_chunks(&mut records, stats).await;
        }

        // (d) persist with per-row acknowledgement
        self.enter(ScanPhase::Persisting, position);
        let store = self.store.clone();
        let mut guard = store.lock().await;
        for (mut record, analyze) in records {
            if analyze && record.analysis.is_none() {
                stats.failed += 1;
                continue;
            }
            match guard.persist_file(&self.project, &record, record.analysis.as_ref()) {
                Ok(acks) => {
                    let confirmed = acks.iter().filter(|a| a.is_confirmed()).count();
                    stats.ack_success += confirmed;
                    stats.ack_failed += acks.len() - confirmed;
                    stats.indexed += 1;
                    stats.total_lines += record.line_count;
                    self.progress.emit(ProgressEvent::FileIndexed {
                        path: record.path.clone(),
                        language: record.language.clone(),
                        line_count: record.line_count,
                        had_embedding: record.embedding.is_some(),
                    });
                }
                Err(e) => {
                    warn!("Failed to persist {}: {e}", record.path);
                    stats.ack_failed += 1;
                    stats.failed += 1;
                    continue;
                }
            }

            // (e) only metadata stays resident
            record.release_content();
            self.records.insert(record.path.clone(), record);
        }
        drop(guard);

        // (f)
        self.check_memory(stats);
    }

    async fn read_batch(
        &mut self,
        batch: &[WalkedFile],
        stored: &HashMap<String, StoredFile>,
        detector: ChangeDetector,
        stats: &mut ScanStats,
    ) -> Vec<Candidate> {
        let semaphore = Arc::new(Semaphore::new(self.config.scan.read_concurrency.max(1)));
        let max_bytes = self.config.scan.max_file_bytes;
        let mut reads = JoinSet::new();
        for (slot, walked) in batch.iter().cloned().enumerate() {
            let recorded = stored.get(&walked.relative_path).cloned();
            let classifier = self.classifier.clone();
            let semaphore = semaphore.clone();
            reads.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let path = walked.relative_path.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    read_one(walked, recorded.as_ref(), detector, classifier.as_ref(), max_bytes)
                })
                .await;
                (slot, path, outcome)
            });
        }

        let mut ready: Vec<(usize, Candidate)> = Vec::new();
        let mut touches: Vec<(WalkedFile, DateTime<Utc>)> = Vec::new();
        while let Some(joined) = reads.join_next().await {
            stats.processed += 1;
            let (slot, path, outcome) = match joined {
                Ok(parts) => parts,
                Err(e) => {
                    warn!("Read task failed: {e}");
                    stats.failed += 1;
                    continue;
                }
            };
            match outcome {
                Ok(Ok(ReadOutcome::Ready(candidate))) => ready.push((slot, candidate)),
                Ok(Ok(ReadOutcome::UnchangedByMtime { walked, size })) => {
                    stats.skipped_mtime += 1;
                    if let Some(known) = stored.get(&walked.relative_path) {
                        self.remember(&walked, known, known.mtime, size);
                    }
                }
                Ok(Ok(ReadOutcome::UnchangedByHash { walked, mtime })) => touches.push((walked, mtime)),
                Ok(Ok(ReadOutcome::Oversize)) => {
                    debug!("Skipping oversize file {path}");
                    stats.skipped_oversize += 1;
                }
                Ok(Err(e)) => {
                    warn!("Failed to read {path}: {e}");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!("Read task for {path} failed: {e}");
                    stats.failed += 1;
                }
            }
        }

        if !touches.is_empty() {
            let store = self.store.clone();
            let mut guard = store.lock().await;
            for (walked, mtime) in touches {
                stats.skipped_hash += 1;
                if let Err(e) = guard.touch_file(&self.project, &walked.relative_path, mtime) {
                    warn!("Failed to touch {}: {e}", walked.relative_path);
                }
                if let Some(known) = stored.get(&walked.relative_path) {
                    let size = self.records.get(&walked.relative_path).map_or(0, |r| r.size);
                    self.remember(&walked, known, mtime, size);
                }
            }
        }

        ready.sort_by_key(|(slot, _)| *slot);
        ready.into_iter().map(|(_, candidate)| candidate).collect()
    }

    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbedderError> {
        let embedder = self.embedder.clone();
        let secs = self.config.embedding.timeout_secs;
        let task = tokio::task::spawn_blocking(move || {
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            embed_all(embedder.as_ref(), &refs)
        });
        match timeout(Duration::from_secs(secs), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(EmbedderError::InferenceFailed(e.to_string())),
            Err(_) => Err(EmbedderError::Timeout(secs)),
        }
    }

    async fn embed_chunks(&self, records: &mut [(IndexedFileRecord, bool)], stats: &mut ScanStats) {
        let max_chars = self.config.embedding.max_chars;
        let mut slots: Vec<(usize, usize)> = Vec::new();
        let mut texts: Vec<String> = Vec::new();
        for (r, (record, _)) in records.iter().enumerate() {
            if let Some(analysis) = &record.analysis {
                for (c, chunk) in analysis.chunks.iter().enumerate() {
                    slots.push((r, c));
                    texts.push(prepare_text(&chunk.content, max_chars).into_owned());
                }
            }
        }
        if texts.is_empty() {
            return;
        }
        match self.embed_texts(texts).await {
            Ok(vectors) => {
                for ((r, c), vector) in slots.into_iter().zip(vectors) {
                    if let Some(analysis) = records[r].0.analysis.as_mut() {
                        analysis.chunks[c].embedding = Some(vector);
                    }
                }
            }
            Err(e) => {
                warn!("Chunk embedding failed: {e}");
                stats.embedding_failures += 1;
            }
        }
    }

    async fn prune_missing(
        &mut self,
        stored: &HashMap<String, StoredFile>,
        present: &HashSet<String>,
        stats: &mut ScanStats,
    ) {
        let mut missing: Vec<&String> = stored.keys().filter(|p| !present.contains(*p)).collect();
        if missing.is_empty() {
            return;
        }
        missing.sort();
        let store = self.store.clone();
        let mut guard = store.lock().await;
        for path in missing {
            match guard.remove_file(&self.project, path) {
                Ok(true) => {
                    debug!("Pruned {path}");
                    stats.pruned += 1;
                }
                Ok(false) => {}
                Err(e) => warn!("Failed to prune {path}: {e}"),
            }
            self.records.remove(path.as_str());
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn build_record(&self, candidate: Candidate, embedding: Option<Vec<f32>>) -> IndexedFileRecord {
        let path = candidate.walked.relative_path;
        IndexedFileRecord {
            id: file_id(&self.project, &path),
            name: file_name(&path).to_string(),
            extension: extension_of(&path),
            language: candidate.info.language_id,
            content_hash: candidate.content_hash,
            size: candidate.size,
            line_count: candidate.content.lines().count(),
            mtime: candidate.mtime,
            last_indexed: Some(Utc::now()),
            embedding,
            content: candidate.content,
            analysis: None,
            path,
        }
    }

    /// Keep an index entry for a file that was not re-read.
    fn remember(&mut self, walked: &WalkedFile, known: &StoredFile, mtime: DateTime<Utc>, size: u64) {
        let path = &walked.relative_path;
        if let Some(record) = self.records.get_mut(path) {
            record.mtime = mtime;
            return;
        }
        let info = self.classifier.classify(file_name(path), &[]);
        self.records.insert(
            path.clone(),
            IndexedFileRecord {
                id: known.id.clone(),
                path: path.clone(),
                name: file_name(path).to_string(),
                extension: extension_of(path),
                language: info.language_id,
                content_hash: known.content_hash.clone(),
                size,
                line_count: 0,
                mtime,
                last_indexed: None,
                embedding: None,
                content: String::new(),
                analysis: None,
            },
        );
    }

    fn check_memory(&mut self, stats: &mut ScanStats) {
        let Some(rss) = resident_memory_bytes() else {
            return;
        };
        let limit = self.config.scan.memory_high_water_mb.saturating_mul(1024 * 1024);
        if rss <= limit {
            return;
        }
        warn!(
            "Resident memory {} MB over {} MB, shrinking record index",
            rss / (1024 * 1024),
            self.config.scan.memory_high_water_mb
        );
        for record in self.records.values_mut() {
            record.embedding = None;
            record.release_content();
        }
        self.records.shrink_to_fit();
        stats.memory_shrinks += 1;
    }

    fn enter(&mut self, phase: ScanPhase, position: Position) {
        self.phase = phase;
        self.progress.emit(ProgressEvent::ScanProgress {
            phase,
            processed: position.processed,
            total: position.total,
            batch: position.batch,
            batches: position.batches,
        });
    }

    fn finish(&mut self, started: Instant, stats: ScanStats, result: Result<(), ScanError>) -> ScanReport {
        let duration_ms = started.elapsed().as_millis() as u64;
        let error = result.err().map(|e| e.to_string());
        let success = error.is_none();
        self.phase = if success { ScanPhase::Complete } else { ScanPhase::Error };

        match &error {
            None => info!(
                "Scan of {} complete in {duration_ms}ms: {} indexed, {} unchanged, {} failed, {} pruned",
                self.root.display(),
                stats.indexed,
                stats.skipped_mtime + stats.skipped_hash,
                stats.failed,
                stats.pruned
            ),
            Some(e) => warn!("Scan of {} failed: {e}", self.root.display()),
        }

        self.progress.emit(ProgressEvent::ScanCompleted {
            root: self.root.display().to_string(),
            file_count: stats.total_files,
            total_lines: stats.total_lines,
            stats: stats.clone(),
            duration_ms,
            success,
        });
        ScanReport {
            project: self.project.clone(),
            stats,
            duration_ms,
            success,
            error,
        }
    }
}
