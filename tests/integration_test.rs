/// End-to-end tests for the scan pipeline.
///
/// Tests the complete flow:
///   Config → Db → Embedder → Indexer (walk, detect, embed, extract, persist)
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use codeindex::config::Config;
use codeindex::db::{Db, IndexStore, StoreError, StoredFile, WriteAck};
use codeindex::embedder::mock::MockEmbedder;
use codeindex::embedder::{Embedder, EmbedderError};
use codeindex::indexer::core::file_id;
use codeindex::indexer::types::{AnalysisResult, DefinitionKind, IndexedFileRecord};
use codeindex::indexer::{Indexer, ProgressEvent, ScanMode, ScanPhase};
use codeindex::registry::project_key;
use tempfile::tempdir;
use tokio::sync::Mutex as TokioMutex;

fn write(root: &Path, rel: &str, content: &str) -> PathBuf {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

fn bump_mtime(path: &Path, secs: u64) {
    let file = fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
}

fn setup(root: &Path, config: Config) -> (Arc<TokioMutex<Db>>, Indexer<Db>) {
    let db = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
    let indexer = Indexer::new(root, db.clone(), Arc::new(MockEmbedder::new(16)), config).unwrap();
    (db, indexer)
}

const GREET_TS: &str = "// Greeting helpers.\n// Used by the CLI.\n\nexport function greet(name: string): string {\n  return \"Hello, \" + name;\n}\n\n// More helpers will\n// live here later.\n// End of module.\n";

const SHAPES_PY: &str = "class Shapes:\n    def area(self, r):\n        def square(x):\n            return x * x\n        return square(r) * 3.14\n\n    def perimeter(self, r):\n        return 2 * 3.14 * r\n";

/// Scenario A: 10-line single-function file
#[tokio::test]
async fn test_single_function_file() {
    let dir = tempdir().unwrap();
    write(dir.path(), "greet.ts", GREET_TS);
    let (db, mut indexer) = setup(dir.path(), Config::default());

    let report = indexer.scan(ScanMode::Incremental).await;
    assert!(report.success);
    assert_eq!(report.stats.indexed, 1);
    assert_eq!(report.project, project_key(dir.path()));

    let db = db.lock().await;
    let record = db.load_file(indexer.project(), "greet.ts").unwrap().unwrap();
    assert_eq!(record.line_count, 10);
    assert_eq!(record.language, "typescript");
    assert_eq!(record.embedding.as_ref().map(|e| e.len()), Some(16));

    let defs = db.definitions_for(&record.id).unwrap();
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].name, "greet");
    assert_eq!(defs[0].kind, DefinitionKind::Function);
    assert!(defs[0].is_exported);

    assert_eq!(db.chunks_for(&record.id).unwrap().len(), 1);
    let complexity = db.complexity_for(&record.id).unwrap().unwrap();
    assert_eq!(complexity.cyclomatic, 1);
    assert!(complexity.issues.is_empty());
}

/// Scenario B: 120 lines with window 50 / overlap 10
#[tokio::test]
async fn test_windowed_chunks() {
    let dir = tempdir().unwrap();
    let body: String = (1..=120).map(|i| format!("let v{i} = {i};\n")).collect();
    write(dir.path(), "long.js", &body);
    let (db, mut indexer) = setup(dir.path(), Config::default());

    assert!(indexer.scan(ScanMode::Incremental).await.success);

    let db = db.lock().await;
    let chunks = db.chunks_for(&file_id(indexer.project(), "long.js")).unwrap();
    let bounds: Vec<(usize, usize)> = chunks.iter().map(|c| (c.start_line, c.end_line)).collect();
    assert_eq!(bounds, vec![(1, 50), (41, 90), (81, 120)]);
}

/// Scenario C: class with two methods, one holding a nested function
#[tokio::test]
async fn test_nested_definitions_parenting() {
    let dir = tempdir().unwrap();
    write(dir.path(), "shapes.py", SHAPES_PY);
    let (db, mut indexer) = setup(dir.path(), Config::default());

    assert!(indexer.scan(ScanMode::Incremental).await.success);

    let db = db.lock().await;
    let defs = db.definitions_for(&file_id(indexer.project(), "shapes.py")).unwrap();
    assert_eq!(defs.len(), 4);
    let by_name: HashMap<&str, _> = defs.iter().map(|d| (d.name.as_str(), d)).collect();
    let class = by_name["Shapes"];
    let area = by_name["area"];
    assert_eq!(area.parent_definition_id.as_deref(), Some(class.id.as_str()));
    assert_eq!(by_name["perimeter"].parent_definition_id.as_deref(), Some(class.id.as_str()));
    assert_eq!(by_name["square"].parent_definition_id.as_deref(), Some(area.id.as_str()));

    for def in &defs {
        if let Some(pid) = &def.parent_definition_id {
            let parent = defs.iter().find(|d| &d.id == pid).unwrap();
            assert!(parent.start_line < def.start_line);
            assert!(parent.end_line >= def.end_line);
        }
    }
}

/// Scenario D: mtime bump, same bytes
#[tokio::test]
async fn test_touch_without_content_change() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "greet.ts", GREET_TS);
    let (db, mut indexer) = setup(dir.path(), Config::default());
    assert!(indexer.scan(ScanMode::Incremental).await.success);

    let id = file_id(indexer.project(), "greet.ts");
    let (before_defs, before_chunks, before_mtime) = {
        let db = db.lock().await;
        let record = db.load_file(indexer.project(), "greet.ts").unwrap().unwrap();
        (db.definitions_for(&id).unwrap(), db.chunks_for(&id).unwrap(), record.mtime)
    };

    bump_mtime(&path, 60);
    let report = indexer.scan(ScanMode::Incremental).await;
    assert!(report.success);
    assert_eq!(report.stats.skipped_hash, 1);
    assert_eq!(report.stats.indexed, 0);
    assert_eq!(report.stats.ack_success, 0);

    let db = db.lock().await;
    assert_eq!(db.file_count(indexer.project()).unwrap(), 1);
    let record = db.load_file(indexer.project(), "greet.ts").unwrap().unwrap();
    assert_eq!(record.id, id);
    assert!(record.mtime > before_mtime);
    assert_eq!(db.definitions_for(&id).unwrap(), before_defs);
    assert_eq!(db.chunks_for(&id).unwrap(), before_chunks);
}

struct SlowEmbedder;

impl Embedder for SlowEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedderError> {
        std::thread::sleep(Duration::from_secs(2));
        Ok(vec![0.0; 4])
    }

    fn dimensions(&self) -> usize {
        4
    }
}

/// Scenario E: embedding times out, the batch still lands
#[tokio::test]
async fn test_embedding_timeout_still_persists() {
    let dir = tempdir().unwrap();
    write(dir.path(), "greet.ts", GREET_TS);
    write(dir.path(), "shapes.py", SHAPES_PY);
    let mut config = Config::default();
    config.embedding.timeout_secs = 1;
    let db = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
    let mut indexer = Indexer::new(dir.path(), db.clone(), Arc::new(SlowEmbedder), config).unwrap();

    let report = indexer.scan(ScanMode::Incremental).await;
    assert!(report.success);
    assert_eq!(report.stats.embedding_failures, 1);
    assert_eq!(report.stats.embedded, 0);
    assert_eq!(report.stats.indexed, 2);
    assert_eq!(report.stats.ack_failed, 0);

    let db = db.lock().await;
    let record = db.load_file(indexer.project(), "shapes.py").unwrap().unwrap();
    assert!(record.embedding.is_none());
    assert_eq!(db.definitions_for(&record.id).unwrap().len(), 4);
    assert!(db.complexity_for(&record.id).unwrap().is_some());
}

#[tokio::test]
async fn test_rescan_idempotent_and_deterministic() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/greet.ts", GREET_TS);
    write(dir.path(), "src/shapes.py", SHAPES_PY);
    let (db, mut indexer) = setup(dir.path(), Config::default());

    assert!(indexer.scan(ScanMode::Incremental).await.success);
    let id = file_id(indexer.project(), "src/shapes.py");
    let first = db.lock().await.definitions_for(&id).unwrap();

    let unchanged = indexer.scan(ScanMode::Incremental).await;
    assert_eq!(unchanged.stats.skipped_mtime, 2);
    assert_eq!(unchanged.stats.indexed, 0);

    let forced = indexer.scan(ScanMode::Force).await;
    assert_eq!(forced.stats.indexed, 2);
    let db = db.lock().await;
    assert_eq!(db.definitions_for(&id).unwrap(), first);
    assert_eq!(db.file_count(indexer.project()).unwrap(), 2);
}

#[tokio::test]
async fn test_changed_content_replaces_children() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "shapes.py", SHAPES_PY);
    let (db, mut indexer) = setup(dir.path(), Config::default());
    assert!(indexer.scan(ScanMode::Incremental).await.success);

    fs::write(&path, "def only():\n    return 1\n").unwrap();
    bump_mtime(&path, 60);
    let report = indexer.scan(ScanMode::Incremental).await;
    assert_eq!(report.stats.indexed, 1);

    let db = db.lock().await;
    let defs = db.definitions_for(&file_id(indexer.project(), "shapes.py")).unwrap();
    let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["only"]);
}

#[tokio::test]
async fn test_exclusions_and_pruning() {
    let dir = tempdir().unwrap();
    write(dir.path(), "src/app.ts", "export const app = 1;\n");
    write(dir.path(), "node_modules/pkg/index.js", "module.exports = 1;\n");
    write(dir.path(), "dist/bundle.min.js", "var a=1;\n");
    let gone = write(dir.path(), "src/old.ts", "export const old = 1;\n");
    let (db, mut indexer) = setup(dir.path(), Config::default());

    let report = indexer.scan(ScanMode::Incremental).await;
    assert_eq!(report.stats.total_files, 2);
    assert_eq!(
        db.lock().await.list_paths(indexer.project()).unwrap(),
        vec!["src/app.ts".to_string(), "src/old.ts".to_string()]
    );

    fs::remove_file(gone).unwrap();
    let report = indexer.scan(ScanMode::Incremental).await;
    assert_eq!(report.stats.pruned, 1);
    assert!(indexer.record("src/old.ts").is_none());
    assert_eq!(
        db.lock().await.list_paths(indexer.project()).unwrap(),
        vec!["src/app.ts".to_string()]
    );
}

#[tokio::test]
async fn test_binary_file_stored_without_analysis() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("blob.json"), b"{\"a\":\x00\x01\x02}").unwrap();
    let (db, mut indexer) = setup(dir.path(), Config::default());

    let report = indexer.scan(ScanMode::Incremental).await;
    assert_eq!(report.stats.indexed, 1);
    assert_eq!(report.stats.embedded, 0);

    let db = db.lock().await;
    let record = db.load_file(indexer.project(), "blob.json").unwrap().unwrap();
    assert!(record.embedding.is_none());
    assert!(db.chunks_for(&record.id).unwrap().is_empty());
    assert!(db.complexity_for(&record.id).unwrap().is_none());
}

#[tokio::test]
async fn test_oversize_files_skipped() {
    let dir = tempdir().unwrap();
    write(dir.path(), "big.js", &"x".repeat(2048));
    write(dir.path(), "small.js", "let a = 1;\n");
    let mut config = Config::default();
    config.scan.max_file_bytes = 1024;
    let (_db, mut indexer) = setup(dir.path(), config);

    let report = indexer.scan(ScanMode::Incremental).await;
    assert_eq!(report.stats.skipped_oversize, 1);
    assert_eq!(report.stats.indexed, 1);
}

#[tokio::test]
async fn test_index_paths_updates_and_removes() {
    let dir = tempdir().unwrap();
    let a = write(dir.path(), "a.ts", "export const a = 1;\n");
    let b = write(dir.path(), "b.ts", "export const b = 1;\n");
    let (db, mut indexer) = setup(dir.path(), Config::default());
    assert!(indexer.scan(ScanMode::Incremental).await.success);

    fs::write(&a, "export function a() {\n  return 2;\n}\n").unwrap();
    bump_mtime(&a, 60);
    fs::remove_file(&b).unwrap();
    let ignored = write(dir.path(), "node_modules/x.js", "1;\n");

    let report = indexer.index_paths(&[a.clone(), b, ignored]).await;
    assert!(report.success);
    assert_eq!(report.stats.total_files, 1);
    assert_eq!(report.stats.indexed, 1);
    assert_eq!(report.stats.pruned, 1);

    let db = db.lock().await;
    assert_eq!(db.list_paths(indexer.project()).unwrap(), vec!["a.ts".to_string()]);
    let defs = db.definitions_for(&file_id(indexer.project(), "a.ts")).unwrap();
    assert_eq!(defs[0].kind, DefinitionKind::Function);
}

#[tokio::test]
async fn test_progress_events_in_order() {
    let dir = tempdir().unwrap();
    write(dir.path(), "greet.ts", GREET_TS);
    let (_db, mut indexer) = setup(dir.path(), Config::default());
    let mut rx = indexer.subscribe();

    indexer.scan(ScanMode::Incremental).await;
    assert_eq!(indexer.phase(), ScanPhase::Complete);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let root = indexer.root().display().to_string();
    assert!(matches!(events.first(), Some(ProgressEvent::ScanProgress { phase: ScanPhase::Scanning, .. })));

    let started = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::ScanStarted {
                root,
                mode,
                total_files,
                ..
            } => Some((root.clone(), *mode, *total_files)),
            _ => None,
        })
        .unwrap();
    assert_eq!(started, (root.clone(), ScanMode::Incremental, 1));

    let indexed = events
        .iter()
        .find_map(|e| match e {
            ProgressEvent::FileIndexed {
                path,
                language,
                line_count,
                had_embedding,
            } => Some((path.clone(), language.clone(), *line_count, *had_embedding)),
            _ => None,
        })
        .unwrap();
    assert_eq!(indexed, ("greet.ts".to_string(), "typescript".to_string(), 10, true));

    match events.last() {
        Some(ProgressEvent::ScanCompleted {
            root: done_root,
            file_count,
            total_lines,
            success,
            ..
        }) => {
            assert_eq!(done_root, &root);
            assert_eq!(*file_count, 1);
            assert_eq!(*total_lines, 10);
            assert!(*success);
        }
        other => panic!("unexpected last event {other:?}"),
    }
}

#[tokio::test]
async fn test_forced_scan_reports_mode() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.ts", "export const a = 1;\n");
    let (_db, mut indexer) = setup(dir.path(), Config::default());
    let mut rx = indexer.subscribe();

    indexer.scan(ScanMode::Force).await;
    let mut modes = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let ProgressEvent::ScanStarted { mode, .. } = event {
            modes.push(mode);
        }
    }
    assert_eq!(modes, vec![ScanMode::Force]);
}

#[tokio::test]
async fn test_binary_rewrite_clears_children() {
    let dir = tempdir().unwrap();
    let path = write(dir.path(), "a.c", "int main(void) {\n  return 0;\n}\n");
    let (db, mut indexer) = setup(dir.path(), Config::default());
    assert!(indexer.scan(ScanMode::Incremental).await.success);
    let id = file_id(indexer.project(), "a.c");
    {
        let db = db.lock().await;
        assert_eq!(db.definitions_for(&id).unwrap().len(), 1);
        assert!(db.complexity_for(&id).unwrap().is_some());
    }

    fs::write(&path, b"\x7fELF\x00\x02\x01\x01\x00\x00").unwrap();
    bump_mtime(&path, 60);
    let report = indexer.scan(ScanMode::Incremental).await;
    assert_eq!(report.stats.indexed, 1);

    let db = db.lock().await;
    let record = db.load_file(indexer.project(), "a.c").unwrap().unwrap();
    assert!(record.embedding.is_none());
    assert!(db.definitions_for(&id).unwrap().is_empty());
    assert!(db.dependencies_for(&id).unwrap().is_empty());
    assert!(db.chunks_for(&id).unwrap().is_empty());
    assert!(db.complexity_for(&id).unwrap().is_none());
}

/// Refuses every row for paths under `broken/`.
struct FlakyStore {
    inner: Db,
}

impl IndexStore for FlakyStore {
    fn load_file_states(&self, project: &str) -> Result<HashMap<String, StoredFile>, StoreError> {
        self.inner.load_file_states(project)
    }

    fn persist_file(
        &mut self,
        project: &str,
        record: &IndexedFileRecord,
        analysis: Option<&AnalysisResult>,
    ) -> Result<Vec<WriteAck>, StoreError> {
        if record.path.starts_with("broken/") {
            return Err(StoreError::Unconfirmed(record.path.clone()));
        }
        self.inner.persist_file(project, record, analysis)
    }

    fn touch_file(&mut self, project: &str, path: &str, mtime: DateTime<Utc>) -> Result<bool, StoreError> {
        self.inner.touch_file(project, path, mtime)
    }

    fn remove_file(&mut self, project: &str, path: &str) -> Result<bool, StoreError> {
        self.inner.remove_file(project, path)
    }
}

#[tokio::test]
async fn test_persistence_failure_isolated() {
    let dir = tempdir().unwrap();
    write(dir.path(), "broken/a.ts", "export const a = 1;\n");
    write(dir.path(), "ok/b.ts", "export const b = 1;\n");
    let store = Arc::new(TokioMutex::new(FlakyStore {
        inner: Db::open_in_memory().unwrap(),
    }));
    let mut indexer = Indexer::new(dir.path(), store.clone(), Arc::new(MockEmbedder::new(8)), Config::default()).unwrap();

    let report = indexer.scan(ScanMode::Incremental).await;
    assert!(report.success);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.ack_failed, 1);
    assert_eq!(report.stats.indexed, 1);
    assert!(indexer.record("broken/a.ts").is_none());
    assert_eq!(
        store.lock().await.inner.list_paths(indexer.project()).unwrap(),
        vec!["ok/b.ts".to_string()]
    );
}

#[tokio::test]
async fn test_config_roundtrip_drives_scan() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("custom.json");
    let mut config = Config::default();
    config.exclude_patterns = vec!["generated".to_string()];
    config.save(config_path.to_str().unwrap()).unwrap();

    let project = dir.path().join("project");
    write(&project, "generated/api.ts", "export const api = 1;\n");
    write(&project, "main.ts", "export const main = 1;\n");

    let loaded = Config::load(config_path.to_str().unwrap()).unwrap();
    loaded.validate().unwrap();
    let (db, mut indexer) = setup(&project, loaded);
    indexer.scan(ScanMode::Incremental).await;
    assert_eq!(
        db.lock().await.list_paths(indexer.project()).unwrap(),
        vec!["main.ts".to_string()]
    );
}
