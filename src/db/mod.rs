//! Index store on SQLite.
use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use thiserror::Error;
use tracing::info;

use crate::indexer::types::{AnalysisResult, IndexedFileRecord};

pub mod files;
pub mod models;

pub use models::{RowKind, StoredFile, WriteAck};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS indexed_files (
    id TEXT PRIMARY KEY,
    project TEXT NOT NULL,
    path TEXT NOT NULL,
    name TEXT NOT NULL,
    extension TEXT NOT NULL,
    language TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    size INTEGER NOT NULL,
    line_count INTEGER NOT NULL,
    mtime DATETIME NOT NULL,
    last_indexed DATETIME NOT NULL,
    embedding BLOB,
    UNIQUE(project, path)
);

CREATE INDEX IF NOT EXISTS idx_files_project ON indexed_files(project);
CREATE INDEX IF NOT EXISTS idx_files_language ON indexed_files(language);

CREATE TABLE IF NOT EXISTS definitions (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL,
    project TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT,
    kind TEXT NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    signature TEXT NOT NULL,
    is_exported INTEGER NOT NULL,
    is_async INTEGER NOT NULL,
    is_static INTEGER NOT NULL,
    is_abstract INTEGER NOT NULL,
    visibility TEXT,
    parent_definition_id TEXT,
    parameters TEXT NOT NULL,
    language TEXT NOT NULL,
    metadata TEXT NOT NULL,
    FOREIGN KEY (file_id) REFERENCES indexed_files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_def_file ON definitions(file_id);
CREATE INDEX IF NOT EXISTS idx_def_name ON definitions(name);
CREATE INDEX IF NOT EXISTS idx_def_kind ON definitions(kind);

CREATE TABLE IF NOT EXISTS dependencies (
    id TEXT PRIMARY KEY,
    source_file_id TEXT NOT NULL,
    project TEXT NOT NULL,
    target_path TEXT NOT NULL,
    resolved_path TEXT,
    import_kind TEXT NOT NULL,
    statement TEXT NOT NULL,
    imported_names TEXT NOT NULL,
    flags TEXT NOT NULL,
    line INTEGER NOT NULL,
    language TEXT NOT NULL,
    FOREIGN KEY (source_file_id) REFERENCES indexed_files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_dep_source ON dependencies(source_file_id);
CREATE INDEX IF NOT EXISTS idx_dep_target ON dependencies(target_path);

CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    file_id TEXT NOT NULL,
    project TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    start_char INTEGER NOT NULL,
    end_char INTEGER NOT NULL,
    content TEXT NOT NULL,
    chunk_type TEXT NOT NULL,
    context_before TEXT,
    context_after TEXT,
    embedding BLOB,
    FOREIGN KEY (file_id) REFERENCES indexed_files(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_chunk_file ON chunks(file_id);

CREATE TABLE IF NOT EXISTS complexity_reports (
    file_id TEXT PRIMARY KEY,
    project TEXT NOT NULL,
    logical_lines INTEGER NOT NULL,
    comment_lines INTEGER NOT NULL,
    blank_lines INTEGER NOT NULL,
    cyclomatic INTEGER NOT NULL,
    max_nesting INTEGER NOT NULL,
    return_count INTEGER NOT NULL,
    maintainability_index REAL NOT NULL,
    issues TEXT NOT NULL,
    FOREIGN KEY (file_id) REFERENCES indexed_files(id) ON DELETE CASCADE
);
"#;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("file row for {0} was not confirmed")]
    Unconfirmed(String),
}

/// The durable side of the scan pipeline.
///
/// Every row written is acknowledged individually; callers count
/// confirmations instead of trusting that a call returned.
pub trait IndexStore: Send {
    /// path → what was stored for it, for one project.
    fn load_file_states(&self, project: &str) -> Result<HashMap<String, StoredFile>, StoreError>;

    /// Upsert the file row on `(project, path)` and replace its child rows.
    fn persist_file(
        &mut self,
        project: &str,
        record: &IndexedFileRecord,
        analysis: Option<&AnalysisResult>,
    ) -> Result<Vec<WriteAck>, StoreError>;

    /// Refresh `mtime`/`last_indexed` without rewriting any content rows.
    fn touch_file(&mut self, project: &str, path: &str, mtime: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Delete the file row and, by cascade, everything extracted from it.
    fn remove_file(&mut self, project: &str, path: &str) -> Result<bool, StoreError>;
}

/// A wrapper around a SQLite connection initialized with the index schema.
pub struct Db {
    pub(crate) conn: Connection,
}

impl Db {
    /// Open a database connection at the given path and initialize the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> rusqlite::Result<Self> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn })
    }
}

/// Serialize a float32 vector into little-endian bytes for a BLOB column.
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

pub fn deserialize_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}
