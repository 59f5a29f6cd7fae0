use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Params, Result, Row, Transaction, params};
use tracing::{debug, warn};

use super::models::{RowKind, StoredFile, WriteAck, from_json, from_tag, tag_of};
use super::{Db, IndexStore, StoreError, deserialize_vector, serialize_vector};
use crate::indexer::types::{
    AnalysisResult, Chunk, ComplexityReport, Definition, Dependency, IndexedFileRecord,
};

const UPSERT_FILE: &str = r#"
INSERT INTO indexed_files (id, project, path, name, extension, language, content_hash,
                           size, line_count, mtime, last_indexed, embedding)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
ON CONFLICT(project, path) DO UPDATE SET
    name = excluded.name,
    extension = excluded.extension,
    language = excluded.language,
    content_hash = excluded.content_hash,
    size = excluded.size,
    line_count = excluded.line_count,
    mtime = excluded.mtime,
    last_indexed = excluded.last_indexed,
    embedding = excluded.embedding
RETURNING id
"#;

const INSERT_DEFINITION: &str = r#"
INSERT INTO definitions (id, file_id, project, name, qualified_name, kind, start_line, end_line,
                         signature, is_exported, is_async, is_static, is_abstract, visibility,
                         parent_definition_id, parameters, language, metadata)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
ON CONFLICT(id) DO UPDATE SET
    end_line = excluded.end_line,
    signature = excluded.signature,
    parent_definition_id = excluded.parent_definition_id,
    metadata = excluded.metadata
RETURNING id
"#;

const INSERT_DEPENDENCY: &str = r#"
INSERT INTO dependencies (id, source_file_id, project, target_path, resolved_path, import_kind,
                          statement, imported_names, flags, line, language)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
ON CONFLICT(id) DO UPDATE SET
    statement = excluded.statement,
    imported_names = excluded.imported_names,
    flags = excluded.flags
RETURNING id
"#;

const INSERT_CHUNK: &str = r#"
INSERT INTO chunks (id, file_id, project, chunk_index, start_line, end_line, start_char, end_char,
                    content, chunk_type, context_before, context_after, embedding)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
ON CONFLICT(id) DO UPDATE SET
    content = excluded.content,
    chunk_type = excluded.chunk_type,
    embedding = excluded.embedding
RETURNING id
"#;

const UPSERT_COMPLEXITY: &str = r#"
INSERT INTO complexity_reports (file_id, project, logical_lines, comment_lines, blank_lines,
                                cyclomatic, max_nesting, return_count, maintainability_index, issues)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT(file_id) DO UPDATE SET
    logical_lines = excluded.logical_lines,
    comment_lines = excluded.comment_lines,
    blank_lines = excluded.blank_lines,
    cyclomatic = excluded.cyclomatic,
    max_nesting = excluded.max_nesting,
    return_count = excluded.return_count,
    maintainability_index = excluded.maintainability_index,
    issues = excluded.issues
RETURNING file_id
"#;

/// Run one `... RETURNING id` write and turn the outcome into an ack.
fn acknowledge<P: Params>(tx: &Transaction<'_>, kind: RowKind, proposed_id: &str, sql: &str, params: P) -> WriteAck {
    match tx
        .query_row(sql, params, |row| row.get::<_, String>(0))
        .optional()
    {
        Ok(Some(durable)) => WriteAck::confirmed(kind, proposed_id, durable),
        Ok(None) => WriteAck::failed(kind, proposed_id),
        Err(e) => {
            warn!("Failed to write {} {proposed_id}: {e}", kind.as_str());
            WriteAck::failed(kind, proposed_id)
        }
    }
}

fn write_definition(tx: &Transaction<'_>, project: &str, file_id: &str, def: &Definition) -> Result<WriteAck, StoreError> {
    let parameters = serde_json::to_string(&def.parameters)?;
    let metadata = serde_json::to_string(&def.metadata)?;
    Ok(acknowledge(
        tx,
        RowKind::Definition,
        &def.id,
        INSERT_DEFINITION,
        params![
            def.id,
            file_id,
            project,
            def.name,
            def.qualified_name,
            tag_of(&def.kind),
            def.start_line as i64,
            def.end_line as i64,
            def.signature,
            def.is_exported,
            def.is_async,
            def.is_static,
            def.is_abstract,
            def.visibility.as_ref().map(tag_of),
            def.parent_definition_id,
            parameters,
            def.language,
            metadata,
        ],
    ))
}

fn write_dependency(tx: &Transaction<'_>, project: &str, file_id: &str, dep: &Dependency) -> Result<WriteAck, StoreError> {
    let names = serde_json::to_string(&dep.imported_names)?;
    let flags = serde_json::to_string(&dep.flags)?;
    Ok(acknowledge(
        tx,
        RowKind::Dependency,
        &dep.id,
        INSERT_DEPENDENCY,
        params![
            dep.id,
            file_id,
            project,
            dep.target_path,
            dep.resolved_path,
            tag_of(&dep.import_kind),
            dep.statement,
            names,
            flags,
            dep.line as i64,
            dep.language,
        ],
    ))
}

fn write_chunk(tx: &Transaction<'_>, project: &str, file_id: &str, chunk: &Chunk) -> WriteAck {
    acknowledge(
        tx,
        RowKind::Chunk,
        &chunk.id,
        INSERT_CHUNK,
        params![
            chunk.id,
            file_id,
            project,
            chunk.chunk_index as i64,
            chunk.start_line as i64,
            chunk.end_line as i64,
            chunk.start_char as i64,
            chunk.end_char as i64,
            chunk.content,
            tag_of(&chunk.chunk_type),
            chunk.context_before,
            chunk.context_after,
            chunk.embedding.as_deref().map(serialize_vector),
        ],
    )
}

fn write_complexity(tx: &Transaction<'_>, project: &str, file_id: &str, report: &ComplexityReport) -> Result<WriteAck, StoreError> {
    let issues = serde_json::to_string(&report.issues)?;
    Ok(acknowledge(
        tx,
        RowKind::Complexity,
        file_id,
        UPSERT_COMPLEXITY,
        params![
            file_id,
            project,
            report.logical_lines as i64,
            report.comment_lines as i64,
            report.blank_lines as i64,
            report.cyclomatic as i64,
            report.max_nesting as i64,
            report.return_count as i64,
            report.maintainability_index,
            issues,
        ],
    ))
}

impl IndexStore for Db {
    fn load_file_states(&self, project: &str) -> Result<HashMap<String, StoredFile>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, path, content_hash, mtime FROM indexed_files WHERE project = ?1")?;
        let rows = stmt.query_map(params![project], |row| {
            Ok(StoredFile {
                id: row.get(0)?,
                path: row.get(1)?,
                content_hash: row.get(2)?,
                mtime: row.get(3)?,
            })
        })?;

        let mut files = HashMap::new();
        for row in rows {
            let file = row?;
            files.insert(file.path.clone(), file);
        }
        Ok(files)
    }

    fn persist_file(
        &mut self,
        project: &str,
        record: &IndexedFileRecord,
        analysis: Option<&AnalysisResult>,
    ) -> Result<Vec<WriteAck>, StoreError> {
        let tx = self.conn.transaction()?;
        let last_indexed = record.last_indexed.unwrap_or_else(Utc::now);

        let file_id: Option<String> = tx
            .query_row(
                UPSERT_FILE,
                params![
                    record.id,
                    project,
                    record.path,
                    record.name,
                    record.extension,
                    record.language,
                    record.content_hash,
                    record.size as i64,
                    record.line_count as i64,
                    record.mtime,
                    last_indexed,
                    record.embedding.as_deref().map(serialize_vector),
                ],
                |row| row.get(0),
            )
            .optional()?;
        let Some(file_id) = file_id else {
            return Err(StoreError::Unconfirmed(record.path.clone()));
        };

        let mut acks = vec![WriteAck::confirmed(RowKind::File, &record.id, file_id.clone())];
        // Child rows describe the previous content; a file stored without analysis keeps none
        tx.execute("DELETE FROM definitions WHERE file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM dependencies WHERE source_file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM chunks WHERE file_id = ?1", params![file_id])?;
        tx.execute("DELETE FROM complexity_reports WHERE file_id = ?1", params![file_id])?;

        if let Some(analysis) = analysis {
            for def in &analysis.definitions {
                acks.push(write_definition(&tx, project, &file_id, def)?);
            }
            for dep in &analysis.dependencies {
                acks.push(write_dependency(&tx, project, &file_id, dep)?);
            }
            for chunk in &analysis.chunks {
                acks.push(write_chunk(&tx, project, &file_id, chunk));
            }
            acks.push(write_complexity(&tx, project, &file_id, &analysis.complexity)?);
        }

        tx.commit()?;
        debug!("Persisted {} ({} rows)", record.path, acks.len());
        Ok(acks)
    }

    fn touch_file(&mut self, project: &str, path: &str, mtime: DateTime<Utc>) -> Result<bool, StoreError> {
        let rows = self.conn.execute(
            "UPDATE indexed_files SET mtime = ?1, last_indexed = ?2 WHERE project = ?3 AND path = ?4",
            params![mtime, Utc::now(), project, path],
        )?;
        Ok(rows > 0)
    }

    fn remove_file(&mut self, project: &str, path: &str) -> Result<bool, StoreError> {
        // Cascade deletes definitions, dependencies, chunks, complexity
        let rows = self.conn.execute(
            "DELETE FROM indexed_files WHERE project = ?1 AND path = ?2",
            params![project, path],
        )?;
        Ok(rows > 0)
    }
}

// ── Read side ────────────────────────────────────────────────────────

fn file_from_row(row: &Row<'_>) -> Result<IndexedFileRecord> {
    let embedding: Option<Vec<u8>> = row.get(10)?;
    Ok(IndexedFileRecord {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        extension: row.get(3)?,
        language: row.get(4)?,
        content_hash: row.get(5)?,
        size: row.get::<_, i64>(6)? as u64,
        line_count: row.get::<_, i64>(7)? as usize,
        mtime: row.get(8)?,
        last_indexed: row.get(9)?,
        embedding: embedding.map(|b| deserialize_vector(&b)),
        content: String::new(),
        analysis: None,
    })
}

fn definition_from_row(row: &Row<'_>) -> Result<Definition> {
    Ok(Definition {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        qualified_name: row.get(3)?,
        kind: from_tag(row.get(4)?)?,
        start_line: row.get::<_, i64>(5)? as usize,
        end_line: row.get::<_, i64>(6)? as usize,
        signature: row.get(7)?,
        is_exported: row.get(8)?,
        is_async: row.get(9)?,
        is_static: row.get(10)?,
        is_abstract: row.get(11)?,
        visibility: row.get::<_, Option<String>>(12)?.map(from_tag).transpose()?,
        parent_definition_id: row.get(13)?,
        parameters: from_json(row.get(14)?)?,
        language: row.get(15)?,
        metadata: from_json(row.get(16)?)?,
    })
}

fn dependency_from_row(row: &Row<'_>) -> Result<Dependency> {
    Ok(Dependency {
        id: row.get(0)?,
        source_file_id: row.get(1)?,
        target_path: row.get(2)?,
        resolved_path: row.get(3)?,
        import_kind: from_tag(row.get(4)?)?,
        statement: row.get(5)?,
        imported_names: from_json(row.get(6)?)?,
        flags: from_json(row.get(7)?)?,
        line: row.get::<_, i64>(8)? as usize,
        language: row.get(9)?,
    })
}

fn chunk_from_row(row: &Row<'_>) -> Result<Chunk> {
    let embedding: Option<Vec<u8>> = row.get(11)?;
    Ok(Chunk {
        id: row.get(0)?,
        file_id: row.get(1)?,
        chunk_index: row.get::<_, i64>(2)? as usize,
        start_line: row.get::<_, i64>(3)? as usize,
        end_line: row.get::<_, i64>(4)? as usize,
        start_char: row.get::<_, i64>(5)? as usize,
        end_char: row.get::<_, i64>(6)? as usize,
        content: row.get(7)?,
        chunk_type: from_tag(row.get(8)?)?,
        context_before: row.get(9)?,
        context_after: row.get(10)?,
        embedding: embedding.map(|b| deserialize_vector(&b)),
    })
}

impl Db {
    /// Metadata for one file; `content` and `analysis` are never stored.
    pub fn load_file(&self, project: &str, path: &str) -> Result<Option<IndexedFileRecord>> {
        self.conn
            .query_row(
                "SELECT id, path, name, extension, language, content_hash, size, line_count, mtime, last_indexed, embedding
                 FROM indexed_files WHERE project = ?1 AND path = ?2",
                params![project, path],
                file_from_row,
            )
            .optional()
    }

    pub fn list_paths(&self, project: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path FROM indexed_files WHERE project = ?1 ORDER BY path")?;
        let rows = stmt.query_map(params![project], |row| row.get(0))?;
        rows.collect()
    }

    pub fn file_count(&self, project: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT count(*) FROM indexed_files WHERE project = ?1",
            params![project],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn definitions_for(&self, file_id: &str) -> Result<Vec<Definition>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, name, qualified_name, kind, start_line, end_line, signature,
                    is_exported, is_async, is_static, is_abstract, visibility,
                    parent_definition_id, parameters, language, metadata
             FROM definitions WHERE file_id = ?1 ORDER BY start_line, rowid",
        )?;
        let rows = stmt.query_map(params![file_id], definition_from_row)?;
        rows.collect()
    }

    pub fn dependencies_for(&self, file_id: &str) -> Result<Vec<Dependency>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_file_id, target_path, resolved_path, import_kind, statement,
                    imported_names, flags, line, language
             FROM dependencies WHERE source_file_id = ?1 ORDER BY line, rowid",
        )?;
        let rows = stmt.query_map(params![file_id], dependency_from_row)?;
        rows.collect()
    }

    pub fn chunks_for(&self, file_id: &str) -> Result<Vec<Chunk>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, file_id, chunk_index, start_line, end_line, start_char, end_char,
                    content, chunk_type, context_before, context_after, embedding
             FROM chunks WHERE file_id = ?1 ORDER BY chunk_index",
        )?;
        let rows = stmt.query_map(params![file_id], chunk_from_row)?;
        rows.collect()
    }

    pub fn complexity_for(&self, file_id: &str) -> Result<Option<ComplexityReport>> {
        self.conn
            .query_row(
                "SELECT logical_lines, comment_lines, blank_lines, cyclomatic, max_nesting,
                        return_count, maintainability_index, issues
                 FROM complexity_reports WHERE file_id = ?1",
                params![file_id],
                |row| {
                    Ok(ComplexityReport {
                        logical_lines: row.get::<_, i64>(0)? as usize,
                        comment_lines: row.get::<_, i64>(1)? as usize,
                        blank_lines: row.get::<_, i64>(2)? as usize,
                        cyclomatic: row.get::<_, i64>(3)? as usize,
                        max_nesting: row.get::<_, i64>(4)? as usize,
                        return_count: row.get::<_, i64>(5)? as usize,
                        maintainability_index: row.get(6)?,
                        issues: from_json(row.get(7)?)?,
                    })
                },
            )
            .optional()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::indexer::extractor::StructuralExtractor;
    use crate::indexer::types::stable_id;
    use chrono::Duration;

    const PROJECT: &str = "abc123def456";

    fn record(path: &str, content: &str) -> IndexedFileRecord {
        IndexedFileRecord {
            id: stable_id(&[PROJECT, path]),
            path: path.to_string(),
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            extension: "ts".into(),
            language: "typescript".into(),
            content_hash: crate::indexer::change::content_hash(content.as_bytes()),
            size: content.len() as u64,
            line_count: content.lines().count(),
            mtime: Utc::now(),
            last_indexed: None,
            embedding: Some(vec![0.5, -0.5]),
            content: content.to_string(),
            analysis: None,
        }
    }

    fn analyze(rec: &IndexedFileRecord) -> AnalysisResult {
        StructuralExtractor::new(ChunkingConfig::default()).analyze(&rec.id, &rec.path, &rec.content, &rec.language)
    }

    const SRC: &str = "import { a } from './a';\nexport class Box {\n  open(): void {\n  }\n}\n";

    #[test]
    fn test_persist_acks_every_row() {
        let mut db = Db::open_in_memory().unwrap();
        let rec = record("src/box.ts", SRC);
        let analysis = analyze(&rec);
        let acks = db.persist_file(PROJECT, &rec, Some(&analysis)).unwrap();

        let expected = 1 + analysis.definitions.len() + analysis.dependencies.len() + analysis.chunks.len() + 1;
        assert_eq!(acks.len(), expected);
        assert!(acks.iter().all(WriteAck::is_confirmed));
        assert_eq!(acks[0].durable_id.as_deref(), Some(rec.id.as_str()));

        let defs = db.definitions_for(&rec.id).unwrap();
        assert_eq!(defs, analysis.definitions);
        assert_eq!(db.dependencies_for(&rec.id).unwrap(), analysis.dependencies);
        assert_eq!(db.chunks_for(&rec.id).unwrap(), analysis.chunks);
        assert_eq!(db.complexity_for(&rec.id).unwrap(), Some(analysis.complexity.clone()));

        let stored = db.load_file(PROJECT, "src/box.ts").unwrap().unwrap();
        assert_eq!(stored.embedding, Some(vec![0.5, -0.5]));
        assert!(stored.is_released());
    }

    #[test]
    fn test_upsert_is_idempotent_and_replaces_children() {
        let mut db = Db::open_in_memory().unwrap();
        let rec = record("src/box.ts", SRC);
        let analysis = analyze(&rec);
        db.persist_file(PROJECT, &rec, Some(&analysis)).unwrap();
        db.persist_file(PROJECT, &rec, Some(&analysis)).unwrap();
        assert_eq!(db.file_count(PROJECT).unwrap(), 1);
        assert_eq!(db.definitions_for(&rec.id).unwrap().len(), analysis.definitions.len());

        let smaller = record("src/box.ts", "export const x = 1;\n");
        let smaller_analysis = analyze(&smaller);
        db.persist_file(PROJECT, &smaller, Some(&smaller_analysis)).unwrap();
        let defs = db.definitions_for(&rec.id).unwrap();
        assert!(defs.iter().all(|d| d.name != "Box"));
        assert!(db.dependencies_for(&rec.id).unwrap().is_empty());
    }

    #[test]
    fn test_load_states_and_touch() {
        let mut db = Db::open_in_memory().unwrap();
        let mut rec = record("a.ts", "let a = 1;\n");
        rec.mtime = Utc::now() - Duration::hours(1);
        db.persist_file(PROJECT, &rec, None).unwrap();

        let states = db.load_file_states(PROJECT).unwrap();
        let state = &states["a.ts"];
        assert_eq!(state.content_hash, rec.content_hash);
        assert_eq!(state.mtime.timestamp_millis(), rec.mtime.timestamp_millis());
        assert!(db.load_file_states("other").unwrap().is_empty());

        let later = Utc::now();
        assert!(db.touch_file(PROJECT, "a.ts", later).unwrap());
        let states = db.load_file_states(PROJECT).unwrap();
        assert_eq!(states["a.ts"].mtime.timestamp_millis(), later.timestamp_millis());
        assert!(!db.touch_file(PROJECT, "missing.ts", later).unwrap());
    }

    #[test]
    fn test_remove_cascades() {
        let mut db = Db::open_in_memory().unwrap();
        let rec = record("src/box.ts", SRC);
        let analysis = analyze(&rec);
        db.persist_file(PROJECT, &rec, Some(&analysis)).unwrap();
        assert!(db.remove_file(PROJECT, "src/box.ts").unwrap());
        assert!(db.definitions_for(&rec.id).unwrap().is_empty());
        assert!(db.chunks_for(&rec.id).unwrap().is_empty());
        assert!(db.complexity_for(&rec.id).unwrap().is_none());
        assert!(!db.remove_file(PROJECT, "src/box.ts").unwrap());
    }

    #[test]
    fn test_persist_without_analysis_clears_children() {
        let mut db = Db::open_in_memory().unwrap();
        let rec = record("src/box.ts", SRC);
        let analysis = analyze(&rec);
        db.persist_file(PROJECT, &rec, Some(&analysis)).unwrap();
        assert!(!db.definitions_for(&rec.id).unwrap().is_empty());

        let mut rewritten = rec.clone();
        rewritten.content_hash = "0".repeat(64);
        let acks = db.persist_file(PROJECT, &rewritten, None).unwrap();
        assert_eq!(acks.len(), 1);
        assert!(db.definitions_for(&rec.id).unwrap().is_empty());
        assert!(db.dependencies_for(&rec.id).unwrap().is_empty());
        assert!(db.chunks_for(&rec.id).unwrap().is_empty());
        assert!(db.complexity_for(&rec.id).unwrap().is_none());
        assert_eq!(db.file_count(PROJECT).unwrap(), 1);
    }

    #[test]
    fn test_projects_are_isolated() {
        let mut db = Db::open_in_memory().unwrap();
        let rec = record("same.ts", "let a = 1;\n");
        db.persist_file(PROJECT, &rec, None).unwrap();
        let mut other = rec.clone();
        other.id = stable_id(&["ffffffffffff", "same.ts"]);
        db.persist_file("ffffffffffff", &other, None).unwrap();
        assert_eq!(db.list_paths(PROJECT).unwrap(), vec!["same.ts".to_string()]);
        assert_eq!(db.file_count("ffffffffffff").unwrap(), 1);
    }
}
