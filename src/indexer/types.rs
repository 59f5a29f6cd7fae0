//! Index row types produced by the structural extractor and the scan pipeline.
use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Build a deterministic 16-hex-char identifier from its parts.
pub fn stable_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

// ── Definitions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefinitionKind {
    Function,
    Method,
    Class,
    Interface,
    Struct,
    Enum,
    Trait,
    Type,
    Constant,
    Variable,
    Property,
    Constructor,
    Destructor,
    Namespace,
    Module,
    Macro,
    Impl,
    Section,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Function => "function",
            DefinitionKind::Method => "method",
            DefinitionKind::Class => "class",
            DefinitionKind::Interface => "interface",
            DefinitionKind::Struct => "struct",
            DefinitionKind::Enum => "enum",
            DefinitionKind::Trait => "trait",
            DefinitionKind::Type => "type",
            DefinitionKind::Constant => "constant",
            DefinitionKind::Variable => "variable",
            DefinitionKind::Property => "property",
            DefinitionKind::Constructor => "constructor",
            DefinitionKind::Destructor => "destructor",
            DefinitionKind::Namespace => "namespace",
            DefinitionKind::Module => "module",
            DefinitionKind::Macro => "macro",
            DefinitionKind::Impl => "impl",
            DefinitionKind::Section => "section",
        }
    }

    /// Kinds whose body holds members (methods, fields).
    pub fn is_type_like(&self) -> bool {
        matches!(
            self,
            DefinitionKind::Class
                | DefinitionKind::Interface
                | DefinitionKind::Struct
                | DefinitionKind::Enum
                | DefinitionKind::Trait
                | DefinitionKind::Impl
        )
    }

    /// Kinds whose body holds statements.
    pub fn is_callable(&self) -> bool {
        matches!(
            self,
            DefinitionKind::Function
                | DefinitionKind::Method
                | DefinitionKind::Constructor
                | DefinitionKind::Destructor
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
    Protected,
    Internal,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub type_annotation: Option<String>,
    pub default_value: Option<String>,
    pub optional: bool,
}

/// A named, located structural unit (function, class, ...) recovered from source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub id: String,
    pub file_id: String,
    pub name: String,
    pub qualified_name: Option<String>,
    pub kind: DefinitionKind,
    /// 1-based
    pub start_line: usize,
    /// Line on which the definition's scope closed (inclusive)
    pub end_line: usize,
    pub signature: String,
    pub is_exported: bool,
    pub is_async: bool,
    pub is_static: bool,
    pub is_abstract: bool,
    pub visibility: Option<Visibility>,
    pub parent_definition_id: Option<String>,
    pub parameters: Vec<Parameter>,
    pub language: String,
    pub metadata: HashMap<String, serde_json::Value>,
}

// ── Dependencies ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    Import,
    Require,
    Include,
    Use,
    From,
    Dynamic,
    TypeOnly,
    ReExport,
    SideEffect,
}

impl ImportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportKind::Import => "import",
            ImportKind::Require => "require",
            ImportKind::Include => "include",
            ImportKind::Use => "use",
            ImportKind::From => "from",
            ImportKind::Dynamic => "dynamic",
            ImportKind::TypeOnly => "type-only",
            ImportKind::ReExport => "re-export",
            ImportKind::SideEffect => "side-effect",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedName {
    pub name: String,
    pub alias: Option<String>,
}

/// Derived classification of a dependency target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyFlags {
    pub is_external: bool,
    pub is_builtin: bool,
    pub is_relative: bool,
    pub is_absolute: bool,
    pub is_dynamic: bool,
    pub is_default: bool,
    pub is_namespace: bool,
    pub is_type_only: bool,
    pub is_side_effect: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub id: String,
    pub source_file_id: String,
    pub target_path: String,
    /// Filled by a path resolver outside this crate
    pub resolved_path: Option<String>,
    pub import_kind: ImportKind,
    pub statement: String,
    pub imported_names: Vec<ImportedName>,
    pub flags: DependencyFlags,
    pub line: usize,
    pub language: String,
}

// ── Chunks ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Code,
    Comment,
    Import,
    Mixed,
    Structural,
    Style,
}

impl ChunkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkType::Code => "code",
            ChunkType::Comment => "comment",
            ChunkType::Import => "import",
            ChunkType::Mixed => "mixed",
            ChunkType::Structural => "structural",
            ChunkType::Style => "style",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub file_id: String,
    pub chunk_index: usize,
    pub start_line: usize,
    pub end_line: usize,
    pub start_char: usize,
    /// Exclusive
    pub end_char: usize,
    pub content: String,
    pub chunk_type: ChunkType,
    pub context_before: Option<String>,
    pub context_after: Option<String>,
    pub embedding: Option<Vec<f32>>,
}

// ── Complexity ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityIssue {
    pub metric: String,
    pub severity: IssueSeverity,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub logical_lines: usize,
    pub comment_lines: usize,
    pub blank_lines: usize,
    pub cyclomatic: usize,
    pub max_nesting: usize,
    pub return_count: usize,
    pub maintainability_index: f64,
    pub issues: Vec<ComplexityIssue>,
}

/// Everything extracted from a single file in one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub definitions: Vec<Definition>,
    pub dependencies: Vec<Dependency>,
    pub chunks: Vec<Chunk>,
    pub complexity: ComplexityReport,
}

// ── File records ─────────────────────────────────────────────────────

/// One indexed file. `content` and `analysis` are transient and get released
/// once the store acknowledges the write.
#[derive(Debug, Clone)]
pub struct IndexedFileRecord {
    pub id: String,
    /// Root-relative, `/`-separated
    pub path: String,
    pub name: String,
    pub extension: String,
    pub language: String,
    pub content_hash: String,
    pub size: u64,
    pub line_count: usize,
    pub mtime: DateTime<Utc>,
    pub last_indexed: Option<DateTime<Utc>>,
    pub embedding: Option<Vec<f32>>,
    pub content: String,
    pub analysis: Option<AnalysisResult>,
}

impl IndexedFileRecord {
    /// Drop the content buffer and analysis, keeping only metadata resident.
    pub fn release_content(&mut self) {
        self.content = String::new();
        self.analysis = None;
    }

    pub fn is_released(&self) -> bool {
        self.content.is_empty() && self.analysis.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_id_deterministic() {
        let a = stable_id(&["file", "function", "main", "1"]);
        let b = stable_id(&["file", "function", "main", "1"]);
        let c = stable_id(&["file", "function", "main", "2"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn test_stable_id_part_boundaries() {
        // "ab" + "c" must not collide with "a" + "bc"
        assert_ne!(stable_id(&["ab", "c"]), stable_id(&["a", "bc"]));
    }

    #[test]
    fn test_release_content() {
        let mut record = IndexedFileRecord {
            id: "1".into(),
            path: "src/a.rs".into(),
            name: "a.rs".into(),
            extension: "rs".into(),
            language: "rust".into(),
            content_hash: "x".into(),
            size: 3,
            line_count: 1,
            mtime: Utc::now(),
            last_indexed: None,
            embedding: None,
            content: "fn a() {}".into(),
            analysis: None,
        };
        assert!(!record.is_released());
        record.release_content();
        assert!(record.is_released());
        assert_eq!(record.path, "src/a.rs");
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&DefinitionKind::Constructor).unwrap();
        assert_eq!(json, "\"constructor\"");
        let json = serde_json::to_string(&ImportKind::TypeOnly).unwrap();
        assert_eq!(json, "\"type-only\"");
    }
}
