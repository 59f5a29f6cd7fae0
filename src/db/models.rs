use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;

/// What the store remembers about a file between scans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub id: String,
    pub path: String,
    pub content_hash: String,
    pub mtime: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowKind {
    File,
    Definition,
    Dependency,
    Chunk,
    Complexity,
}

impl RowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowKind::File => "file",
            RowKind::Definition => "definition",
            RowKind::Dependency => "dependency",
            RowKind::Chunk => "chunk",
            RowKind::Complexity => "complexity",
        }
    }
}

/// Per-row write confirmation. `durable_id` is what the store actually
/// returned; `None` means the row was not confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteAck {
    pub row_kind: RowKind,
    pub proposed_id: String,
    pub durable_id: Option<String>,
}

impl WriteAck {
    pub fn confirmed(row_kind: RowKind, proposed_id: &str, durable_id: String) -> Self {
        Self {
            row_kind,
            proposed_id: proposed_id.to_string(),
            durable_id: Some(durable_id),
        }
    }

    pub fn failed(row_kind: RowKind, proposed_id: &str) -> Self {
        Self {
            row_kind,
            proposed_id: proposed_id.to_string(),
            durable_id: None,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.durable_id.is_some()
    }
}

/// Store a serde enum as its bare tag text.
pub(crate) fn tag_of<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => s,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

pub(crate) fn from_tag<T: DeserializeOwned>(tag: String) -> rusqlite::Result<T> {
    serde_json::from_value(serde_json::Value::String(tag))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

pub(crate) fn from_json<T: DeserializeOwned>(text: String) -> rusqlite::Result<T> {
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}
