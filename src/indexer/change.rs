use std::io;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::db::StoredFile;

/// Outcome of comparing a file on disk with its stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    New,
    Changed,
    UnchangedByMtime,
    UnchangedByHash,
}

impl ChangeStatus {
    pub fn needs_analysis(&self) -> bool {
        matches!(self, ChangeStatus::New | ChangeStatus::Changed)
    }
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub status: ChangeStatus,
    /// Present whenever the file had to be read
    pub content: Option<String>,
    pub content_hash: Option<String>,
    pub size: u64,
}

pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// mtime first, content hash second. `force` re-reads everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeDetector {
    force: bool,
}

impl ChangeDetector {
    pub fn new(force: bool) -> Self {
        Self { force }
    }

    /// `load` is only called when the mtime check cannot settle the question.
    pub fn detect<F>(
        &self,
        recorded: Option<&StoredFile>,
        current_mtime: DateTime<Utc>,
        load: F,
    ) -> io::Result<Detection>
    where
        F: FnOnce() -> io::Result<Vec<u8>>,
    {
        if let Some(stored) = recorded {
            if !self.force && current_mtime.timestamp_millis() <= stored.mtime.timestamp_millis() {
                return Ok(Detection {
                    status: ChangeStatus::UnchangedByMtime,
                    content: None,
                    content_hash: None,
                    size: 0,
                });
            }
        }

        let bytes = load()?;
        let hash = content_hash(&bytes);
        let status = match recorded {
            None => ChangeStatus::New,
            Some(_) if self.force => ChangeStatus::Changed,
            Some(stored) if stored.content_hash == hash => ChangeStatus::UnchangedByHash,
            Some(_) => ChangeStatus::Changed,
        };
        Ok(Detection {
            status,
            size: bytes.len() as u64,
            content: Some(String::from_utf8_lossy(&bytes).into_owned()),
            content_hash: Some(hash),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use chrono::Duration;

    use super::*;

    fn stored(content: &[u8], mtime: DateTime<Utc>) -> StoredFile {
        StoredFile {
            id: "id".into(),
            path: "a.ts".into(),
            content_hash: content_hash(content),
            mtime,
        }
    }

    #[test]
    fn test_new_file() {
        let d = ChangeDetector::new(false)
            .detect(None, Utc::now(), || Ok(b"x".to_vec()))
            .unwrap();
        assert_eq!(d.status, ChangeStatus::New);
        assert_eq!(d.content.as_deref(), Some("x"));
        assert_eq!(d.size, 1);
    }

    #[test]
    fn test_unchanged_by_mtime_skips_read() {
        let now = Utc::now();
        let record = stored(b"x", now);
        let calls = Cell::new(0);
        let d = ChangeDetector::new(false)
            .detect(Some(&record), now - Duration::seconds(5), || {
                calls.set(calls.get() + 1);
                Ok(b"x".to_vec())
            })
            .unwrap();
        assert_eq!(d.status, ChangeStatus::UnchangedByMtime);
        assert_eq!(calls.get(), 0);
        assert!(d.content.is_none());
    }

    #[test]
    fn test_touched_but_same_content() {
        let then = Utc::now() - Duration::seconds(60);
        let record = stored(b"same", then);
        let d = ChangeDetector::new(false)
            .detect(Some(&record), Utc::now(), || Ok(b"same".to_vec()))
            .unwrap();
        assert_eq!(d.status, ChangeStatus::UnchangedByHash);
        assert!(!d.status.needs_analysis());
    }

    #[test]
    fn test_changed_content() {
        let then = Utc::now() - Duration::seconds(60);
        let record = stored(b"old", then);
        let d = ChangeDetector::new(false)
            .detect(Some(&record), Utc::now(), || Ok(b"new".to_vec()))
            .unwrap();
        assert_eq!(d.status, ChangeStatus::Changed);
        assert_eq!(d.content_hash.as_deref(), Some(content_hash(b"new").as_str()));
    }

    #[test]
    fn test_force_bypasses_both_checks() {
        let now = Utc::now();
        let record = stored(b"same", now);
        let d = ChangeDetector::new(true)
            .detect(Some(&record), now, || Ok(b"same".to_vec()))
            .unwrap();
        assert_eq!(d.status, ChangeStatus::Changed);
    }

    #[test]
    fn test_read_error_propagates() {
        let result = ChangeDetector::new(false).detect(None, Utc::now(), || {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "denied"))
        });
        assert!(result.is_err());
    }
}
