//! Per-project indexers, keyed by project root.
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex as TokioMutex;
use tracing::{debug, info};

use crate::config::Config;
use crate::db::IndexStore;
use crate::embedder::Embedder;
use crate::indexer::{Indexer, ScanError};

/// 12 hex chars of sha256 over the canonical root path.
pub fn project_key(root: &Path) -> String {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    hex::encode(digest)[..12].to_string()
}

pub type SharedIndexer<S> = Arc<TokioMutex<Indexer<S>>>;

/// Owns one [`Indexer`] per project. Indexers are built on first use and
/// live until torn down.
pub struct ProjectRegistry<S: IndexStore + 'static> {
    store: Arc<TokioMutex<S>>,
    embedder: Arc<dyn Embedder>,
    config: Config,
    indexers: HashMap<String, SharedIndexer<S>>,
}

impl<S: IndexStore + 'static> ProjectRegistry<S> {
    pub fn new(store: Arc<TokioMutex<S>>, embedder: Arc<dyn Embedder>, config: Config) -> Self {
        Self {
            store,
            embedder,
            config,
            indexers: HashMap::new(),
        }
    }

    pub fn get_or_create(&mut self, root: &Path) -> Result<SharedIndexer<S>, ScanError> {
        let key = project_key(root);
        if let Some(existing) = self.indexers.get(&key) {
            return Ok(existing.clone());
        }
        let indexer = Indexer::new(root, self.store.clone(), self.embedder.clone(), self.config.clone())?;
        info!("Registered project {key} at {}", root.display());
        let shared = Arc::new(TokioMutex::new(indexer));
        self.indexers.insert(key, shared.clone());
        Ok(shared)
    }

    pub fn get(&self, root: &Path) -> Option<SharedIndexer<S>> {
        self.indexers.get(&project_key(root)).cloned()
    }

    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }

    /// Drop the project's indexer and its in-memory record index.
    /// Stored rows are left alone.
    pub fn teardown(&mut self, root: &Path) -> bool {
        let key = project_key(root);
        let removed = self.indexers.remove(&key).is_some();
        if removed {
            debug!("Tore down project {key}");
        }
        removed
    }

    pub fn teardown_all(&mut self) -> usize {
        let count = self.indexers.len();
        self.indexers.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Db;
    use crate::embedder::mock::MockEmbedder;
    use tempfile::tempdir;

    fn registry() -> ProjectRegistry<Db> {
        let db = Arc::new(TokioMutex::new(Db::open_in_memory().unwrap()));
        ProjectRegistry::new(db, Arc::new(MockEmbedder::new(8)), Config::default())
    }

    #[test]
    fn test_project_key_shape() {
        let dir = tempdir().unwrap();
        let key = project_key(dir.path());
        assert_eq!(key.len(), 12);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, project_key(dir.path()));
    }

    #[test]
    fn test_project_key_canonicalizes() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let dotted = dir.path().join("sub").join("..");
        assert_eq!(project_key(&dotted), project_key(dir.path()));
    }

    #[tokio::test]
    async fn test_lazy_construction_and_reuse() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        let mut reg = registry();
        assert!(reg.is_empty());
        assert!(reg.get(a.path()).is_none());

        let first = reg.get_or_create(a.path()).unwrap();
        let again = reg.get_or_create(a.path()).unwrap();
        assert!(Arc::ptr_eq(&first, &again));
        reg.get_or_create(b.path()).unwrap();
        assert_eq!(reg.len(), 2);

        let key = first.lock().await.project().to_string();
        assert_eq!(key, project_key(a.path()));
    }

    #[test]
    fn test_teardown() {
        let a = tempdir().unwrap();
        let b = tempdir().unwrap();
        let mut reg = registry();
        reg.get_or_create(a.path()).unwrap();
        reg.get_or_create(b.path()).unwrap();

        assert!(reg.teardown(a.path()));
        assert!(!reg.teardown(a.path()));
        assert!(reg.get(a.path()).is_none());
        assert_eq!(reg.teardown_all(), 1);
        assert!(reg.is_empty());
    }
}
