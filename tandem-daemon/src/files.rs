//! Open-document model updated by the event dispatcher.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenDocument {
    pub path: PathBuf,
    /// 0 on open, +1 per change.
    pub version: u64,
    pub modified_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct FileManager {
    documents: RwLock<HashMap<PathBuf, OpenDocument>>,
}

impl FileManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn on_open(&self, path: &Path) {
        let mut documents = self.documents.write().await;
        documents.insert(
            path.to_path_buf(),
            OpenDocument {
                path: path.to_path_buf(),
                version: 0,
                modified_at: Utc::now(),
            },
        );
    }

    /// Bump the version. A document never opened is registered on the spot.
    pub async fn on_change(&self, path: &Path) {
        let mut documents = self.documents.write().await;
        let now = Utc::now();
        let document = documents
            .entry(path.to_path_buf())
            .or_insert_with(|| OpenDocument {
                path: path.to_path_buf(),
                version: 0,
                modified_at: now,
            });
        document.version += 1;
        document.modified_at = now;
    }

    pub async fn on_close(&self, path: &Path) {
        self.documents.write().await.remove(path);
    }

    pub async fn is_open(&self, path: &Path) -> bool {
        self.documents.read().await.contains_key(path)
    }

    pub async fn document(&self, path: &Path) -> Option<OpenDocument> {
        self.documents.read().await.get(path).cloned()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}
