//! Dirty tracking: which paths need saving, and the last content hash seen
//! for every open editor.
//!
//! Both maps are safe to touch from any thread. A path is only ever marked
//! together with a baseline update, so a pending path always belongs to an
//! open editor whose content changed since it was last observed.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tandem_core::{EditorId, EditorSnapshot};

use crate::hash::ContentHash;

#[derive(Debug, Default)]
pub struct DirtyTracking {
    pending: Mutex<BTreeSet<PathBuf>>,
    hashes: Mutex<HashMap<EditorId, ContentHash>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DirtyTracking {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `content` as the editor's baseline.
    pub fn baseline(&self, id: EditorId, content: &str) {
        lock(&self.hashes).insert(id, ContentHash::of(content));
    }

    /// Compare a live snapshot against its baseline. Marks the path dirty and
    /// moves the baseline forward when the content changed.
    ///
    /// Read-only and empty editors are never dirty; an editor that has not
    /// finished loading must not be saved as an empty file.
    pub fn observe(&self, editor: &EditorSnapshot) -> bool {
        if !editor.writable || editor.content.is_empty() {
            return false;
        }
        let hash = ContentHash::of(&editor.content);
        let mut hashes = lock(&self.hashes);
        if hashes.get(&editor.id) == Some(&hash) {
            return false;
        }
        hashes.insert(editor.id, hash);
        drop(hashes);
        lock(&self.pending).insert(editor.path.clone());
        true
    }

    /// Snapshot the pending set and clear it in one step.
    ///
    /// Paths marked after this call belong to the next flush.
    pub fn drain(&self) -> Vec<PathBuf> {
        std::mem::take(&mut *lock(&self.pending)).into_iter().collect()
    }

    /// Clear the pending set and re-baseline every given editor.
    pub fn rebaseline(&self, editors: &[EditorSnapshot]) {
        lock(&self.pending).clear();
        let mut hashes = lock(&self.hashes);
        for editor in editors {
            hashes.insert(editor.id, ContentHash::of(&editor.content));
        }
    }

    /// Stop tracking a closed editor.
    pub fn forget(&self, id: EditorId, path: &Path) {
        lock(&self.hashes).remove(&id);
        lock(&self.pending).remove(path);
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        lock(&self.pending).contains(path)
    }

    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_tracked(&self, id: EditorId) -> bool {
        lock(&self.hashes).contains_key(&id)
    }

    pub fn clear(&self) {
        lock(&self.pending).clear();
        lock(&self.hashes).clear();
    }
}
