//! Persisted, insertion-ordered bookmark list.
//!
//! The list lives in one durable slot as a JSON array of article ids. A
//! single [`BookmarkStore`] is created at startup and cloned into every
//! consumer; clones share state, and each mutation updates memory and the
//! slot while holding one lock, so no reader in the process can observe the
//! two diverging.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::storage::Database;

/// Name of the durable slot holding the bookmark list.
pub const BOOKMARKS_KEY: &str = "geekdaily_bookmarks";

/// Failure to write the bookmark slot.
///
/// The in-memory mutation that triggered the write is kept, so the change is
/// visible for the rest of the session even though it was not saved.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to encode bookmarks: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Failed to write bookmark slot: {0}")]
    Write(String),
}

// ============================================================================
// BookmarkSet
// ============================================================================

/// Ordered, deduplicated article ids with O(1) membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkSet {
    ids: Vec<i64>,
    index: HashSet<i64>,
}

impl BookmarkSet {
    /// Build a set from a sequence, keeping the first occurrence of any
    /// repeated id.
    pub fn from_ids(ids: impl IntoIterator<Item = i64>) -> Self {
        let mut set = Self::default();
        for id in ids {
            set.insert(id);
        }
        set
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains(&id)
    }

    /// Append `id`. Returns `false` (and changes nothing) if already present.
    pub fn insert(&mut self, id: i64) -> bool {
        if !self.index.insert(id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    /// Remove `id`. Returns `false` if it was not present.
    pub fn remove(&mut self, id: i64) -> bool {
        if !self.index.remove(&id) {
            return false;
        }
        if let Some(pos) = self.ids.iter().position(|&x| x == id) {
            self.ids.remove(pos);
        }
        true
    }

    /// Remove everything. Returns `false` if the set was already empty.
    pub fn clear(&mut self) -> bool {
        if self.ids.is_empty() {
            return false;
        }
        self.ids.clear();
        self.index.clear();
        true
    }

    /// Ids in bookmark (insertion) order.
    pub fn as_slice(&self) -> &[i64] {
        &self.ids
    }

    /// Position of `id` in bookmark order.
    pub fn position(&self, id: i64) -> Option<usize> {
        if !self.contains(id) {
            return None;
        }
        self.ids.iter().position(|&x| x == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

// ============================================================================
// Durable slot
// ============================================================================

/// The durable slot the bookmark list is stored in.
#[derive(Clone)]
pub struct BookmarkSlot {
    db: Database,
    key: String,
}

impl BookmarkSlot {
    pub fn new(db: Database) -> Self {
        Self::with_key(db, BOOKMARKS_KEY)
    }

    pub fn with_key(db: Database, key: &str) -> Self {
        Self {
            db,
            key: key.to_string(),
        }
    }

    /// Read the stored ids.
    ///
    /// Missing, unreadable or corrupt data yields an empty list; the problem
    /// is logged and never surfaced to the caller.
    pub async fn load(&self) -> Vec<i64> {
        let raw = match self.db.get_slot(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Failed to read bookmark slot, starting empty");
                return Vec::new();
            }
        };

        match serde_json::from_str::<Vec<i64>>(&raw) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "Corrupt bookmark slot, starting empty");
                Vec::new()
            }
        }
    }

    /// Replace the stored ids. Completes before returning.
    pub async fn persist(&self, ids: &[i64]) -> Result<(), PersistenceError> {
        let encoded = serde_json::to_string(ids)?;
        self.db
            .set_slot(&self.key, &encoded)
            .await
            .map_err(|e| PersistenceError::Write(e.to_string()))
    }
}

// ============================================================================
// BookmarkStore
// ============================================================================

/// Shared handle to the bookmark list.
///
/// Mutations return `Err(PersistenceError)` when the slot write fails; the
/// in-memory change has still been applied in that case.
#[derive(Clone)]
pub struct BookmarkStore {
    slot: BookmarkSlot,
    set: Arc<Mutex<BookmarkSet>>,
}

impl BookmarkStore {
    /// Load the bookmark list from `slot`. Called once at startup.
    pub async fn load(slot: BookmarkSlot) -> Self {
        let ids = slot.load().await;
        let set = BookmarkSet::from_ids(ids);
        tracing::debug!(count = set.len(), "Loaded bookmarks");
        Self {
            slot,
            set: Arc::new(Mutex::new(set)),
        }
    }

    /// Bookmark `id`, appending it to the end of the list.
    ///
    /// Returns `Ok(false)` without writing when `id` is already bookmarked.
    pub async fn add(&self, id: i64) -> Result<bool, PersistenceError> {
        self.mutate(|set| set.insert(id)).await
    }

    /// Returns `Ok(false)` without writing when `id` was not bookmarked.
    pub async fn remove(&self, id: i64) -> Result<bool, PersistenceError> {
        self.mutate(|set| set.remove(id)).await
    }

    /// Remove `id` if bookmarked, otherwise add it. Returns whether `id` is
    /// bookmarked afterwards.
    pub async fn toggle(&self, id: i64) -> Result<bool, PersistenceError> {
        let mut now_bookmarked = false;
        self.mutate(|set| {
            if set.contains(id) {
                set.remove(id)
            } else {
                now_bookmarked = true;
                set.insert(id)
            }
        })
        .await?;
        Ok(now_bookmarked)
    }

    pub async fn clear(&self) -> Result<(), PersistenceError> {
        self.mutate(BookmarkSet::clear).await.map(|_| ())
    }

    pub async fn is_bookmarked(&self, id: i64) -> bool {
        self.set.lock().await.contains(id)
    }

    /// Snapshot of the list in bookmark order.
    pub async fn ids(&self) -> Vec<i64> {
        self.set.lock().await.as_slice().to_vec()
    }

    /// Snapshot of the full set, for resolution.
    pub async fn snapshot(&self) -> BookmarkSet {
        self.set.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.set.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.set.lock().await.is_empty()
    }

    /// Apply `change` and, if it reports a modification, persist the new
    /// list before releasing the lock.
    async fn mutate<F>(&self, change: F) -> Result<bool, PersistenceError>
    where
        F: FnOnce(&mut BookmarkSet) -> bool,
    {
        let mut set = self.set.lock().await;
        if !change(&mut set) {
            return Ok(false);
        }

        if let Err(e) = self.slot.persist(set.as_slice()).await {
            tracing::warn!(error = %e, count = set.len(), "Bookmark change kept in memory but not saved");
            return Err(e);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn test_store() -> (Database, BookmarkStore) {
        let db = Database::open(":memory:").await.unwrap();
        let store = BookmarkStore::load(BookmarkSlot::new(db.clone())).await;
        (db, store)
    }

    #[test]
    fn test_set_dedupes_keeping_first() {
        let set = BookmarkSet::from_ids([5, 2, 5, 9, 2]);
        assert_eq!(set.as_slice(), &[5, 2, 9]);
        assert_eq!(set.position(9), Some(2));
        assert_eq!(set.position(7), None);
    }

    #[test]
    fn test_set_remove_keeps_order() {
        let mut set = BookmarkSet::from_ids([1, 2, 3]);
        assert!(set.remove(2));
        assert!(!set.remove(2));
        assert_eq!(set.as_slice(), &[1, 3]);
        assert!(!set.contains(2));
    }

    #[tokio::test]
    async fn test_empty_slot_loads_empty() {
        let (_db, store) = test_store().await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_add_appends_and_persists() {
        let (db, store) = test_store().await;
        assert!(store.add(5).await.unwrap());
        assert!(store.add(2).await.unwrap());

        assert_eq!(store.ids().await, vec![5, 2]);
        assert_eq!(db.get_slot(BOOKMARKS_KEY).await.unwrap(), Some("[5,2]".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_add_is_noop() {
        let (db, store) = test_store().await;
        store.add(5).await.unwrap();
        store.add(2).await.unwrap();
        let before = db.get_slot(BOOKMARKS_KEY).await.unwrap();

        assert!(!store.add(5).await.unwrap());

        assert_eq!(store.ids().await, vec![5, 2]);
        assert_eq!(db.get_slot(BOOKMARKS_KEY).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_original() {
        let (db, store) = test_store().await;
        store.add(1).await.unwrap();
        store.add(3).await.unwrap();
        let original = store.ids().await;

        assert!(store.toggle(7).await.unwrap());
        assert!(store.is_bookmarked(7).await);
        assert!(!store.toggle(7).await.unwrap());

        assert_eq!(store.ids().await, original);
        assert_eq!(db.get_slot(BOOKMARKS_KEY).await.unwrap(), Some("[1,3]".to_string()));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (db, store) = test_store().await;
        for id in [4, 8, 15] {
            store.add(id).await.unwrap();
        }

        assert!(store.remove(8).await.unwrap());
        assert!(!store.remove(8).await.unwrap());
        assert_eq!(store.ids().await, vec![4, 15]);

        store.clear().await.unwrap();
        assert_eq!(store.len().await, 0);
        assert_eq!(db.get_slot(BOOKMARKS_KEY).await.unwrap(), Some("[]".to_string()));
    }

    #[tokio::test]
    async fn test_reload_preserves_order() {
        let (db, store) = test_store().await;
        for id in [9, 1, 5] {
            store.add(id).await.unwrap();
        }

        let reloaded = BookmarkStore::load(BookmarkSlot::new(db)).await;
        assert_eq!(reloaded.ids().await, vec![9, 1, 5]);
    }

    #[tokio::test]
    async fn test_corrupt_slot_loads_empty() {
        let db = Database::open(":memory:").await.unwrap();
        db.set_slot(BOOKMARKS_KEY, "not json {{").await.unwrap();

        let store = BookmarkStore::load(BookmarkSlot::new(db)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_wrong_shape_slot_loads_empty() {
        let db = Database::open(":memory:").await.unwrap();
        db.set_slot(BOOKMARKS_KEY, r#"{"ids": [1, 2]}"#).await.unwrap();

        let store = BookmarkStore::load(BookmarkSlot::new(db)).await;
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_stored_duplicates_are_dropped() {
        let db = Database::open(":memory:").await.unwrap();
        db.set_slot(BOOKMARKS_KEY, "[3, 1, 3]").await.unwrap();

        let store = BookmarkStore::load(BookmarkSlot::new(db)).await;
        assert_eq!(store.ids().await, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let (_db, store) = test_store().await;
        let other = store.clone();

        store.add(42).await.unwrap();
        assert!(other.is_bookmarked(42).await);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_change() {
        let (db, store) = test_store().await;
        db.pool.close().await;

        let result = store.add(11).await;
        assert!(matches!(result, Err(PersistenceError::Write(_))));
        assert!(store.is_bookmarked(11).await);
    }
}
