//! Thread-Safe Storage Engine
//!
//! This module wraps the [`AvlTree`] in a single coarse lock and exposes the
//! three operations the server needs: set, get and delete.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │                                                             │
//! │   get()  ──── read lock ────┐                               │
//! │                             ▼                               │
//! │                    ┌─────────────────┐                      │
//! │                    │ RwLock<AvlTree> │                      │
//! │                    └─────────────────┘                      │
//! │                             ▲                               │
//! │   set()/delete() ─ write lock                               │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation is a short point lookup or a single O(log n) mutation, so
//! one lock over the whole tree keeps contention low. Writers hold the lock
//! for the entire insert or delete including all rotations, which means a
//! reader never observes a partially rebalanced tree.

use super::tree::{AvlTree, InvariantViolation};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

/// The main storage engine for TreeKV.
///
/// This struct is designed to be wrapped in an `Arc` and shared across all
/// client handler tasks. All operations are thread-safe.
///
/// # Example
///
/// ```
/// use treekv::storage::StorageEngine;
///
/// let engine = StorageEngine::new();
///
/// assert!(engine.set("name".into(), "Ariz".into()));
/// assert_eq!(engine.get("name"), Some("Ariz".to_string()));
///
/// assert!(engine.delete("name"));
/// assert_eq!(engine.get("name"), None);
/// ```
pub struct StorageEngine {
    /// The tree, guarded by one lock
    tree: RwLock<AvlTree>,

    /// Statistics: total GET operations
    get_count: AtomicU64,

    /// Statistics: total SET operations
    set_count: AtomicU64,

    /// Statistics: total DEL operations
    del_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("keys", &self.len())
            .field("get_count", &self.get_count.load(Ordering::Relaxed))
            .field("set_count", &self.set_count.load(Ordering::Relaxed))
            .field("del_count", &self.del_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates an empty storage engine.
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(AvlTree::new()),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
        }
    }

    // A poisoned lock means a writer panicked mid-rebalance. The tree may be
    // inconsistent, so the panic is propagated rather than recovered.
    fn read_tree(&self) -> RwLockReadGuard<'_, AvlTree> {
        self.tree.read().expect("storage lock poisoned")
    }

    fn write_tree(&self) -> RwLockWriteGuard<'_, AvlTree> {
        self.tree.write().expect("storage lock poisoned")
    }

    /// Sets a key-value pair.
    ///
    /// If the key already exists, its value is overwritten.
    ///
    /// # Returns
    ///
    /// Returns `true` if a new key was created, `false` if an existing key was updated.
    pub fn set(&self, key: String, value: String) -> bool {
        self.set_count.fetch_add(1, Ordering::Relaxed);
        self.write_tree().insert(key, value).is_none()
    }

    /// Gets the value for a key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let value = self.read_tree().get(key).map(str::to_owned);
        if value.is_none() {
            trace!(key = %key, "Key not found");
        }
        value
    }

    /// Deletes a key.
    ///
    /// # Returns
    ///
    /// Returns `true` if the key was deleted, `false` if it didn't exist.
    pub fn delete(&self, key: &str) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);
        self.write_tree().remove(key).is_some()
    }

    /// Returns the number of keys.
    pub fn len(&self) -> usize {
        self.read_tree().len()
    }

    /// Returns true if the database is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current height of the tree.
    pub fn height(&self) -> u32 {
        self.read_tree().height()
    }

    /// Checks the structural invariants of the underlying tree.
    ///
    /// Holds the read lock for a full traversal; use for diagnostics only.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        self.read_tree().validate()
    }

    /// Returns storage statistics.
    pub fn stats(&self) -> StorageStats {
        let (keys, height) = {
            let tree = self.read_tree();
            (tree.len(), tree.height())
        };

        StorageStats {
            keys,
            height,
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
        }
    }
}

/// Storage statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: usize,
    pub height: u32,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        assert!(engine.set("key".into(), "value".into()));
        assert_eq!(engine.get("key"), Some("value".to_string()));
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get("nonexistent"), None);
    }

    #[test]
    fn test_overwrite() {
        let engine = StorageEngine::new();

        assert!(engine.set("key".into(), "v1".into()));
        assert!(!engine.set("key".into(), "v2".into()));
        assert_eq!(engine.get("key"), Some("v2".to_string()));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_delete() {
        let engine = StorageEngine::new();

        engine.set("key".into(), "value".into());
        assert!(engine.delete("key"));
        assert_eq!(engine.get("key"), None);
        assert!(!engine.delete("key")); // Already deleted
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.set("a".into(), "1".into());
        engine.set("b".into(), "2".into());
        engine.get("a");
        engine.get("missing");
        engine.delete("b");

        let stats = engine.stats();
        assert_eq!(stats.keys, 1);
        assert_eq!(stats.height, 1);
        assert_eq!(stats.set_ops, 2);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.del_ops, 1);
    }

    #[test]
    fn test_concurrent_access() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        // Spawn multiple writers on disjoint keys
        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let key = format!("key-{}-{}", i, j);
                    let value = format!("value-{}-{}", i, j);
                    engine.set(key.clone(), value.clone());
                    assert_eq!(engine.get(&key), Some(value));
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1000);
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_concurrent_insert_and_delete_leaves_no_nodes() {
        use std::sync::Arc;
        use std::thread;

        let engine = Arc::new(StorageEngine::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    for i in 0..250 {
                        engine.set(format!("{}:{}", t, i), "x".to_string());
                    }
                    for i in 0..250 {
                        assert!(engine.delete(&format!("{}:{}", t, i)));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(engine.is_empty());
        assert_eq!(engine.height(), 0);
        assert!(engine.validate().is_ok());
    }
}
