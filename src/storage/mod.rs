//! Storage Engine Module
//!
//! This module provides the core storage functionality for TreeKV: an AVL
//! tree keyed by string, and a thread-safe engine that shares it between
//! client connections.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │   ┌─────────────────────────────────────────────────────┐   │
//! │   │                 RwLock<AvlTree>                     │   │
//! │   │                                                     │   │
//! │   │                        (m)                          │   │
//! │   │                      /     \                        │   │
//! │   │                   (f)       (t)                     │   │
//! │   │                  /   \     /   \                    │   │
//! │   │                (c)  (h)  (p)   (x)                  │   │
//! │   └─────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Ordered**: keys are kept in a binary search tree
//! - **Balanced**: AVL rotations keep the height within ~1.44·log2(n)
//! - **RwLock**: concurrent readers, exclusive writers
//!
//! ## Example
//!
//! ```
//! use treekv::storage::StorageEngine;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! engine.set("name".to_string(), "Ariz".to_string());
//! assert_eq!(engine.get("name"), Some("Ariz".to_string()));
//! ```

pub mod engine;
pub mod tree;

// Re-export commonly used types
pub use engine::{StorageEngine, StorageStats};
pub use tree::{AvlTree, InvariantViolation, Iter};
