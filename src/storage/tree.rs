//! Height-Balanced (AVL) Binary Search Tree
//!
//! This module implements the ordered map that backs TreeKV. Every key lives
//! in exactly one heap-allocated node, and every node is exclusively owned by
//! its parent link (or by the tree's root).
//!
//! ## Balance Invariant
//!
//! For every node the heights of its two subtrees differ by at most one:
//!
//! ```text
//! balance(node) = height(left) - height(right)    ∈ [-1, 1]
//! ```
//!
//! This bounds the height of a tree holding `n` keys by roughly
//! `1.44 * log2(n + 2)`, so lookups, inserts and deletes are all O(log n).
//!
//! ## Rebalancing
//!
//! Inserts and deletes recurse down to the affected node, then each level of
//! the unwind recomputes the node's height and, if its balance factor has left
//! `[-1, 1]`, rotates. The left-left case is a single right rotation:
//!
//! ```text
//!          z                     y
//!         / \                  /   \
//!        y   T4               x     z
//!       / \        ──>       / \   / \
//!      x   T3               T1 T2 T3 T4
//!     / \
//!    T1  T2
//! ```
//!
//! Right-right is the mirror image. In the left-right and right-left cases the
//! taller child leans the other way, so it is rotated first to reduce the case
//! to left-left or right-right.
//!
//! Each recursive call returns the (possibly new) root of its subtree, so no
//! parent pointers are needed.

use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

type Link = Option<Box<Node>>;

/// A single key/value entry in the tree.
#[derive(Debug)]
struct Node {
    key: String,
    value: String,
    /// 1 for a leaf
    height: u32,
    left: Link,
    right: Link,
}

impl Node {
    fn leaf(key: String, value: String) -> Box<Self> {
        Box::new(Self {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        })
    }

    #[inline]
    fn update_height(&mut self) {
        self.height = 1 + height(&self.left).max(height(&self.right));
    }

    #[inline]
    fn balance_factor(&self) -> i64 {
        i64::from(height(&self.left)) - i64::from(height(&self.right))
    }
}

#[inline]
fn height(link: &Link) -> u32 {
    link.as_ref().map_or(0, |node| node.height)
}

/// Rotates `node` to the right, promoting its left child.
fn rotate_right(mut node: Box<Node>) -> Box<Node> {
    let mut pivot = node
        .left
        .take()
        .expect("AVL invariant violated: right rotation without a left child");

    node.left = pivot.right.take();
    node.update_height();

    pivot.right = Some(node);
    pivot.update_height();
    pivot
}

/// Rotates `node` to the left, promoting its right child.
fn rotate_left(mut node: Box<Node>) -> Box<Node> {
    let mut pivot = node
        .right
        .take()
        .expect("AVL invariant violated: left rotation without a right child");

    node.right = pivot.left.take();
    node.update_height();

    pivot.left = Some(node);
    pivot.update_height();
    pivot
}

/// Restores the balance invariant at `node`, whose subtrees are already balanced.
fn rebalance(mut node: Box<Node>) -> Box<Node> {
    node.update_height();
    let balance = node.balance_factor();

    if balance > 1 {
        // Left-right: straighten the left subtree first
        if node.left.as_ref().map_or(0, |left| left.balance_factor()) < 0 {
            node.left = node.left.take().map(rotate_left);
        }
        return rotate_right(node);
    }

    if balance < -1 {
        // Right-left
        if node.right.as_ref().map_or(0, |right| right.balance_factor()) > 0 {
            node.right = node.right.take().map(rotate_right);
        }
        return rotate_left(node);
    }

    node
}

/// Inserts into the subtree rooted at `link`.
///
/// Returns the new subtree root and the previous value if the key existed.
fn insert(link: Link, key: String, value: String) -> (Box<Node>, Option<String>) {
    let Some(mut node) = link else {
        return (Node::leaf(key, value), None);
    };

    match key.as_str().cmp(node.key.as_str()) {
        Ordering::Less => {
            let (child, previous) = insert(node.left.take(), key, value);
            node.left = Some(child);
            (rebalance(node), previous)
        }
        Ordering::Greater => {
            let (child, previous) = insert(node.right.take(), key, value);
            node.right = Some(child);
            (rebalance(node), previous)
        }
        Ordering::Equal => {
            // Overwrite in place, shape is unchanged
            let previous = std::mem::replace(&mut node.value, value);
            (node, Some(previous))
        }
    }
}

/// Detaches the minimum node of the subtree rooted at `node`.
///
/// Returns the remaining (rebalanced) subtree and the detached node.
fn take_min(mut node: Box<Node>) -> (Link, Box<Node>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (rest, node)
        }
        Some(left) => {
            let (rest, min) = take_min(left);
            node.left = rest;
            (Some(rebalance(node)), min)
        }
    }
}

/// Removes `key` from the subtree rooted at `link`.
///
/// Returns the new subtree root and the removed value, if any.
fn remove(link: Link, key: &str) -> (Link, Option<String>) {
    let Some(mut node) = link else {
        return (None, None);
    };

    match key.cmp(node.key.as_str()) {
        Ordering::Less => {
            let (child, removed) = remove(node.left.take(), key);
            node.left = child;
            (Some(rebalance(node)), removed)
        }
        Ordering::Greater => {
            let (child, removed) = remove(node.right.take(), key);
            node.right = child;
            (Some(rebalance(node)), removed)
        }
        Ordering::Equal => {
            let Node {
                value, left, right, ..
            } = *node;

            let replacement = match (left, right) {
                (None, None) => None,
                (Some(child), None) | (None, Some(child)) => Some(child),
                (Some(left), Some(right)) => {
                    // The in-order successor takes this node's place
                    let (rest, mut successor) = take_min(right);
                    successor.left = Some(left);
                    successor.right = rest;
                    Some(rebalance(successor))
                }
            };

            (replacement, Some(value))
        }
    }
}

/// A structural defect found by [`AvlTree::validate`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("key {key:?} is out of order")]
    OutOfOrder { key: String },

    #[error("node {key:?} has balance factor {balance}")]
    Unbalanced { key: String, balance: i64 },

    #[error("node {key:?} records height {recorded}, actual height is {actual}")]
    StaleHeight {
        key: String,
        recorded: u32,
        actual: u32,
    },

    #[error("tree records {recorded} keys but {reachable} nodes are reachable")]
    LengthMismatch { recorded: usize, reachable: usize },
}

/// An ordered string map implemented as an AVL tree.
///
/// `AvlTree` is not synchronized; [`StorageEngine`](super::StorageEngine)
/// wraps it in a lock for concurrent use.
///
/// # Example
///
/// ```
/// use treekv::storage::AvlTree;
///
/// let mut tree = AvlTree::new();
/// assert_eq!(tree.insert("b", "2"), None);
/// assert_eq!(tree.insert("a", "1"), None);
/// assert_eq!(tree.insert("b", "two"), Some("2".to_string()));
///
/// assert_eq!(tree.get("b"), Some("two"));
/// assert_eq!(tree.len(), 2);
///
/// let keys: Vec<_> = tree.iter().map(|(k, _)| k).collect();
/// assert_eq!(keys, ["a", "b"]);
/// ```
#[derive(Default)]
pub struct AvlTree {
    root: Link,
    len: usize,
}

impl AvlTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    /// Inserts a key/value pair, overwriting the value if the key exists.
    ///
    /// Returns the previous value for the key, if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let (root, previous) = insert(self.root.take(), key.into(), value.into());
        self.root = Some(root);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Looks up the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match key.cmp(node.key.as_str()) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            };
        }
        None
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        let (root, removed) = remove(self.root.take(), key);
        self.root = root;
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Number of keys in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Height of the tree (0 when empty).
    pub fn height(&self) -> u32 {
        height(&self.root)
    }

    /// Iterates over entries in ascending key order.
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self.root.as_deref(), self.len)
    }

    /// Walks the whole tree and checks ordering, balance, stored heights and
    /// the key count.
    ///
    /// This is O(n) and intended for tests and diagnostics.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let mut reachable = 0;
        check_subtree(self.root.as_deref(), None, None, &mut reachable)?;

        if reachable != self.len {
            return Err(InvariantViolation::LengthMismatch {
                recorded: self.len,
                reachable,
            });
        }
        Ok(())
    }
}

/// Returns the actual height of the subtree after checking every node in it.
fn check_subtree(
    node: Option<&Node>,
    lower: Option<&str>,
    upper: Option<&str>,
    reachable: &mut usize,
) -> Result<u32, InvariantViolation> {
    let Some(node) = node else {
        return Ok(0);
    };

    let key = node.key.as_str();
    if lower.is_some_and(|lower| key <= lower) || upper.is_some_and(|upper| key >= upper) {
        return Err(InvariantViolation::OutOfOrder {
            key: node.key.clone(),
        });
    }

    *reachable += 1;
    let left = check_subtree(node.left.as_deref(), lower, Some(key), reachable)?;
    let right = check_subtree(node.right.as_deref(), Some(key), upper, reachable)?;

    let actual = 1 + left.max(right);
    if actual != node.height {
        return Err(InvariantViolation::StaleHeight {
            key: node.key.clone(),
            recorded: node.height,
            actual,
        });
    }

    let balance = i64::from(left) - i64::from(right);
    if !(-1..=1).contains(&balance) {
        return Err(InvariantViolation::Unbalanced {
            key: node.key.clone(),
            balance,
        });
    }

    Ok(actual)
}

impl fmt::Debug for AvlTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AvlTree")
            .field("len", &self.len)
            .field("height", &self.height())
            .finish()
    }
}

/// In-order iterator over an [`AvlTree`].
pub struct Iter<'a> {
    stack: Vec<&'a Node>,
    remaining: usize,
}

impl<'a> Iter<'a> {
    fn new(root: Option<&'a Node>, len: usize) -> Self {
        let mut iter = Self {
            stack: Vec::new(),
            remaining: len,
        };
        iter.push_left_spine(root);
        iter
    }

    fn push_left_spine(&mut self, mut node: Option<&'a Node>) {
        while let Some(current) = node {
            self.stack.push(current);
            node = current.left.as_deref();
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left_spine(node.right.as_deref());
        self.remaining -= 1;
        Some((node.key.as_str(), node.value.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl<'a> IntoIterator for &'a AvlTree {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
