//! Skip List Module
//!
//! Ordered, multi-level linked index used by the memtable.
//!
//! ## Layout
//! Nodes live in one growable arena; links are arena indices, so the
//! structure owns everything it points at and cannot form reference cycles.
//! ```text
//! level 2   ROOT ─────────────────► 5 ────────────────► END
//! level 1   ROOT ─────► 3 ────────► 5 ─────────► 9 ────► END
//! level 0   ROOT ► 1 ─► 3 ─► 4 ───► 5 ─► 8 ────► 9 ────► END
//!
//! arena:    [ROOT, 5, 3, 1, 8, 9, 4]   (insertion order)
//! ```
//! Slot 0 is the sentinel (`ROOT`): it has no value, compares below every
//! key, is linked at every level and is never removed.
//!
//! ## Search Contract
//! The traversal finds the rightmost node whose key is `<=` the target.
//! That node is a *candidate*: callers compare its value with the key
//! themselves, a mismatch (or the sentinel) means the key is absent.
//! [`SkipList::get`] does that comparison for you.
//!
//! ## Concurrency
//! Not synchronized. Mutation takes `&mut self`; wrap the list in a lock to
//! share it (the memtable does).

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, SkipKvError};

/// Default number of levels per list
pub const DEFAULT_MAX_LEVELS: usize = 16;

/// Probability that a node linked at level L is also linked at L + 1
const PROMOTION_PROBABILITY: f64 = 0.5;

/// Arena slot of the sentinel
const SENTINEL: usize = 0;

#[derive(Debug, Clone)]
struct Node<T> {
    /// `None` only for the sentinel
    value: Option<T>,
    /// One slot per level this node is linked at. Levels above
    /// `forward.len()` behave as "none".
    forward: Vec<Option<usize>>,
}

/// Probabilistic ordered index with duplicate keys allowed
#[derive(Clone)]
pub struct SkipList<T> {
    nodes: Vec<Node<T>>,
    max_levels: usize,
    /// Number of levels holding at least one real node (at least 1)
    height: usize,
    len: usize,
    rng: StdRng,
}

impl<T> SkipList<T> {
    /// Create an empty list with `max_levels` levels
    pub fn new(max_levels: usize) -> Result<Self> {
        Self::with_rng(max_levels, StdRng::from_entropy())
    }

    /// Create an empty list whose level promotion is reproducible
    pub fn with_seed(max_levels: usize, seed: u64) -> Result<Self> {
        Self::with_rng(max_levels, StdRng::seed_from_u64(seed))
    }

    fn with_rng(max_levels: usize, rng: StdRng) -> Result<Self> {
        if max_levels == 0 {
            return Err(SkipKvError::Config(
                "skip list needs at least one level".to_string(),
            ));
        }
        Ok(Self::empty(max_levels, rng))
    }

    /// Sentinel-only list. `max_levels` must be non-zero.
    fn empty(max_levels: usize, rng: StdRng) -> Self {
        let root = Node {
            value: None,
            forward: vec![None; max_levels],
        };

        Self {
            nodes: vec![root],
            max_levels,
            height: 1,
            len: 0,
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_levels(&self) -> usize {
        self.max_levels
    }

    /// Number of levels currently holding at least one node
    pub fn height(&self) -> usize {
        self.height
    }

    /// The sentinel node
    pub fn root(&self) -> NodeRef<'_, T> {
        NodeRef {
            list: self,
            id: SENTINEL,
        }
    }

    /// Ascending traversal of level 0
    pub fn iter(&self) -> Iter<'_, T> {
        self.iter_level(0)
    }

    /// Same as [`SkipList::iter`]. Each call starts a fresh snapshot walk.
    pub fn dump(&self) -> Iter<'_, T> {
        self.iter()
    }

    /// Ascending traversal of one level's chain. Levels past `max_levels`
    /// are empty.
    pub fn iter_level(&self, level: usize) -> Iter<'_, T> {
        Iter {
            nodes: &self.nodes,
            level,
            next: self.link(SENTINEL, level),
        }
    }

    fn link(&self, id: usize, level: usize) -> Option<usize> {
        self.nodes[id].forward.get(level).copied().flatten()
    }

    /// Coin-flip height: level 0 always, each further level with p = 0.5
    fn random_height(&mut self) -> usize {
        let mut height = 1;
        while height < self.max_levels && self.rng.gen_bool(PROMOTION_PROBABILITY) {
            height += 1;
        }
        height
    }

    /// Append `value` after the current tails. Caller keeps values ascending.
    fn push_back(&mut self, tails: &mut [usize], value: T) {
        let height = self.random_height();
        let id = self.nodes.len();

        self.nodes.push(Node {
            value: Some(value),
            forward: vec![None; height],
        });
        for (level, tail) in tails.iter_mut().enumerate().take(height) {
            self.nodes[*tail].forward[level] = Some(id);
            *tail = id;
        }

        self.height = self.height.max(height);
        self.len += 1;
    }
}

impl<T: Ord> SkipList<T> {
    /// Top-down walk: advance while the next key is `<= key`, then drop a
    /// level. Returns the final node and the last node visited per level.
    fn search<Q>(&self, key: &Q) -> (usize, Vec<usize>)
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut updates = vec![SENTINEL; self.max_levels];
        let mut current = SENTINEL;

        // Levels at or above `height` only hold the sentinel's empty links.
        for level in (0..self.height).rev() {
            while let Some(next) = self.link(current, level) {
                match self.nodes[next].value.as_ref() {
                    Some(value) if <T as Borrow<Q>>::borrow(value) <= key => current = next,
                    _ => break,
                }
            }
            updates[level] = current;
        }

        (current, updates)
    }

    /// Rightmost node with key `<= key` plus the per-level update nodes.
    ///
    /// Returns the sentinel when every key is greater (or the list is empty).
    pub fn find_predecessor<Q>(&self, key: &Q) -> (NodeRef<'_, T>, Vec<NodeRef<'_, T>>)
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let (candidate, updates) = self.search(key);
        let updates = updates
            .into_iter()
            .map(|id| NodeRef { list: self, id })
            .collect();
        (
            NodeRef {
                list: self,
                id: candidate,
            },
            updates,
        )
    }

    /// Candidate lookup: the rightmost node with key `<= key`.
    ///
    /// This is not an equality check. If `node.value()` does not equal the
    /// key, the key is absent. With duplicates the newest insert is returned.
    pub fn find<Q>(&self, key: &Q) -> NodeRef<'_, T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        NodeRef {
            list: self,
            id: self.search(key).0,
        }
    }

    /// Exact-match lookup layered on [`SkipList::find`]
    pub fn get<Q>(&self, key: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find(key)
            .value()
            .filter(|value| <T as Borrow<Q>>::borrow(*value) == key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Link `value` after every node `<=` it, so equal keys keep insertion
    /// order and the newest one is found first. Never fails.
    pub fn insert(&mut self, value: T) {
        let (_, updates) = self.search::<T>(&value);
        let height = self.random_height();
        let id = self.nodes.len();

        let forward = (0..height)
            .map(|level| self.nodes[updates[level]].forward[level])
            .collect();
        self.nodes.push(Node {
            value: Some(value),
            forward,
        });
        for (level, &update) in updates.iter().enumerate().take(height) {
            self.nodes[update].forward[level] = Some(id);
        }

        self.height = self.height.max(height);
        self.len += 1;
    }

    /// Ascending walk yielding only the last (newest) entry of each run of
    /// equal keys.
    pub fn iter_newest(&self) -> impl Iterator<Item = &T> + '_ {
        let mut entries = self.iter().peekable();
        std::iter::from_fn(move || {
            let mut current = entries.next()?;
            while let Some(next) = entries.next_if(|next| *next == current) {
                current = next;
            }
            Some(current)
        })
    }
}

impl<T: Ord + Clone> SkipList<T> {
    /// Newer-wins two-way merge; `self` is the newer side.
    ///
    /// Each input first collapses its own duplicate runs to the newest entry;
    /// on equal keys the entry from `self` is emitted and both sides advance.
    /// Both lists must have the same `max_levels`; use
    /// [`SkipList::merge_with_levels`] to merge lists configured differently.
    pub fn merge(&self, older: &SkipList<T>) -> Result<SkipList<T>> {
        if self.max_levels != older.max_levels {
            return Err(SkipKvError::Config(format!(
                "cannot merge skip lists with {} and {} levels; pick a level count explicitly",
                self.max_levels, older.max_levels
            )));
        }
        self.merge_with_levels(older, self.max_levels)
    }

    /// Newer-wins merge into a list with `max_levels` levels, which must be at
    /// least the level count of both inputs.
    pub fn merge_with_levels(&self, older: &SkipList<T>, max_levels: usize) -> Result<SkipList<T>> {
        let required = self.max_levels.max(older.max_levels);
        if max_levels < required {
            return Err(SkipKvError::Config(format!(
                "merged skip list needs at least {} levels, got {}",
                required, max_levels
            )));
        }

        let seed = self.rng.clone().gen::<u64>();
        let mut merged = SkipList::with_seed(max_levels, seed)?;
        let mut tails = vec![SENTINEL; max_levels];

        let mut newer = self.iter_newest().peekable();
        let mut older = older.iter_newest().peekable();
        loop {
            let ordering = match (newer.peek(), older.peek()) {
                (Some(a), Some(b)) => a.cmp(b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => break,
            };

            let value = match ordering {
                Ordering::Equal => {
                    older.next();
                    newer.next()
                }
                Ordering::Less => newer.next(),
                Ordering::Greater => older.next(),
            };
            if let Some(value) = value {
                merged.push_back(&mut tails, value.clone());
            }
        }

        Ok(merged)
    }
}

impl<T> Default for SkipList<T> {
    fn default() -> Self {
        Self::empty(DEFAULT_MAX_LEVELS, StdRng::from_entropy())
    }
}

impl<T: fmt::Debug> fmt::Debug for SkipList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

/// One line per level, top first: `L1: ROOT -> 3 -> 9 -> END`
impl<T: fmt::Display> fmt::Display for SkipList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for level in (0..self.height).rev() {
            write!(f, "L{}: ROOT", level)?;
            for value in self.iter_level(level) {
                write!(f, " -> {}", value)?;
            }
            writeln!(f, " -> END")?;
        }
        Ok(())
    }
}

impl<'a, T> IntoIterator for &'a SkipList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// =============================================================================
// Node Handles
// =============================================================================

/// Borrowed handle to a node (or the sentinel)
pub struct NodeRef<'a, T> {
    list: &'a SkipList<T>,
    id: usize,
}

impl<'a, T> NodeRef<'a, T> {
    /// The node's value; `None` for the sentinel
    pub fn value(&self) -> Option<&'a T> {
        self.list.nodes[self.id].value.as_ref()
    }

    pub fn is_sentinel(&self) -> bool {
        self.id == SENTINEL
    }

    /// Number of levels this node is linked at
    pub fn height(&self) -> usize {
        if self.is_sentinel() {
            self.list.max_levels
        } else {
            self.list.nodes[self.id].forward.len()
        }
    }

    /// Next node at `level`, if any
    pub fn next(&self, level: usize) -> Option<NodeRef<'a, T>> {
        self.list.link(self.id, level).map(|id| NodeRef {
            list: self.list,
            id,
        })
    }
}

impl<T> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeRef<'_, T> {}

impl<T: fmt::Debug> fmt::Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value() {
            Some(value) => f.debug_tuple("Node").field(value).finish(),
            None => f.write_str("Sentinel"),
        }
    }
}

/// Ascending iterator over one level of a [`SkipList`]
pub struct Iter<'a, T> {
    nodes: &'a [Node<T>],
    level: usize,
    next: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let nodes = self.nodes;
        let node = &nodes[self.next?];
        self.next = node.forward.get(self.level).copied().flatten();
        node.value.as_ref()
    }
}
