//! Set-containment index over column combinations.
//!
//! Combinations are stored as root-to-node paths of strictly increasing
//! column indices; a terminal flag marks complete members. The index answers
//! the queries profiling algorithms prune candidates with: enumerate stored
//! sets, find stored subsets/supersets of a query, test for their existence,
//! and compute the minimal stored sets.
//!
//! All traversals run breadth-first over an explicit work queue; nothing here
//! recurses, so wide or deep universes cannot exhaust the stack. Branches
//! with no terminal descendant are pruned on removal, and the empty
//! combination is never materialized: inserting it is a no-op, and once any
//! member is stored it is implicitly a subset of everything without being an
//! entry of its own.

use std::collections::VecDeque;

use crate::column_set::ColumnSet;
use crate::{Error, Result};

mod node;

pub use node::{Children, DenseChildren, SparseChildren, TrieNode};

/// Containment index with dense, universe-size-bounded child arrays.
pub type DenseSetTrie = SetTrie<DenseChildren>;
/// Containment index with sparse, ordered-map children.
pub type SparseSetTrie = SetTrie<SparseChildren>;

/// A prefix tree over ascending column-index paths.
///
/// The child-storage strategy is a type parameter; see [`Children`] for how
/// to choose one.
pub struct SetTrie<C: Children = DenseChildren> {
    root: TrieNode<C>,
    universe: usize,
    len: usize,
}

impl<C: Children> SetTrie<C> {
    /// An empty index over `universe` columns.
    pub fn new(universe: usize) -> Self {
        SetTrie {
            root: TrieNode::new(universe),
            universe,
            len: 0,
        }
    }

    /// The declared universe size.
    pub fn universe(&self) -> usize {
        self.universe
    }

    /// Number of stored (non-empty) members.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no member is stored.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, set: &ColumnSet) -> Result<()> {
        match set.iter().find(|&column| column >= self.universe) {
            Some(column) => Err(Error::ColumnOutOfBounds {
                column,
                universe: self.universe,
            }),
            None => Ok(()),
        }
    }

    /// Stores `set`. Returns whether it was newly inserted; inserting the
    /// empty combination is absorbed and reports `false`.
    pub fn insert(&mut self, set: &ColumnSet) -> Result<bool> {
        self.check(set)?;
        Ok(self.insert_checked(set))
    }

    fn insert_checked(&mut self, set: &ColumnSet) -> bool {
        if set.is_empty() {
            return false;
        }
        let mut node = &mut self.root;
        for column in set.iter() {
            node = node.children.get_or_insert(column, self.universe);
        }
        if node.terminal {
            false
        } else {
            node.terminal = true;
            self.len += 1;
            true
        }
    }

    /// Whether `set` is a stored member. The empty combination is never one.
    pub fn contains(&self, set: &ColumnSet) -> bool {
        if set.is_empty() {
            return false;
        }
        let mut node = &self.root;
        for column in set.iter() {
            match node.children.get(column) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.terminal
    }

    /// Removes `set`. Returns whether it was present. Every branch left
    /// without a terminal descendant is pruned.
    pub fn remove(&mut self, set: &ColumnSet) -> Result<bool> {
        self.check(set)?;
        if set.is_empty() {
            return Ok(false);
        }
        let columns: Vec<usize> = set.iter().collect();

        // First pass: confirm membership and find the deepest ancestor that
        // must survive pruning: the root, a terminal node, or a node with
        // another child branch.
        let mut prune_depth = 0;
        {
            let mut node = &self.root;
            for (depth, &column) in columns.iter().enumerate() {
                if depth > 0 && (node.terminal || node.children.len() > 1) {
                    prune_depth = depth;
                }
                match node.children.get(column) {
                    Some(child) => node = child,
                    None => return Ok(false),
                }
            }
            if !node.terminal {
                return Ok(false);
            }
        }

        // Second pass: clear the flag, then cut the dead branch if the
        // member's node has no subtree of its own.
        let mut node = &mut self.root;
        for &column in &columns {
            node = node.children.get_mut(column).unwrap();
        }
        node.terminal = false;
        let leaf_empty = node.children.is_empty();
        self.len -= 1;
        if leaf_empty {
            let mut node = &mut self.root;
            for &column in &columns[..prune_depth] {
                node = node.children.get_mut(column).unwrap();
            }
            node.children.remove(columns[prune_depth]);
        }
        Ok(true)
    }

    /// Every stored member, in ascending (size, then lexicographic) order.
    pub fn sets(&self) -> Vec<ColumnSet> {
        let mut out = Vec::with_capacity(self.len);
        let mut queue = VecDeque::new();
        queue.push_back((&self.root, ColumnSet::empty(self.universe)));
        while let Some((node, path)) = queue.pop_front() {
            if node.terminal {
                out.push(path.clone());
            }
            for (column, child) in node.children.iter() {
                queue.push_back((child, path.extended(column)));
            }
        }
        out
    }

    /// The stored members that are subsets of `query` (including `query`
    /// itself if stored).
    pub fn subsets_of(&self, query: &ColumnSet) -> Vec<ColumnSet> {
        let bits: Vec<usize> = query.iter().collect();
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((&self.root, ColumnSet::empty(self.universe), 0usize));
        while let Some((node, path, from)) = queue.pop_front() {
            // A terminal reached through query bits is a subset. A node with
            // an empty subtree is reported too: the path cannot extend, and
            // what is there already qualifies.
            if !path.is_empty() && (node.terminal || node.children.is_empty()) {
                out.push(path.clone());
            }
            for (offset, &bit) in bits[from..].iter().enumerate() {
                if let Some(child) = node.children.get(bit) {
                    queue.push_back((child, path.extended(bit), from + offset + 1));
                }
            }
        }
        out
    }

    /// Whether any stored member is a subset of `query`. Short-circuits on
    /// the first match.
    pub fn contains_subset_of(&self, query: &ColumnSet) -> bool {
        let bits: Vec<usize> = query.iter().collect();
        let mut queue = VecDeque::new();
        queue.push_back((&self.root, 0usize, false));
        while let Some((node, from, nonroot)) = queue.pop_front() {
            if nonroot && (node.terminal || node.children.is_empty()) {
                return true;
            }
            for (offset, &bit) in bits[from..].iter().enumerate() {
                if let Some(child) = node.children.get(bit) {
                    queue.push_back((child, from + offset + 1, true));
                }
            }
        }
        false
    }

    /// The stored members that are supersets of `query` (including `query`
    /// itself if stored). Every stored member is a superset of the empty
    /// combination.
    pub fn supersets_of(&self, query: &ColumnSet) -> Vec<ColumnSet> {
        let bits: Vec<usize> = query.iter().collect();
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back((&self.root, ColumnSet::empty(self.universe), 0usize));
        while let Some((node, path, consumed)) = queue.pop_front() {
            if consumed == bits.len() && node.terminal {
                out.push(path.clone());
            }
            for (column, child) in node.children.iter() {
                if consumed == bits.len() {
                    queue.push_back((child, path.extended(column), consumed));
                } else if column < bits[consumed] {
                    queue.push_back((child, path.extended(column), consumed));
                } else if column == bits[consumed] {
                    queue.push_back((child, path.extended(column), consumed + 1));
                } else {
                    // Children ascend; none of the remaining ones can still
                    // reach the next required bit.
                    break;
                }
            }
        }
        out
    }

    /// Whether any stored member is a superset of `query`. Short-circuits on
    /// the first match; trivially true for the empty combination whenever the
    /// index is non-empty.
    pub fn contains_superset_of(&self, query: &ColumnSet) -> bool {
        if query.is_empty() {
            return !self.is_empty();
        }
        let bits: Vec<usize> = query.iter().collect();
        let mut queue = VecDeque::new();
        queue.push_back((&self.root, 0usize));
        while let Some((node, consumed)) = queue.pop_front() {
            if consumed == bits.len() {
                // All bits consumed: the pruning invariant guarantees a
                // terminal somewhere below (or right here).
                return true;
            }
            for (column, child) in node.children.iter() {
                if column < bits[consumed] {
                    queue.push_back((child, consumed));
                } else if column == bits[consumed] {
                    queue.push_back((child, consumed + 1));
                } else {
                    break;
                }
            }
        }
        false
    }

    /// The stored members of which no other stored member is a proper
    /// subset.
    ///
    /// Members surface from the breadth-first walk in ascending (size, then
    /// lexicographic) order, so every member's stored subsets are confirmed
    /// before the member itself is examined; a secondary index of confirmed
    /// minimal sets answers the subsumption test.
    pub fn minimal_sets(&self) -> Vec<ColumnSet> {
        let mut out = Vec::new();
        let mut confirmed = SetTrie::<C>::new(self.universe);
        let mut queue = VecDeque::new();
        queue.push_back((&self.root, ColumnSet::empty(self.universe)));
        while let Some((node, path)) = queue.pop_front() {
            if node.terminal && !confirmed.contains_subset_of(&path) {
                confirmed.insert_checked(&path);
                out.push(path.clone());
            }
            for (column, child) in node.children.iter() {
                queue.push_back((child, path.extended(column)));
            }
        }
        out
    }
}
