//! Node representation and the pluggable child-storage strategies.

use std::collections::BTreeMap;

/// Child lookup/storage capability of a trie node.
///
/// The traversal algorithms in [`super::SetTrie`] only ever need ordered
/// access: children are enumerated in ascending column order, which both
/// strategies guarantee. [`DenseChildren`] spends a universe-sized slot array
/// per node and is the right choice when the universe is modest and known
/// upfront; [`SparseChildren`] keeps an ordered map and suits wide universes
/// where most columns are absent from most branches.
pub trait Children: Sized {
    /// An empty child table for a node in a universe of the given size.
    fn new(universe: usize) -> Self;

    /// The child keyed by `column`, if present.
    fn get(&self, column: usize) -> Option<&TrieNode<Self>>;

    /// Mutable access to the child keyed by `column`.
    fn get_mut(&mut self, column: usize) -> Option<&mut TrieNode<Self>>;

    /// The child keyed by `column`, created empty if absent. `column` must be
    /// below the universe size.
    fn get_or_insert(&mut self, column: usize, universe: usize) -> &mut TrieNode<Self>;

    /// Removes and returns the child keyed by `column`.
    fn remove(&mut self, column: usize) -> Option<TrieNode<Self>>;

    /// Number of present children.
    fn len(&self) -> usize;

    /// Whether no children are present.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Present children as `(column, child)` in ascending column order.
    fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = (usize, &'a TrieNode<Self>)> + 'a>;
}

/// A single trie node: the path of column indices from the root to this node
/// is one candidate combination, stored iff `terminal` is set.
pub struct TrieNode<C> {
    pub(crate) children: C,
    pub(crate) terminal: bool,
}

impl<C: Children> TrieNode<C> {
    pub(crate) fn new(universe: usize) -> Self {
        TrieNode {
            children: C::new(universe),
            terminal: false,
        }
    }

    /// Whether the root-to-here path is a stored member.
    pub fn is_terminal(&self) -> bool {
        self.terminal
    }
}

/// Universe-size-bounded array of child slots.
pub struct DenseChildren {
    slots: Vec<Option<Box<TrieNode<DenseChildren>>>>,
    len: usize,
}

impl Children for DenseChildren {
    fn new(universe: usize) -> Self {
        DenseChildren {
            slots: (0..universe).map(|_| None).collect(),
            len: 0,
        }
    }

    fn get(&self, column: usize) -> Option<&TrieNode<Self>> {
        self.slots.get(column)?.as_deref()
    }

    fn get_mut(&mut self, column: usize) -> Option<&mut TrieNode<Self>> {
        self.slots.get_mut(column)?.as_deref_mut()
    }

    fn get_or_insert(&mut self, column: usize, universe: usize) -> &mut TrieNode<Self> {
        let slot = &mut self.slots[column];
        if slot.is_none() {
            *slot = Some(Box::new(TrieNode::new(universe)));
            self.len += 1;
        }
        slot.as_deref_mut().unwrap()
    }

    fn remove(&mut self, column: usize) -> Option<TrieNode<Self>> {
        let node = self.slots.get_mut(column)?.take()?;
        self.len -= 1;
        Some(*node)
    }

    fn len(&self) -> usize {
        self.len
    }

    fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = (usize, &'a TrieNode<Self>)> + 'a> {
        Box::new(
            self.slots
                .iter()
                .enumerate()
                .filter_map(|(column, slot)| slot.as_deref().map(|node| (column, node))),
        )
    }
}

/// Ordered map from column index to child node.
pub struct SparseChildren {
    map: BTreeMap<usize, TrieNode<SparseChildren>>,
}

impl Children for SparseChildren {
    fn new(_universe: usize) -> Self {
        SparseChildren {
            map: BTreeMap::new(),
        }
    }

    fn get(&self, column: usize) -> Option<&TrieNode<Self>> {
        self.map.get(&column)
    }

    fn get_mut(&mut self, column: usize) -> Option<&mut TrieNode<Self>> {
        self.map.get_mut(&column)
    }

    fn get_or_insert(&mut self, column: usize, universe: usize) -> &mut TrieNode<Self> {
        self.map.entry(column).or_insert_with(|| TrieNode::new(universe))
    }

    fn remove(&mut self, column: usize) -> Option<TrieNode<Self>> {
        self.map.remove(&column)
    }

    fn len(&self) -> usize {
        self.map.len()
    }

    fn iter<'a>(&'a self) -> Box<dyn Iterator<Item = (usize, &'a TrieNode<Self>)> + 'a> {
        Box::new(self.map.iter().map(|(&column, node)| (column, node)))
    }
}
