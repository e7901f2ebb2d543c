//! Trie nodes and the arena that owns them.
//!
//! Nodes are addressed by stable [`NodeId`] indices so that splits and heals
//! can move child maps around without invalidating anything the path index or
//! an in-flight insertion holds on to.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Index;

/// Stable index of a node inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    /// The root node. It is allocated with the arena and never freed.
    pub const ROOT: NodeId = NodeId(0);

    /// Raw slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Construction state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seal {
    /// Being built by the in-flight insertion; its value may still grow.
    Open,
    /// This many committed files depend on the node's current boundary.
    Sealed(NonZeroUsize),
}

impl Seal {
    /// Number of committed files depending on this node (0 when open).
    pub fn refs(self) -> usize {
        match self {
            Seal::Open => 0,
            Seal::Sealed(n) => n.get(),
        }
    }

    fn from_refs(refs: usize) -> Self {
        match NonZeroUsize::new(refs) {
            Some(n) => Seal::Sealed(n),
            None => Seal::Open,
        }
    }
}

/// A unit of the compressed trie.
#[derive(Debug, Clone)]
pub struct Node {
    value: Vec<u8>,
    seal: Seal,
    children: BTreeMap<u8, NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    fn open(value: Vec<u8>, parent: Option<NodeId>) -> Self {
        Self {
            value,
            seal: Seal::Open,
            children: BTreeMap::new(),
            parent,
        }
    }

    /// Content segment held by this node.
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Current construction state.
    pub fn seal(&self) -> Seal {
        self.seal
    }

    /// Number of committed files whose path passes through or ends here.
    pub fn refs(&self) -> usize {
        self.seal.refs()
    }

    /// Whether the node is still under construction.
    pub fn is_open(&self) -> bool {
        self.seal == Seal::Open
    }

    /// Child nodes keyed by their first content byte.
    pub fn children(&self) -> &BTreeMap<u8, NodeId> {
        &self.children
    }

    /// Child reached through `key`, if any.
    pub fn child(&self, key: u8) -> Option<NodeId> {
        self.children.get(&key).copied()
    }

    /// Parent node (None for the root).
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }
}

/// Mutable access to a node that is still open.
///
/// This is the only way to grow a node's value in place; the arena hands it
/// out exclusively for [`Seal::Open`] nodes.
pub struct OpenNode<'a> {
    node: &'a mut Node,
}

impl OpenNode<'_> {
    /// Append one byte to the node's value.
    pub fn push(&mut self, byte: u8) {
        self.node.value.push(byte);
    }
}

/// Slot storage for every node of one trie.
#[derive(Debug, Clone)]
pub struct Arena {
    slots: Vec<Option<Node>>,
    free: Vec<usize>,
    live: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Self::new()
    }
}

impl Arena {
    /// Create an arena holding only an empty, open root.
    pub fn new() -> Self {
        Self {
            slots: vec![Some(Node::open(Vec::new(), None))],
            free: Vec::new(),
            live: 1,
        }
    }

    /// Number of live nodes, the root included.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Always false: the root is never freed.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Look up a node, returning None for a freed slot.
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Iterate over every live node.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|node| (NodeId(i), node)))
    }

    /// Total bytes held in node values.
    pub fn stored_bytes(&self) -> usize {
        self.iter().map(|(_, node)| node.value.len()).sum()
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.slots.get_mut(id.0).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("node {} used after being freed", id.0),
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.live += 1;
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.slots.push(Some(node));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Grow access to `id`, only if it is still open.
    pub fn open_mut(&mut self, id: NodeId) -> Option<OpenNode<'_>> {
        let node = self.node_mut(id);
        if node.is_open() {
            Some(OpenNode { node })
        } else {
            None
        }
    }

    /// Add an open child under `parent` keyed by `byte`, holding `[byte]`.
    pub fn add_child(&mut self, parent: NodeId, byte: u8) -> NodeId {
        let child = self.alloc(Node::open(vec![byte], Some(parent)));
        self.node_mut(parent).children.insert(byte, child);
        child
    }

    /// Split `id` at `at`, returning the key of the new suffix child.
    ///
    /// The node keeps `value[..at]` and its seal; the suffix child takes
    /// `value[at..]`, the whole previous child map and the same refs, since
    /// every file through the node also consumed its suffix.
    pub fn split(&mut self, id: NodeId, at: usize) -> u8 {
        let node = self.node_mut(id);
        debug_assert!(at < node.value.len(), "split point past end of value");

        let suffix = node.value.split_off(at);
        let children = std::mem::take(&mut node.children);
        let seal = node.seal;
        let key = suffix[0];

        let tail = self.alloc(Node {
            value: suffix,
            seal,
            children,
            parent: Some(id),
        });

        // Grandchildren now hang off the suffix node
        let grandchildren: Vec<NodeId> = self.node_mut(tail).children.values().copied().collect();
        for grandchild in grandchildren {
            self.node_mut(grandchild).parent = Some(tail);
        }

        self.node_mut(id).children.insert(key, tail);
        key
    }

    /// Merge the only child of `id` into it, returning the removed key.
    ///
    /// Returns None unless `id` has exactly one child.
    pub fn absorb_only_child(&mut self, id: NodeId) -> Option<u8> {
        let node = self.node_mut(id);
        if node.children.len() != 1 {
            return None;
        }
        let (key, child) = node.children.pop_first()?;

        let taken = self.slots[child.0].take()?;
        self.free.push(child.0);
        self.live -= 1;

        for grandchild in taken.children.values() {
            self.node_mut(*grandchild).parent = Some(id);
        }

        let node = self.node_mut(id);
        node.value.extend_from_slice(&taken.value);
        node.children = taken.children;
        Some(key)
    }

    /// Add one dependent file to `id`.
    pub fn retain(&mut self, id: NodeId) {
        let node = self.node_mut(id);
        node.seal = Seal::from_refs(node.seal.refs() + 1);
    }

    /// Remove one dependent file from `id`, returning the remaining refs.
    pub fn release(&mut self, id: NodeId) -> usize {
        let node = self.node_mut(id);
        let refs = node.seal.refs().saturating_sub(1);
        node.seal = Seal::from_refs(refs);
        refs
    }

    /// Detach the child keyed by `key` from `parent` and free its subtree.
    ///
    /// Returns the number of nodes and value bytes reclaimed.
    pub fn remove_subtree(&mut self, parent: NodeId, key: u8) -> (usize, usize) {
        let Some(child) = self.node_mut(parent).children.remove(&key) else {
            return (0, 0);
        };
        self.free_from(vec![child])
    }

    /// Reset the root to an empty, open node, freeing everything below it.
    pub fn reset_root(&mut self) -> (usize, usize) {
        let root = self.node_mut(NodeId::ROOT);
        let children: Vec<NodeId> = std::mem::take(&mut root.children).into_values().collect();
        let root_bytes = root.value.len();
        root.value.clear();
        root.seal = Seal::Open;

        let (nodes, bytes) = self.free_from(children);
        (nodes, bytes + root_bytes)
    }

    fn free_from(&mut self, mut stack: Vec<NodeId>) -> (usize, usize) {
        let mut nodes = 0;
        let mut bytes = 0;
        while let Some(id) = stack.pop() {
            if let Some(node) = self.slots[id.0].take() {
                self.free.push(id.0);
                self.live -= 1;
                nodes += 1;
                bytes += node.value.len();
                stack.extend(node.children.into_values());
            }
        }
        (nodes, bytes)
    }
}

impl Index<NodeId> for Arena {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("node {} used after being freed", id.0),
        }
    }
}
