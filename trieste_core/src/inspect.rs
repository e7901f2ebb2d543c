//! Diagnostics: sharing statistics, node snapshots and integrity checks.

use crate::error::{Error, Result};
use crate::node::NodeId;
use crate::trie::Trie;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write;

/// Label used for integrity errors that are not tied to one file.
const TRIE_LABEL: &str = "<trie>";

/// Storage statistics for a trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrieStats {
    /// Number of named files.
    pub files: usize,
    /// Deleted files whose cleanup has not run yet.
    pub pending_cleanups: usize,
    /// Live nodes, the root included.
    pub nodes: usize,
    /// Bytes actually held in node values.
    pub stored_bytes: usize,
    /// Sum of all named files' lengths.
    pub logical_bytes: usize,
}

impl TrieStats {
    /// Bytes saved by prefix sharing.
    pub fn saved_bytes(&self) -> usize {
        self.logical_bytes.saturating_sub(self.stored_bytes)
    }
}

/// Owned, recursive view of a node and everything below it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    /// Node value.
    pub value: Vec<u8>,
    /// Files depending on this node.
    pub refs: usize,
    /// Children keyed by their first byte.
    pub children: BTreeMap<u8, NodeView>,
}

impl NodeView {
    /// Number of nodes in this view.
    pub fn count(&self) -> usize {
        1 + self.children.values().map(NodeView::count).sum::<usize>()
    }

    /// Indented, one node per line, values escaped as ASCII.
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out
    }

    fn render_into(&self, out: &mut String, depth: usize) {
        let _ = writeln!(
            out,
            "{:indent$}\"{}\" refs={}",
            "",
            self.value.escape_ascii(),
            self.refs,
            indent = depth * 2
        );
        for child in self.children.values() {
            child.render_into(out, depth + 1);
        }
    }
}

impl Trie {
    /// Current storage statistics.
    pub fn stats(&self) -> TrieStats {
        TrieStats {
            files: self.index().len(),
            pending_cleanups: self.index().pending_len(),
            nodes: self.arena().len(),
            stored_bytes: self.arena().stored_bytes(),
            logical_bytes: self.index().iter().map(|(_, record)| record.length).sum(),
        }
    }

    /// Snapshot of the whole node graph.
    pub fn snapshot(&self) -> NodeView {
        self.view(NodeId::ROOT)
    }

    fn view(&self, id: NodeId) -> NodeView {
        let node = &self.arena()[id];
        NodeView {
            value: node.value().to_vec(),
            refs: node.refs(),
            children: node
                .children()
                .iter()
                .map(|(key, child)| (*key, self.view(*child)))
                .collect(),
        }
    }

    /// Check every structural invariant of the graph against the index.
    ///
    /// - every recorded path (named or awaiting cleanup) resolves
    /// - each node's refs equal the number of records passing through it
    /// - child keys match the first byte of the child's value
    /// - parent links point back to the owning node
    /// - the trie is canonical: nothing heals any further
    pub fn verify_integrity(&self) -> Result<()> {
        let arena = self.arena();

        // Count the records that pass through each node
        let mut expected: HashMap<NodeId, usize> = HashMap::new();
        for record in self.index().records() {
            let mut current = NodeId::ROOT;
            *expected.entry(current).or_default() += 1;
            for (depth, &key) in record.path.iter().enumerate() {
                current = arena[current].child(key).ok_or_else(|| {
                    Error::corrupted(
                        TRIE_LABEL,
                        format!("path {:02x?} breaks at depth {}", record.path, depth),
                    )
                })?;
                *expected.entry(current).or_default() += 1;
            }
        }

        for (id, node) in arena.iter() {
            let want = expected.get(&id).copied().unwrap_or(0);
            if node.refs() != want {
                return Err(Error::corrupted(
                    TRIE_LABEL,
                    format!(
                        "node {} has refs {}, {} records pass through it",
                        id.index(),
                        node.refs(),
                        want
                    ),
                ));
            }

            if id == NodeId::ROOT {
                if want == 0 && (!node.value().is_empty() || !node.children().is_empty()) {
                    return Err(Error::corrupted(TRIE_LABEL, "unreferenced root is not empty"));
                }
            } else if want == 0 {
                return Err(Error::corrupted(
                    TRIE_LABEL,
                    format!("node {} is unreferenced but still linked", id.index()),
                ));
            }

            for (&key, &child) in node.children() {
                let child_node = arena.get(child).ok_or_else(|| {
                    Error::corrupted(TRIE_LABEL, format!("node {} links a freed slot", id.index()))
                })?;
                if child_node.value().first() != Some(&key) {
                    return Err(Error::corrupted(
                        TRIE_LABEL,
                        format!("child key {:#04x} does not start its value", key),
                    ));
                }
                if child_node.parent() != Some(id) {
                    return Err(Error::corrupted(
                        TRIE_LABEL,
                        format!("node {} has a stale parent link", child.index()),
                    ));
                }
            }

            if let Some((_, &only)) = node.children().first_key_value()
                && node.children().len() == 1
                && arena[only].refs() == node.refs()
            {
                return Err(Error::corrupted(
                    TRIE_LABEL,
                    format!("node {} and its only child were not healed", id.index()),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_prefix_sharing() {
        let mut trie = Trie::new();
        trie.insert("abc", b"abc");
        trie.insert("abb", b"abb");

        let stats = trie.stats();
        assert_eq!(stats.files, 2);
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.stored_bytes, 4);
        assert_eq!(stats.logical_bytes, 6);
        assert_eq!(stats.saved_bytes(), 2);
    }

    #[test]
    fn test_snapshot_and_render() {
        let mut trie = Trie::new();
        trie.insert("abc", b"abc");
        trie.insert("abb", b"abb");

        let snapshot = trie.snapshot();
        assert_eq!(snapshot.count(), 3);
        assert_eq!(snapshot.value, b"ab");
        assert_eq!(snapshot.refs, 2);
        assert_eq!(snapshot.children[&b'b'].value, b"b");

        let rendered = snapshot.render();
        assert_eq!(rendered, "\"ab\" refs=2\n  \"b\" refs=1\n  \"c\" refs=1\n");
    }

    #[test]
    fn test_render_escapes_binary() {
        let mut trie = Trie::new();
        trie.insert("bin", &[0x00, b'\n', 0xff]);
        assert_eq!(trie.snapshot().render(), "\"\\x00\\n\\xff\" refs=1\n");
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut trie = Trie::new();
        trie.insert("a", b"a");
        let json = serde_json::to_value(trie.snapshot()).unwrap();
        assert_eq!(json["refs"], 1);
        assert_eq!(json["value"], serde_json::json!([97]));
    }

    #[test]
    fn test_verify_integrity_holds_through_lifecycle() {
        let mut trie = Trie::new();
        trie.verify_integrity().unwrap();

        for (name, content) in [
            ("a", "abc"),
            ("b", "abd"),
            ("c", "a"),
            ("d", ""),
            ("e", "abcdef"),
        ] {
            trie.insert(name, content.as_bytes());
            trie.verify_integrity().unwrap();
        }

        assert!(trie.copy("e", "f"));
        trie.verify_integrity().unwrap();

        let ticket = trie.detach("a").unwrap();
        trie.verify_integrity().unwrap();
        trie.insert("g", b"abx");
        trie.verify_integrity().unwrap();
        trie.reclaim(ticket).unwrap();
        trie.verify_integrity().unwrap();

        for name in ["b", "c", "d", "e", "f", "g"] {
            trie.remove(name).unwrap();
            trie.verify_integrity().unwrap();
        }
        assert_eq!(trie.arena().len(), 1);
    }
}
