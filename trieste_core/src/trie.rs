//! The compressed trie engine.
//!
//! File contents are fed in one byte at a time. While a node is still open
//! (no committed file depends on it) bytes are appended to it; once sealed, a
//! divergence splits the node and every recorded path through it is
//! rewritten. Deleting a file releases its references, reclaims nodes nobody
//! depends on any more and heals split points that no longer distinguish
//! anything.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::node::{Arena, NodeId};
use crate::path::{PathIndex, PathRecord, Ticket};
use std::collections::BTreeMap;
use tracing::debug;

/// Nodes and bytes given back by one cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reclaimed {
    /// Nodes freed from the arena (including one absorbed by a heal).
    pub nodes: usize,
    /// Value bytes freed.
    pub bytes: usize,
    /// Whether a split point was merged back.
    pub healed: bool,
}

/// Cursor of one in-flight insertion.
struct Insertion {
    current: NodeId,
    cursor: usize,
    path: Vec<u8>,
    visited: Vec<NodeId>,
}

impl Insertion {
    fn start() -> Self {
        Self {
            current: NodeId::ROOT,
            cursor: 0,
            path: Vec::new(),
            visited: vec![NodeId::ROOT],
        }
    }

    fn descend(&mut self, child: NodeId, key: u8) {
        self.current = child;
        // The first byte of a child's value is its key
        self.cursor = 1;
        self.path.push(key);
        self.visited.push(child);
    }
}

/// The node graph plus the path index that addresses it.
#[derive(Debug, Clone, Default)]
pub struct Trie {
    arena: Arena,
    index: PathIndex,
}

impl Trie {
    /// Create an empty trie.
    pub fn new() -> Self {
        Self::default()
    }

    /// The node arena.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// The path index.
    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    /// Insert `content` under `name`, replacing any previous entry.
    ///
    /// Returns true if an entry was replaced.
    pub fn insert(&mut self, name: &str, content: &[u8]) -> bool {
        let replaced = match self.index.remove(name) {
            Some(old) => {
                self.release(&old.path);
                true
            }
            None => false,
        };

        let mut insertion = Insertion::start();
        for &byte in content {
            self.step(&mut insertion, byte);
        }
        self.commit(insertion, name, content);

        replaced
    }

    /// Consume one byte of the file under construction.
    fn step(&mut self, ins: &mut Insertion, byte: u8) {
        // Nobody depends on this node yet: extend it freely
        if let Some(mut open) = self.arena.open_mut(ins.current) {
            open.push(byte);
            ins.cursor += 1;
            return;
        }

        let node = &self.arena[ins.current];
        let value = node.value();

        if ins.cursor < value.len() {
            if value[ins.cursor] == byte {
                ins.cursor += 1;
                return;
            }
            // Diverges inside a sealed value
            self.split(ins);
        } else if let Some(child) = node.child(byte) {
            ins.descend(child, byte);
            return;
        }

        let child = self.arena.add_child(ins.current, byte);
        ins.descend(child, byte);
    }

    /// Split the current node at the insertion cursor and fix every path
    /// running through it.
    fn split(&mut self, ins: &Insertion) {
        let key = self.arena.split(ins.current, ins.cursor);
        let corrected = self.index.correct_split(&ins.path, key);
        debug!(
            depth = ins.path.len(),
            at = ins.cursor,
            key,
            corrected,
            "split node"
        );
    }

    /// Seal every node the insertion passed through and record its path.
    fn commit(&mut self, ins: Insertion, name: &str, content: &[u8]) {
        // The new file ends where existing files continue
        if ins.cursor < self.arena[ins.current].value().len() {
            self.split(&ins);
        }

        for id in &ins.visited {
            self.arena.retain(*id);
        }

        self.index.insert(
            name.to_string(),
            PathRecord {
                path: ins.path,
                length: content.len(),
                digest: Hash::hash_bytes(content),
            },
        );
    }

    /// Give `new` the same content as `existing`.
    ///
    /// Fails if the names are equal or `existing` is absent. An entry already
    /// stored under `new` is replaced.
    pub fn copy(&mut self, existing: &str, new: &str) -> bool {
        if existing == new || !self.index.contains(existing) {
            return false;
        }

        // Releasing the old entry may heal and rewrite `existing`'s path, so
        // the record is read afterwards.
        if let Some(old) = self.index.remove(new) {
            self.release(&old.path);
        }
        let Some(record) = self.index.get(existing).cloned() else {
            return false;
        };

        for id in self.chain(&record.path) {
            self.arena.retain(id);
        }
        self.index.insert(new.to_string(), record);
        true
    }

    /// Remove `name` and clean up its references immediately.
    pub fn remove(&mut self, name: &str) -> Option<Reclaimed> {
        let record = self.index.remove(name)?;
        Some(self.release(&record.path))
    }

    /// Remove `name` but defer cleanup; the returned ticket reclaims it.
    pub fn detach(&mut self, name: &str) -> Option<Ticket> {
        let record = self.index.remove(name)?;
        Some(self.index.park(record))
    }

    /// Clean up a detached record. None if it was already reclaimed.
    pub fn reclaim(&mut self, ticket: Ticket) -> Option<Reclaimed> {
        let record = self.index.take_pending(ticket)?;
        Some(self.release(&record.path))
    }

    /// Clean up every detached record, returning how many there were.
    pub fn reclaim_all(&mut self) -> usize {
        let mut count = 0;
        while let Some(record) = self.index.pop_pending() {
            self.release(&record.path);
            count += 1;
        }
        count
    }

    /// Node ids along `path`, starting with the root.
    fn walk(&self, path: &[u8]) -> Option<Vec<NodeId>> {
        let mut chain = Vec::with_capacity(path.len() + 1);
        let mut current = NodeId::ROOT;
        chain.push(current);
        for &key in path {
            current = self.arena[current].child(key)?;
            chain.push(current);
        }
        Some(chain)
    }

    /// Like [`Trie::walk`], for paths taken from the index while mutating.
    ///
    /// A recorded path that does not resolve means the index and the graph
    /// have diverged; there is no consistent state to fall back to.
    fn chain(&self, path: &[u8]) -> Vec<NodeId> {
        match self.walk(path) {
            Some(chain) => chain,
            None => panic!("recorded path {:02x?} does not resolve in the trie", path),
        }
    }

    /// Drop one file's references along `path`, reclaim and heal.
    fn release(&mut self, path: &[u8]) -> Reclaimed {
        let chain = self.chain(path);

        // Refs never increase going down a path, so the dead nodes form a
        // suffix of the chain.
        let mut first_dead = None;
        for (depth, &id) in chain.iter().enumerate() {
            if self.arena.release(id) == 0 && first_dead.is_none() {
                first_dead = Some(depth);
            }
        }

        let mut reclaimed = Reclaimed::default();
        let survivor = match first_dead {
            Some(0) => {
                let (nodes, bytes) = self.arena.reset_root();
                debug!(nodes, bytes, "last file released, root reset");
                reclaimed.nodes = nodes;
                reclaimed.bytes = bytes;
                return reclaimed;
            }
            Some(depth) => {
                let (nodes, bytes) = self.arena.remove_subtree(chain[depth - 1], path[depth - 1]);
                debug!(depth, nodes, bytes, "reclaimed subtree");
                reclaimed.nodes = nodes;
                reclaimed.bytes = bytes;
                depth - 1
            }
            None => chain.len() - 1,
        };

        if self.heal(chain[survivor], &path[..survivor]) {
            reclaimed.nodes += 1;
            reclaimed.healed = true;
        }
        reclaimed
    }

    /// Merge `id` with its only child if no file ends at `id`.
    fn heal(&mut self, id: NodeId, prefix: &[u8]) -> bool {
        let node = &self.arena[id];
        let Some((_, &child)) = node.children().first_key_value() else {
            return false;
        };
        if node.children().len() != 1 || self.arena[child].refs() != node.refs() {
            return false;
        }

        let Some(key) = self.arena.absorb_only_child(id) else {
            return false;
        };
        let corrected = self.index.correct_heal(prefix);
        debug!(depth = prefix.len(), key, corrected, "healed split point");
        true
    }

    /// Rebuild the content of `name`. `Ok(None)` if the name is unknown.
    pub fn get(&self, name: &str, verify: bool) -> Result<Option<Vec<u8>>> {
        match self.index.get(name) {
            Some(record) => self.reconstruct(name, record, verify).map(Some),
            None => Ok(None),
        }
    }

    /// Concatenate the values along a record's path.
    fn reconstruct(&self, name: &str, record: &PathRecord, verify: bool) -> Result<Vec<u8>> {
        let mut content = Vec::with_capacity(record.length);
        let mut current = NodeId::ROOT;
        content.extend_from_slice(self.arena[current].value());

        for (depth, &key) in record.path.iter().enumerate() {
            current = self.arena[current].child(key).ok_or_else(|| {
                Error::corrupted(
                    name,
                    format!("no child keyed {:#04x} at depth {}", key, depth),
                )
            })?;
            content.extend_from_slice(self.arena[current].value());
        }

        if content.len() != record.length {
            return Err(Error::corrupted(
                name,
                format!(
                    "Length mismatch: expected {}, got {}",
                    record.length,
                    content.len()
                ),
            ));
        }

        if verify {
            let computed = Hash::hash_bytes(&content);
            if computed != record.digest {
                return Err(Error::corrupted(
                    name,
                    format!(
                        "Hash mismatch: expected {}, got {}",
                        record.digest.to_hex(),
                        computed.to_hex()
                    ),
                ));
            }
        }

        Ok(content)
    }

    /// Every name with its content.
    pub fn list(&self, verify: bool) -> Result<BTreeMap<String, Vec<u8>>> {
        self.index
            .iter()
            .map(|(name, record)| Ok((name.to_string(), self.reconstruct(name, record, verify)?)))
            .collect()
    }

    /// Every name whose content starts with `prefix`, with its content.
    pub fn search(&self, prefix: &[u8], verify: bool) -> Result<BTreeMap<String, Vec<u8>>> {
        let Some(keys) = self.locate(prefix) else {
            return Ok(BTreeMap::new());
        };

        self.index
            .partial_find(&keys)
            .into_iter()
            .map(|(name, record)| Ok((name.to_string(), self.reconstruct(name, record, verify)?)))
            .collect()
    }

    /// Read-only version of the insertion walk.
    ///
    /// Returns the branch keys leading to the node where `prefix` ends, or
    /// None if no stored content starts with `prefix`.
    fn locate(&self, prefix: &[u8]) -> Option<Vec<u8>> {
        let mut current = NodeId::ROOT;
        let mut cursor = 0;
        let mut keys = Vec::new();

        for &byte in prefix {
            let node = &self.arena[current];
            if cursor < node.value().len() {
                if node.value()[cursor] != byte {
                    return None;
                }
                cursor += 1;
            } else {
                current = node.child(byte)?;
                keys.push(byte);
                cursor = 1;
            }
        }

        Some(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(files: &[(&str, &str)]) -> Trie {
        let mut trie = Trie::new();
        for (name, content) in files {
            trie.insert(name, content.as_bytes());
        }
        trie
    }

    fn get(trie: &Trie, name: &str) -> Option<Vec<u8>> {
        trie.get(name, true).unwrap()
    }

    fn root(trie: &Trie) -> &crate::node::Node {
        &trie.arena()[NodeId::ROOT]
    }

    fn child<'a>(trie: &'a Trie, path: &[u8]) -> &'a crate::node::Node {
        let chain = trie.walk(path).unwrap();
        &trie.arena()[*chain.last().unwrap()]
    }

    #[test]
    fn test_first_insert_fills_root() {
        let trie = build(&[("a", "hello")]);
        assert_eq!(root(&trie).value(), b"hello");
        assert_eq!(root(&trie).refs(), 1);
        assert_eq!(trie.arena().len(), 1);
        assert_eq!(get(&trie, "a").unwrap(), b"hello");
    }

    #[test]
    fn test_prefix_sharing() {
        let trie = build(&[("abc", "abc"), ("abb", "abb")]);

        assert_eq!(root(&trie).value(), b"ab");
        assert_eq!(child(&trie, b"c").value(), b"c");
        assert_eq!(child(&trie, b"b").value(), b"b");
        assert_eq!(trie.arena().len(), 3);
        assert_eq!(trie.arena().stored_bytes(), 2 + 1 + 1);
    }

    #[test]
    fn test_split_corrects_existing_paths() {
        let trie = build(&[("a", "hello world"), ("b", "hello there")]);

        assert_eq!(trie.index().get("a").unwrap().path, b"w");
        assert_eq!(trie.index().get("b").unwrap().path, b"t");
        assert_eq!(get(&trie, "a").unwrap(), b"hello world");
        assert_eq!(get(&trie, "b").unwrap(), b"hello there");
    }

    #[test]
    fn test_split_deep_in_the_trie() {
        let trie = build(&[
            ("one", "prefix-alpha-1"),
            ("two", "prefix-beta"),
            ("three", "prefix-alpha-2"),
            ("four", "prefix-alphabet"),
        ]);

        for (name, content) in [
            ("one", "prefix-alpha-1"),
            ("two", "prefix-beta"),
            ("three", "prefix-alpha-2"),
            ("four", "prefix-alphabet"),
        ] {
            assert_eq!(get(&trie, name).unwrap(), content.as_bytes());
        }
        assert_eq!(root(&trie).value(), b"prefix-");
        assert_eq!(child(&trie, b"a").value(), b"alpha");
    }

    #[test]
    fn test_empty_and_single_byte_files() {
        let trie = build(&[("x", "x"), ("empty", ""), ("y", "y"), ("xx", "xx")]);

        assert_eq!(get(&trie, "empty").unwrap(), b"");
        assert_eq!(get(&trie, "x").unwrap(), b"x");
        assert_eq!(get(&trie, "y").unwrap(), b"y");
        assert_eq!(get(&trie, "xx").unwrap(), b"xx");
        // The empty file ends at the root, which holds nothing
        assert_eq!(root(&trie).value(), b"");
    }

    #[test]
    fn test_empty_file_into_empty_trie() {
        let trie = build(&[("empty", "")]);
        assert_eq!(get(&trie, "empty").unwrap(), b"");
        assert_eq!(root(&trie).refs(), 1);
    }

    #[test]
    fn test_shorter_file_splits_at_end() {
        let trie = build(&[("long", "abcdef"), ("short", "abc")]);

        assert_eq!(root(&trie).value(), b"abc");
        assert_eq!(root(&trie).refs(), 2);
        assert_eq!(child(&trie, b"d").value(), b"def");
        assert_eq!(child(&trie, b"d").refs(), 1);
        assert_eq!(get(&trie, "long").unwrap(), b"abcdef");
        assert_eq!(get(&trie, "short").unwrap(), b"abc");
    }

    #[test]
    fn test_mismatch_inside_value_never_follows_child() {
        // "ab" ends at a node "ab" which has a child keyed 'c'; a file
        // "ac" must split the value, not descend into the 'c' child.
        let trie = build(&[("abc", "abc"), ("ab", "ab"), ("ac", "ac")]);

        assert_eq!(get(&trie, "abc").unwrap(), b"abc");
        assert_eq!(get(&trie, "ab").unwrap(), b"ab");
        assert_eq!(get(&trie, "ac").unwrap(), b"ac");
        assert_eq!(root(&trie).value(), b"a");
    }

    #[test]
    fn test_five_name_scenario() {
        let trie = build(&[
            ("abc", "abc"),
            ("abb", "a"),
            ("aaa", "aaa"),
            ("aaaa", "aaaaa"),
            ("ooo", "abc"),
        ]);

        assert_eq!(trie.index().len(), 5);
        assert_eq!(get(&trie, "abb").unwrap(), b"a");
        assert_eq!(get(&trie, "aaaa").unwrap(), b"aaaaa");
        assert_eq!(get(&trie, "aaa").unwrap(), b"aaa");
        assert_eq!(get(&trie, "ooo").unwrap(), b"abc");
        assert_eq!(get(&trie, "abc").unwrap(), b"abc");

        // Identical content shares every node
        assert_eq!(
            trie.index().get("ooo").unwrap().path,
            trie.index().get("abc").unwrap().path
        );
        assert_eq!(root(&trie).refs(), 5);
    }

    #[test]
    fn test_delete_and_heal_scenario() {
        let mut trie = build(&[("abc", "abc"), ("abb", "a")]);
        assert_eq!(root(&trie).value(), b"a");
        assert_eq!(root(&trie).children().len(), 1);

        let reclaimed = trie.remove("abc").unwrap();
        assert_eq!(reclaimed.nodes, 1);
        assert_eq!(reclaimed.bytes, 2);

        assert_eq!(get(&trie, "abb").unwrap(), b"a");
        assert_eq!(root(&trie).value(), b"a");
        assert!(root(&trie).children().is_empty());
        assert_eq!(root(&trie).refs(), 1);
        assert_eq!(trie.arena().len(), 1);
    }

    #[test]
    fn test_heal_when_terminal_file_removed() {
        let mut trie = build(&[("short", "ab"), ("long", "abc")]);
        assert_eq!(root(&trie).value(), b"ab");

        let reclaimed = trie.remove("short").unwrap();
        assert!(reclaimed.healed);
        assert_eq!(root(&trie).value(), b"abc");
        assert!(root(&trie).children().is_empty());
        assert_eq!(trie.index().get("long").unwrap().path, b"");
        assert_eq!(get(&trie, "long").unwrap(), b"abc");
    }

    #[test]
    fn test_refcount_accounting() {
        let mut trie = build(&[
            ("a", "a"),
            ("bxa", "bxa"),
            ("bxb", "bxb"),
            ("bxc", "bxc"),
        ]);
        assert_eq!(child(&trie, b"b").value(), b"bx");
        assert_eq!(child(&trie, b"b").refs(), 3);

        trie.remove("bxa").unwrap();
        assert_eq!(child(&trie, b"b").refs(), 2);

        // One child left and nothing ends at "bx": it heals into "bxc"
        trie.remove("bxb").unwrap();
        assert_eq!(child(&trie, b"b").value(), b"bxc");
        assert_eq!(child(&trie, b"b").refs(), 1);
        assert_eq!(get(&trie, "bxc").unwrap(), b"bxc");

        // Removing the branch entirely heals the root into "a"
        trie.remove("bxc").unwrap();
        assert_eq!(root(&trie).value(), b"a");
        assert_eq!(trie.arena().len(), 1);
        assert_eq!(get(&trie, "a").unwrap(), b"a");
    }

    #[test]
    fn test_removing_last_file_resets_root() {
        let mut trie = build(&[("a", "abc")]);
        trie.remove("a").unwrap();
        assert!(root(&trie).is_open());
        assert_eq!(root(&trie).value(), b"");

        // New content must not be appended to stale bytes
        trie.insert("b", b"xyz");
        assert_eq!(get(&trie, "b").unwrap(), b"xyz");
        assert_eq!(root(&trie).value(), b"xyz");
    }

    #[test]
    fn test_insert_overwrites() {
        let mut trie = build(&[("a", "first"), ("b", "fir")]);
        assert!(trie.insert("a", b"second"));
        assert_eq!(get(&trie, "a").unwrap(), b"second");
        assert_eq!(get(&trie, "b").unwrap(), b"fir");
        assert_eq!(trie.index().len(), 2);
    }

    #[test]
    fn test_copy_aliasing() {
        let mut trie = build(&[("a", "shared content"), ("c", "shared other")]);
        assert!(trie.copy("a", "b"));
        assert_eq!(trie.index().get("a"), trie.index().get("b"));
        assert_eq!(root(&trie).refs(), 3);

        trie.remove("a").unwrap();
        assert_eq!(get(&trie, "b").unwrap(), b"shared content");
        assert_eq!(get(&trie, "c").unwrap(), b"shared other");
        assert_eq!(root(&trie).refs(), 2);
    }

    #[test]
    fn test_copy_failures() {
        let mut trie = build(&[("a", "x")]);
        assert!(!trie.copy("a", "a"));
        assert!(!trie.copy("missing", "b"));
        assert!(!trie.index().contains("b"));
    }

    #[test]
    fn test_copy_over_existing_name() {
        let mut trie = build(&[("a", "abcd"), ("b", "abc")]);
        // Releasing "b" heals the root, which rewrites "a"'s path
        assert!(trie.copy("a", "b"));
        assert_eq!(get(&trie, "b").unwrap(), b"abcd");
        assert_eq!(get(&trie, "a").unwrap(), b"abcd");
        assert_eq!(root(&trie).refs(), 2);
    }

    #[test]
    fn test_remove_missing() {
        let mut trie = build(&[("a", "x")]);
        assert!(trie.remove("nope").is_none());
        assert!(trie.detach("nope").is_none());
    }

    #[test]
    fn test_detached_records_follow_splits() {
        let mut trie = build(&[("a", "abc"), ("b", "abd")]);
        let ticket = trie.detach("a").unwrap();
        assert!(!trie.index().contains("a"));

        // Splits the "c" branch's parent while "a" is parked
        trie.insert("c", b"a");
        trie.insert("d", b"abce");

        assert!(trie.reclaim(ticket).is_some());
        assert!(trie.reclaim(ticket).is_none());
        for (name, content) in [("b", "abd"), ("c", "a"), ("d", "abce")] {
            assert_eq!(get(&trie, name).unwrap(), content.as_bytes());
        }
    }

    #[test]
    fn test_reclaim_all() {
        let mut trie = build(&[("a", "one"), ("b", "two"), ("c", "three")]);
        trie.detach("a").unwrap();
        trie.detach("b").unwrap();
        assert_eq!(trie.reclaim_all(), 2);
        assert_eq!(trie.index().pending_len(), 0);
        assert_eq!(root(&trie).value(), b"three");
        assert_eq!(trie.arena().len(), 1);
    }

    #[test]
    fn test_search() {
        let trie = build(&[
            ("abc", "abc"),
            ("abb", "a"),
            ("aaa", "aaa"),
            ("aaaa", "aaaaa"),
            ("ooo", "abc"),
        ]);

        let hits = trie.search(b"ab", true).unwrap();
        assert_eq!(hits.keys().collect::<Vec<_>>(), vec!["abc", "ooo"]);
        assert_eq!(hits["abc"], b"abc");

        let hits = trie.search(b"aa", true).unwrap();
        assert_eq!(hits.keys().collect::<Vec<_>>(), vec!["aaa", "aaaa"]);

        let hits = trie.search(b"aaaa", true).unwrap();
        assert_eq!(hits.keys().collect::<Vec<_>>(), vec!["aaaa"]);

        assert_eq!(trie.search(b"", true).unwrap().len(), 5);
        assert!(trie.search(b"abcd", true).unwrap().is_empty());
        assert!(trie.search(b"x", true).unwrap().is_empty());
    }

    #[test]
    fn test_search_prefix_inside_value() {
        let trie = build(&[("a", "hello world"), ("b", "help")]);
        let hits = trie.search(b"hel", true).unwrap();
        assert_eq!(hits.len(), 2);

        let hits = trie.search(b"hello w", true).unwrap();
        assert_eq!(hits.keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_list() {
        let trie = build(&[("b", "two"), ("a", "one")]);
        let all = trie.list(true).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"], b"one");
        assert_eq!(all["b"], b"two");
    }

    #[test]
    fn test_corruption_is_reported() {
        let mut trie = build(&[("a", "abc"), ("b", "abd")]);
        // Point "a" at a branch that does not exist
        if let Some(record) = trie.index.remove("a") {
            trie.index.insert(
                "a".into(),
                PathRecord {
                    path: b"z".to_vec(),
                    ..record
                },
            );
        }

        assert!(matches!(
            trie.get("a", true),
            Err(Error::Corrupted { .. })
        ));
        assert!(trie.list(true).is_err());
    }

    #[test]
    fn test_digest_mismatch_detected_only_when_verifying() {
        let mut trie = build(&[("a", "abc"), ("b", "abd")]);
        // Same length, different content: swap the two records' paths
        let a = trie.index.remove("a").unwrap();
        let b = trie.index.remove("b").unwrap();
        trie.index.insert("a".into(), PathRecord { path: b.path, ..a });

        assert!(trie.get("a", false).unwrap().is_some());
        assert!(matches!(
            trie.get("a", true),
            Err(Error::Corrupted { .. })
        ));
    }
}
