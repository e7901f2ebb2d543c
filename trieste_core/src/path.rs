//! Path index: file name to branch-key sequence.

use crate::hash::Hash;
use std::collections::{BTreeMap, HashMap};

/// Location of one file's content in the trie.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecord {
    /// Branch keys taken at each node boundary, starting from the root.
    pub path: Vec<u8>,
    /// Total content length in bytes.
    pub length: usize,
    /// BLAKE3 digest of the content.
    pub digest: Hash,
}

impl PathRecord {
    /// Whether this record's path starts with `prefix`.
    pub fn has_prefix(&self, prefix: &[u8]) -> bool {
        self.path.starts_with(prefix)
    }
}

/// Return `path` with `key` inserted at `at`, later keys shifted right.
pub fn insert_path(path: &[u8], at: usize, key: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(&path[..at]);
    out.push(key);
    out.extend_from_slice(&path[at..]);
    out
}

/// Return `path` without the key at `at`.
pub fn remove_path_key(path: &[u8], at: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(path.len().saturating_sub(1));
    out.extend_from_slice(&path[..at]);
    out.extend_from_slice(&path[at + 1..]);
    out
}

/// Ticket identifying a record waiting for background cleanup.
pub type Ticket = u64;

/// Name-keyed path records plus records released but not yet cleaned up.
///
/// Pending records still describe live nodes, so boundary corrections are
/// applied to them exactly like to named records.
#[derive(Debug, Default, Clone)]
pub struct PathIndex {
    records: HashMap<String, PathRecord>,
    pending: BTreeMap<Ticket, PathRecord>,
    next_ticket: Ticket,
}

impl PathIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of named records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no names are indexed.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether `name` is indexed.
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Record for `name`.
    pub fn get(&self, name: &str) -> Option<&PathRecord> {
        self.records.get(name)
    }

    /// Add or replace the record for `name`.
    pub fn insert(&mut self, name: String, record: PathRecord) -> Option<PathRecord> {
        self.records.insert(name, record)
    }

    /// Remove the record for `name`.
    pub fn remove(&mut self, name: &str) -> Option<PathRecord> {
        self.records.remove(name)
    }

    /// All indexed names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }

    /// Iterate over named records in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathRecord)> {
        self.records.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// Every named record whose path has `prefix` as a literal prefix.
    pub fn partial_find(&self, prefix: &[u8]) -> BTreeMap<&str, &PathRecord> {
        self.iter()
            .filter(|(_, record)| record.has_prefix(prefix))
            .collect()
    }

    /// Rewrite paths for a split of the node reached by `prefix`.
    ///
    /// Every record passing through that node now also passes through the
    /// new suffix child keyed by `key`. Returns the number of records updated.
    pub fn correct_split(&mut self, prefix: &[u8], key: u8) -> usize {
        let at = prefix.len();
        let mut corrected = 0;
        for record in self.records_mut() {
            if record.has_prefix(prefix) {
                record.path = insert_path(&record.path, at, key);
                corrected += 1;
            }
        }
        corrected
    }

    /// Rewrite paths for a heal of the node reached by `prefix`.
    ///
    /// The key at index `prefix.len()` disappears from every record passing
    /// through the absorbed child. Returns the number of records updated.
    pub fn correct_heal(&mut self, prefix: &[u8]) -> usize {
        let at = prefix.len();
        let mut corrected = 0;
        for record in self.records_mut() {
            if record.path.len() > at && record.has_prefix(prefix) {
                record.path = remove_path_key(&record.path, at);
                corrected += 1;
            }
        }
        corrected
    }

    /// Every record that still holds references: named and parked.
    pub fn records(&self) -> impl Iterator<Item = &PathRecord> {
        self.records.values().chain(self.pending.values())
    }

    fn records_mut(&mut self) -> impl Iterator<Item = &mut PathRecord> {
        self.records.values_mut().chain(self.pending.values_mut())
    }

    /// Park a released record until its cleanup runs.
    pub fn park(&mut self, record: PathRecord) -> Ticket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(ticket, record);
        ticket
    }

    /// Take a parked record, if it has not been cleaned up yet.
    pub fn take_pending(&mut self, ticket: Ticket) -> Option<PathRecord> {
        self.pending.remove(&ticket)
    }

    /// Take the oldest parked record.
    ///
    /// Records are taken one at a time so that the ones still parked keep
    /// receiving corrections from each cleanup's heal.
    pub fn pop_pending(&mut self) -> Option<PathRecord> {
        self.pending.pop_first().map(|(_, record)| record)
    }

    /// Number of parked records.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
