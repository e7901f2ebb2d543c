//! Store facade: name-keyed operations over one shared trie.

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::inspect::{NodeView, TrieStats};
use crate::path::{PathRecord, Ticket};
use crate::source::ByteSource;
use crate::trie::Trie;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Weak, mpsc};
use std::thread;
use tracing::{debug, warn};

/// A detached cleanup handed to the background worker.
struct Job {
    ticket: Ticket,
    done: mpsc::Sender<()>,
}

struct Shared {
    trie: RwLock<Trie>,
    config: StoreConfig,
    /// Present only under [`crate::CleanupPolicy::Background`].
    cleaner: Option<mpsc::Sender<Job>>,
}

/// Completion signal for one deletion's cleanup.
#[derive(Debug)]
pub struct CleanupSignal {
    done: Option<mpsc::Receiver<()>>,
}

impl CleanupSignal {
    fn completed() -> Self {
        Self { done: None }
    }

    /// Block until the cleanup has run.
    ///
    /// Returns false if the worker shut down before reporting; that only
    /// happens once every handle to the store is gone.
    pub fn wait(self) -> bool {
        match self.done {
            Some(done) => done.recv().is_ok(),
            None => true,
        }
    }
}

/// An in-memory content-addressed file store.
///
/// Cloning is cheap and every clone shares the same trie. Reads take a shared
/// lock; insertions, copies and cleanups take the exclusive lock.
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let trie = self.shared.trie.read();
        f.debug_struct("Store")
            .field("config", &self.shared.config)
            .field("files", &trie.index().len())
            .field("nodes", &trie.arena().len())
            .finish()
    }
}

impl Store {
    /// Create an empty store with inline cleanup.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                trie: RwLock::new(Trie::new()),
                config: StoreConfig::default(),
                cleaner: None,
            }),
        }
    }

    /// Create an empty store with the given configuration.
    ///
    /// Background cleanup starts a worker thread that lives as long as any
    /// handle to the store.
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        use crate::config::CleanupPolicy;

        if config.cleanup == CleanupPolicy::Inline {
            return Ok(Self {
                shared: Arc::new(Shared {
                    trie: RwLock::new(Trie::new()),
                    config,
                    cleaner: None,
                }),
            });
        }

        let (jobs_tx, jobs_rx) = mpsc::channel();
        let shared = Arc::new(Shared {
            trie: RwLock::new(Trie::new()),
            config,
            cleaner: Some(jobs_tx),
        });

        let weak = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("trieste-cleanup".to_string())
            .spawn(move || cleanup_worker(weak, jobs_rx))?;

        Ok(Self { shared })
    }

    /// The store's configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.shared.config
    }

    /// Insert a file, replacing any previous content under `name`.
    ///
    /// The source is drained before the trie is touched: if it fails, the
    /// store (including any previous entry under `name`) is left unchanged.
    #[tracing::instrument(skip(self, source))]
    pub fn insert<S: ByteSource>(&self, name: &str, mut source: S) -> Result<()> {
        if name.is_empty() {
            return Err(Error::invalid_name("Name cannot be empty"));
        }

        let content = source.read_all().map_err(|e| Error::source(name, e))?;

        let replaced = self.shared.trie.write().insert(name, &content);
        debug!(len = content.len(), replaced, "inserted");
        Ok(())
    }

    /// Insert a file from an in-memory buffer.
    pub fn insert_bytes(&self, name: &str, content: &[u8]) -> Result<()> {
        self.insert(name, content)
    }

    /// Give `new` the same content as `existing`.
    ///
    /// Returns false if the names are equal, `new` is empty or `existing` is
    /// absent. An entry already stored under `new` is replaced.
    #[tracing::instrument(skip(self))]
    pub fn copy(&self, existing: &str, new: &str) -> bool {
        if new.is_empty() {
            return false;
        }
        self.shared.trie.write().copy(existing, new)
    }

    /// Delete `name`. Returns false if it was absent.
    ///
    /// Under background cleanup the name is gone when this returns but its
    /// nodes may not have been reclaimed yet; see [`Store::delete_with_signal`].
    pub fn delete(&self, name: &str) -> bool {
        self.delete_with_signal(name).is_some()
    }

    /// Delete `name`, returning a signal that completes once its nodes have
    /// been reclaimed. None if it was absent.
    #[tracing::instrument(skip(self))]
    pub fn delete_with_signal(&self, name: &str) -> Option<CleanupSignal> {
        let Some(cleaner) = &self.shared.cleaner else {
            let reclaimed = self.shared.trie.write().remove(name)?;
            debug!(?reclaimed, "deleted");
            return Some(CleanupSignal::completed());
        };

        let ticket = self.shared.trie.write().detach(name)?;
        let (done_tx, done_rx) = mpsc::channel();
        if cleaner
            .send(Job {
                ticket,
                done: done_tx,
            })
            .is_err()
        {
            warn!(ticket, "cleanup worker unavailable, reclaiming inline");
            self.shared.trie.write().reclaim(ticket);
            return Some(CleanupSignal::completed());
        }

        debug!(ticket, "deleted, cleanup queued");
        Some(CleanupSignal {
            done: Some(done_rx),
        })
    }

    /// Run every queued cleanup now. Returns how many were pending.
    pub fn flush(&self) -> usize {
        let count = self.shared.trie.write().reclaim_all();
        if count > 0 {
            debug!(count, "flushed pending cleanups");
        }
        count
    }

    /// Content stored under `name`, or None if absent.
    pub fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        self.shared
            .trie
            .read()
            .get(name, self.shared.config.verify_digests)
    }

    /// Every name with its content.
    pub fn list(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.shared
            .trie
            .read()
            .list(self.shared.config.verify_digests)
    }

    /// Every name whose content starts with `prefix`, with its content.
    pub fn search(&self, prefix: &[u8]) -> Result<BTreeMap<String, Vec<u8>>> {
        self.shared
            .trie
            .read()
            .search(prefix, self.shared.config.verify_digests)
    }

    /// Whether `name` is stored.
    pub fn contains(&self, name: &str) -> bool {
        self.shared.trie.read().index().contains(name)
    }

    /// Number of stored names.
    pub fn len(&self) -> usize {
        self.shared.trie.read().index().len()
    }

    /// Whether the store holds no names.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.shared.trie.read().index().names()
    }

    /// The record for `name`: its path through the trie, length and digest.
    pub fn record(&self, name: &str) -> Option<PathRecord> {
        self.shared.trie.read().index().get(name).cloned()
    }

    /// Every name with its record, sorted by name.
    pub fn records(&self) -> Vec<(String, PathRecord)> {
        let trie = self.shared.trie.read();
        let mut records: Vec<_> = trie
            .index()
            .iter()
            .map(|(name, record)| (name.to_string(), record.clone()))
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0));
        records
    }

    /// Current storage statistics.
    pub fn stats(&self) -> TrieStats {
        self.shared.trie.read().stats()
    }

    /// Snapshot of the node graph.
    pub fn snapshot(&self) -> NodeView {
        self.shared.trie.read().snapshot()
    }

    /// Check the node graph against the path index.
    pub fn verify_integrity(&self) -> Result<()> {
        self.shared.trie.read().verify_integrity()
    }
}

fn cleanup_worker(shared: Weak<Shared>, jobs: mpsc::Receiver<Job>) {
    for job in jobs {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        let reclaimed = shared.trie.write().reclaim(job.ticket);
        debug!(ticket = job.ticket, ?reclaimed, "background cleanup");
        // The caller may not be waiting
        let _ = job.done.send(());
    }
}
