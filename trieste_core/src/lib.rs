//! # Trieste Core
//!
//! An in-memory, content-addressed file store backed by a compressed trie
//! (radix tree) over file contents.
//!
//! File names do not influence storage: two files whose contents share a
//! byte prefix store that prefix once. The trie is built incrementally as
//! bytes arrive, splitting nodes where new content diverges from existing
//! content, and healed back together when deletions make a split pointless.
//!
//! ## Features
//!
//! - Prefix-shared storage of file contents
//! - Reference-counted nodes with reclamation on delete
//! - Copy by aliasing an existing file's path
//! - Content prefix search
//! - Inline or background cleanup with completion signals
//! - BLAKE3 digests to detect an inconsistent graph on read
//!
//! ## Example
//!
//! ```
//! use trieste_core::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::new();
//!
//! store.insert_bytes("a.txt", b"hello world")?;
//! store.insert_bytes("b.txt", b"hello there")?;
//!
//! // "hello " is stored once
//! let stats = store.stats();
//! assert_eq!(stats.stored_bytes, 6 + 5 + 5);
//!
//! assert_eq!(store.get("a.txt")?.as_deref(), Some(&b"hello world"[..]));
//! assert_eq!(store.search(b"hello t")?.len(), 1);
//!
//! store.delete("b.txt");
//! assert_eq!(store.stats().nodes, 1);
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod hash;
mod inspect;
mod node;
mod path;
mod source;
mod store;
mod trie;
mod walk;

pub use config::{CleanupPolicy, StoreConfig};
pub use error::{Error, Result};
pub use hash::Hash;
pub use inspect::{NodeView, TrieStats};
pub use node::{Arena, Node, NodeId, OpenNode, Seal};
pub use path::{PathIndex, PathRecord, Ticket, insert_path, remove_path_key};
pub use source::{ByteSource, Pull, ReadSource};
pub use store::{CleanupSignal, Store};
pub use trie::{Reclaimed, Trie};
