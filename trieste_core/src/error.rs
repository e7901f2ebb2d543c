//! Error types for trieste_core.

use thiserror::Error;

/// Result type alias using trieste_core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during store operations.
///
/// Absent names and copy-to-self are not errors; those are reported through
/// `bool`/`Option` results on [`crate::Store`].
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred while reading from the filesystem.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// A byte source failed before signalling end of data.
    ///
    /// The store is left exactly as it was before the insertion started.
    #[error("Byte source for {name} failed: {source}")]
    Source {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// The path index and the node graph disagree.
    ///
    /// A correct engine never produces this; it indicates a bug in splitting,
    /// healing or path correction.
    #[error("Corrupted trie entry {name}: {reason}")]
    Corrupted { name: String, reason: String },

    /// Invalid file name.
    #[error("Invalid name: {reason}")]
    InvalidName { reason: String },

    /// Invalid digest format or encoding.
    #[error("Invalid hash: {reason}")]
    InvalidHash { reason: String },

    /// Configuration text could not be parsed.
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a Source error.
    pub fn source(name: impl Into<String>, source: std::io::Error) -> Self {
        Error::Source {
            name: name.into(),
            source,
        }
    }

    /// Create a Corrupted error.
    pub fn corrupted(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Corrupted {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an InvalidName error.
    pub fn invalid_name(reason: impl Into<String>) -> Self {
        Error::InvalidName {
            reason: reason.into(),
        }
    }

    /// Create an InvalidHash error.
    pub fn invalid_hash(reason: impl Into<String>) -> Self {
        Error::InvalidHash {
            reason: reason.into(),
        }
    }

    /// Create an InvalidConfig error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }
}

// Additional From implementations for external error types

impl From<ignore::Error> for Error {
    fn from(err: ignore::Error) -> Self {
        // ignore::Error can wrap an io::Error or be a path error
        match err.io_error() {
            Some(io_err) => Error::Io {
                source: std::io::Error::new(io_err.kind(), io_err.to_string()),
            },
            None => Error::Io {
                source: std::io::Error::other(err.to_string()),
            },
        }
    }
}
