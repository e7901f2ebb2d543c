//! Loading files from the filesystem into a store.

use crate::error::{Error, Result};
use crate::source::ReadSource;
use crate::store::Store;
use ignore::WalkBuilder;
use std::fs;
use std::path::Path;
use tracing::debug;

impl Store {
    /// Insert a file, or every file below a directory.
    ///
    /// Files are named by their path relative to `root` (a lone file by its
    /// file name), `/`-separated. Hidden files are included, `.gitignore`
    /// rules apply and symlinks are not followed.
    ///
    /// Returns the number of files inserted.
    pub fn add_path(&self, root: &Path) -> Result<usize> {
        let metadata = fs::metadata(root)?;
        let base = if metadata.is_dir() {
            root
        } else {
            root.parent().unwrap_or(root)
        };

        let walker = WalkBuilder::new(root)
            .hidden(false)
            .require_git(false)
            .sort_by_file_name(|a, b| a.cmp(b))
            .build();

        let mut added = 0;
        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let name = store_name(base, entry.path())?;
            let file = fs::File::open(entry.path())?;
            self.insert(&name, ReadSource::new(file))?;
            added += 1;
        }

        debug!(root = %root.display(), added, "loaded path");
        Ok(added)
    }
}

/// `path` relative to `base`, joined with `/`.
fn store_name(base: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(base).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.join("/"))
        .ok_or_else(|| Error::invalid_name(format!("Not valid UTF-8: {}", path.display())))
}
