//! Incremental include-discovery cache
//!
//! The cache is the recorded trace of a previous discovery run: an ordered
//! list of "this file needed this header, found in this folder" decisions.
//! A new run replays it step by step. As long as every step matches, the
//! preprocessor can be skipped for unchanged files. The first mismatch drops
//! everything after the cursor and from then on new steps are appended.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::FilesystemError;
use crate::infra::filesystem;

/// One recorded discovery step
///
/// `sourcefile` is `None` for the always-on core and variant folders.
/// An empty `include` marks "this file has no further missing includes".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CacheEntry {
    /// Source file that triggered the step
    pub sourcefile: Option<PathBuf>,
    /// Missing header name, or empty
    pub include: String,
    /// Folder added to the include path, if any
    pub includepath: Option<PathBuf>,
}

impl CacheEntry {
    /// Create an entry
    pub fn new(sourcefile: Option<&Path>, include: &str, includepath: Option<&Path>) -> Self {
        Self {
            sourcefile: sourcefile.map(Path::to_path_buf),
            include: include.to_string(),
            includepath: includepath.map(Path::to_path_buf),
        }
    }
}

impl fmt::Display for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        write!(
            f,
            "SourceFile: {}; Include: {}; IncludePath: {}",
            show(&self.sourcefile),
            self.include,
            show(&self.includepath)
        )
    }
}

/// Replayable discovery journal backed by a file
#[derive(Debug)]
pub struct IncludeCache {
    /// Backing file
    path: PathBuf,
    /// Whether every step so far matched the recorded trace
    valid: bool,
    /// Index of the next entry to compare; meaningless once invalid
    next: usize,
    entries: Vec<CacheEntry>,
}

impl IncludeCache {
    /// An empty, invalid cache bound to `path`
    pub fn empty(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            valid: false,
            next: 0,
            entries: Vec::new(),
        }
    }

    /// Read the cache stored at `path`.
    ///
    /// Never fails: an unreadable or malformed file yields an empty,
    /// invalid cache so that the next run rescans everything.
    pub fn load(path: &Path) -> Self {
        let bytes = match filesystem::read_file(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("No usable include cache: {e}");
                return Self::empty(path);
            }
        };
        match serde_json::from_slice::<Vec<CacheEntry>>(&bytes) {
            Ok(entries) => Self {
                path: path.to_path_buf(),
                valid: true,
                next: 0,
                entries,
            },
            Err(e) => {
                tracing::debug!("Ignoring malformed include cache {}: {e}", path.display());
                Self::empty(path)
            }
        }
    }

    /// Backing file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the replay still matches the recorded trace
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// All entries (confirmed prefix plus anything appended)
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// The entry under the cursor, without advancing.
    ///
    /// Only meaningful while valid and after [`Self::expect_file`] confirmed
    /// an entry is available.
    pub fn next(&self) -> Option<&CacheEntry> {
        self.entries.get(self.next)
    }

    fn invalidate(&mut self) {
        if self.valid {
            tracing::debug!(
                "Include cache invalidated at entry {} of {}",
                self.next,
                self.entries.len()
            );
        }
        self.valid = false;
        self.entries.truncate(self.next);
    }

    /// Check that the entry under the cursor is about `source_file`.
    ///
    /// Invalidates the cache if it is not, or if no entry is left. Does not
    /// advance.
    pub fn expect_file(&mut self, source_file: &Path) {
        if !self.valid {
            return;
        }
        let matches = self
            .next()
            .is_some_and(|e| e.sourcefile.as_deref() == Some(source_file));
        if !matches {
            self.invalidate();
        }
    }

    /// Check that the entry under the cursor equals the given step.
    ///
    /// On a match the cursor advances. Otherwise the cache is invalidated
    /// (if it was not already) and the step is appended.
    pub fn expect_entry(
        &mut self,
        source_file: Option<&Path>,
        include: &str,
        include_path: Option<&Path>,
    ) {
        let entry = CacheEntry::new(source_file, include, include_path);
        if self.valid {
            if self.next() == Some(&entry) {
                self.next += 1;
                return;
            }
            self.invalidate();
        }
        self.entries.push(entry);
    }

    /// Check that the whole recorded trace was consumed
    pub fn expect_end(&mut self) {
        if self.valid && self.next < self.entries.len() {
            self.invalidate();
        }
    }

    /// Delete the backing file
    pub fn remove(&self) -> Result<(), FilesystemError> {
        filesystem::remove_file(&self.path)
    }

    /// Persist the cache.
    ///
    /// A cache that stayed valid end to end only gets its timestamp
    /// refreshed. Otherwise the entries are written out in full.
    pub fn flush(&self) -> Result<(), FilesystemError> {
        if self.valid {
            tracing::debug!("Include cache unchanged, touching {}", self.path.display());
            return filesystem::touch(&self.path);
        }
        let json = serde_json::to_vec_pretty(&self.entries).map_err(|e| {
            FilesystemError::WriteFile {
                path: self.path.clone(),
                error: e.to_string(),
            }
        })?;
        tracing::debug!(
            "Writing include cache with {} entries to {}",
            self.entries.len(),
            self.path.display()
        );
        filesystem::write_file(&self.path, &json)
    }
}
