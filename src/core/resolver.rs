//! Library resolution
//!
//! Maps a header name to the libraries that provide it and picks the most
//! suitable one for the target architecture.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::core::library::{Library, LibraryLocation};
use crate::error::LibraryError;

/// Finds libraries by the headers they provide
pub trait LibraryResolver {
    /// Every library providing `header`, in registration order
    fn alternatives_for(&self, header: &str) -> Vec<Arc<Library>>;

    /// The best library providing `header` for `arch`, if any
    fn resolve_for(&self, header: &str, arch: &str) -> Option<Arc<Library>>;
}

/// Index from header name to providing libraries
#[derive(Debug, Default)]
pub struct HeaderIndex {
    headers: HashMap<String, Vec<Arc<Library>>>,
    libraries: Vec<Arc<Library>>,
}

impl HeaderIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the headers of `library`
    pub fn add_library(&mut self, library: Library) -> Result<Arc<Library>, LibraryError> {
        let library = Arc::new(library);
        for header in library.source_headers()? {
            let providers = self.headers.entry(header).or_default();
            if !providers.contains(&library) {
                providers.push(Arc::clone(&library));
            }
        }
        self.libraries.push(Arc::clone(&library));
        Ok(library)
    }

    /// Load and register every library installed under `dir`.
    ///
    /// Folders that are not valid libraries are skipped with a warning.
    /// A missing `dir` yields no libraries.
    pub fn scan_libraries_dir(
        &mut self,
        dir: &Path,
        location: LibraryLocation,
    ) -> Result<usize, LibraryError> {
        if !dir.is_dir() {
            tracing::debug!("Libraries folder {} does not exist", dir.display());
            return Ok(0);
        }
        let mut subdirs: Vec<_> = fs::read_dir(dir)
            .map_err(|e| LibraryError::Load {
                path: dir.to_path_buf(),
                error: e.to_string(),
            })?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'))
            })
            .collect();
        subdirs.sort();

        let mut count = 0;
        for subdir in subdirs {
            match Library::load(&subdir, location) {
                Ok(lib) => {
                    tracing::debug!("Loaded library {} from {}", lib, subdir.display());
                    self.add_library(lib)?;
                    count += 1;
                }
                Err(e) => tracing::warn!("Skipping {}: {}", subdir.display(), e),
            }
        }
        Ok(count)
    }

    /// Load and register a single library folder
    pub fn add_library_dir(
        &mut self,
        dir: &Path,
        location: LibraryLocation,
    ) -> Result<Arc<Library>, LibraryError> {
        let lib = Library::load(dir, location)?;
        self.add_library(lib)
    }

    /// Every registered library, in registration order
    pub fn libraries(&self) -> &[Arc<Library>] {
        &self.libraries
    }
}

impl LibraryResolver for HeaderIndex {
    fn alternatives_for(&self, header: &str) -> Vec<Arc<Library>> {
        self.headers.get(header).cloned().unwrap_or_default()
    }

    fn resolve_for(&self, header: &str, arch: &str) -> Option<Arc<Library>> {
        tracing::info!("Resolving include {} for arch {}", header, arch);
        let candidates = self.headers.get(header)?;

        let mut found: Vec<&Arc<Library>> = Vec::new();
        let mut found_priority = 0;
        for lib in candidates {
            let priority = compute_priority(lib, header, arch);
            if found.is_empty() || found_priority < priority {
                found = vec![lib];
                found_priority = priority;
                tracing::debug!("  found better lib {} (prio {:03X})", lib.name, priority);
            } else if found_priority == priority {
                found.push(lib);
                tracing::debug!("  found another lib {} with same priority", lib.name);
            } else {
                tracing::debug!("  discarded {} (prio {:03X})", lib.name, priority);
            }
        }

        if found.len() > 1 {
            let stem = simplify(header_stem(header));
            found.sort_by(|a, b| {
                let sa = shared_prefix_len(&simplify(&a.name), &stem);
                let sb = shared_prefix_len(&simplify(&b.name), &stem);
                sb.cmp(&sa).then_with(|| a.name.cmp(&b.name))
            });
        }
        found.first().map(|lib| Arc::clone(lib))
    }
}

/// Rank `lib` as a provider of `header` on `arch`; higher wins.
///
/// Architecture fit dominates name fit, which dominates install location,
/// except that explicitly passed (unmanaged) libraries always win.
pub fn compute_priority(lib: &Library, header: &str, arch: &str) -> u32 {
    let header = simplify(header_stem(header));
    let name = simplify(&lib.name);
    let dir_name = simplify(&lib.dir_name);
    let either = |f: &dyn Fn(&str) -> bool| f(&name) || f(&dir_name);

    let mut priority = 0;

    if lib.is_optimized_for_architecture(arch) {
        priority += 1010;
    } else if lib.is_architecture_independent() {
        priority += 1000;
    }

    priority += if name == header && dir_name == header {
        700
    } else if either(&|n| n == header) {
        600
    } else if either(&|n| n == format!("{header}-main")) {
        500
    } else if either(&|n| n == format!("{header}-master")) {
        400
    } else if either(&|n| n.starts_with(&header)) {
        300
    } else if either(&|n| n.ends_with(&header)) {
        200
    } else if either(&|n| n.contains(&header)) {
        100
    } else {
        0
    };

    priority += match lib.location {
        LibraryLocation::IdeBuiltIn => 0,
        LibraryLocation::ReferencedPlatformBuiltIn => 1,
        LibraryLocation::PlatformBuiltIn => 2,
        LibraryLocation::User => 3,
        LibraryLocation::Unmanaged => 10000,
    };
    priority
}

fn header_stem(header: &str) -> &str {
    match header.rfind('.') {
        Some(i) if !header[i..].contains('/') => &header[..i],
        _ => header,
    }
}

/// Lowercase, with anything outside `[a-z0-9._-]` replaced by `_`
fn simplify(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn shared_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}
