//! Source files awaiting include scanning
//!
//! A [`SourceFile`] is identified by its origin (the sketch or the owning
//! library) and its path relative to that origin's source root. The
//! [`SourceFileQueue`] hands files out in insertion order and refuses
//! duplicates, which makes the scan a breadth-first walk of the include
//! graph.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::library::Library;
use crate::error::DiscoveryError;

/// A source file belonging to the sketch or to a library
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Owning library; `None` for sketch sources
    library: Option<Arc<Library>>,
    /// Path relative to `source_root`
    relative_path: PathBuf,
    /// Root folder the relative path is resolved against
    source_root: PathBuf,
    /// Root folder for build products of this file
    build_root: PathBuf,
    /// Extra include folder used only while scanning this file
    extra_include_path: Option<PathBuf>,
}

impl PartialEq for SourceFile {
    fn eq(&self, other: &Self) -> bool {
        self.relative_path == other.relative_path
            && self.source_root == other.source_root
            && self.build_root == other.build_root
    }
}

impl Eq for SourceFile {}

impl SourceFile {
    /// Create a source file rooted at `source_root`.
    ///
    /// `path` may be absolute (it must then live under `source_root`) or
    /// relative to `source_root`.
    pub fn new(
        library: Option<Arc<Library>>,
        source_root: &Path,
        build_root: &Path,
        path: &Path,
        extra_include_path: Option<PathBuf>,
    ) -> Result<Self, DiscoveryError> {
        let relative_path = if path.is_absolute() {
            path.strip_prefix(source_root)
                .map_err(|_| DiscoveryError::OutsideRoot {
                    path: path.to_path_buf(),
                    root: source_root.to_path_buf(),
                })?
                .to_path_buf()
        } else {
            path.to_path_buf()
        };

        Ok(Self {
            library,
            relative_path,
            source_root: source_root.to_path_buf(),
            build_root: build_root.to_path_buf(),
            extra_include_path,
        })
    }

    /// A file of the sketch; sources and build products share the sketch
    /// build folder
    pub fn sketch(sketch_build_path: &Path, path: &Path) -> Result<Self, DiscoveryError> {
        Self::new(None, sketch_build_path, sketch_build_path, path, None)
    }

    /// A file of `library`, built under `libraries_build_path/<dir name>`
    pub fn library(
        library: &Arc<Library>,
        libraries_build_path: &Path,
        path: &Path,
    ) -> Result<Self, DiscoveryError> {
        Self::new(
            Some(Arc::clone(library)),
            &library.source_dir,
            &libraries_build_path.join(&library.dir_name),
            path,
            library.utility_dir.clone(),
        )
    }

    /// Owning library, if any
    pub fn owner(&self) -> Option<&Arc<Library>> {
        self.library.as_ref()
    }

    /// Path relative to the source root
    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    /// Full path of the source
    pub fn source_path(&self) -> PathBuf {
        self.source_root.join(&self.relative_path)
    }

    /// Object file produced by compiling this source
    pub fn object_path(&self) -> PathBuf {
        self.build_root
            .join(format!("{}.o", self.relative_path.display()))
    }

    /// Dependency file produced alongside the object
    pub fn depfile_path(&self) -> PathBuf {
        self.build_root
            .join(format!("{}.d", self.relative_path.display()))
    }

    /// Extra include folder for this file only
    pub fn extra_include_path(&self) -> Option<&Path> {
        self.extra_include_path.as_deref()
    }
}

/// FIFO of source files without duplicates
#[derive(Debug, Default)]
pub struct SourceFileQueue {
    items: VecDeque<SourceFile>,
}

impl SourceFileQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `file` unless an equal file is already waiting.
    ///
    /// Returns whether the file was added.
    pub fn push(&mut self, file: SourceFile) -> bool {
        if self.items.contains(&file) {
            return false;
        }
        self.items.push_back(file);
        true
    }

    /// Take the oldest file
    pub fn pop(&mut self) -> Option<SourceFile> {
        self.items.pop_front()
    }

    /// Whether nothing is waiting
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of waiting files
    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::library::{LibraryLayout, LibraryLocation};
    use crate::test_utils::generators::relative_source_path;
    use std::collections::BTreeMap;
    use proptest::prelude::*;

    fn sketch_file(rel: &str) -> SourceFile {
        SourceFile::sketch(Path::new("/build/sketch"), Path::new(rel)).unwrap()
    }

    #[test]
    fn test_paths_derived_from_roots() {
        let file = SourceFile::new(
            None,
            Path::new("/libs/Wire/src"),
            Path::new("/build/libraries/Wire"),
            Path::new("/libs/Wire/src/utility/twi.c"),
            None,
        )
        .unwrap();
        assert_eq!(file.relative_path(), Path::new("utility/twi.c"));
        assert_eq!(file.source_path(), PathBuf::from("/libs/Wire/src/utility/twi.c"));
        assert_eq!(
            file.object_path(),
            PathBuf::from("/build/libraries/Wire/utility/twi.c.o")
        );
        assert_eq!(
            file.depfile_path(),
            PathBuf::from("/build/libraries/Wire/utility/twi.c.d")
        );
    }

    #[test]
    fn test_library_file_is_owned_and_built_per_library() {
        let lib = Arc::new(Library {
            name: "Wire".to_string(),
            dir_name: "Wire".to_string(),
            install_dir: PathBuf::from("/libs/Wire"),
            source_dir: PathBuf::from("/libs/Wire"),
            utility_dir: Some(PathBuf::from("/libs/Wire/utility")),
            layout: LibraryLayout::Flat,
            location: LibraryLocation::User,
            architectures: vec!["*".to_string()],
            version: None,
            precompiled: false,
            precompiled_with_sources: false,
            is_legacy: true,
            properties: BTreeMap::new(),
        });
        let file = SourceFile::library(
            &lib,
            Path::new("/build/libraries"),
            Path::new("/libs/Wire/Wire.cpp"),
        )
        .unwrap();
        assert_eq!(file.owner().map(|l| l.name.as_str()), Some("Wire"));
        assert_eq!(file.object_path(), PathBuf::from("/build/libraries/Wire/Wire.cpp.o"));
        assert_eq!(file.extra_include_path(), Some(Path::new("/libs/Wire/utility")));
        assert!(sketch_file("a.cpp").owner().is_none());
    }

    #[test]
    fn test_absolute_path_outside_root_is_rejected() {
        let result = SourceFile::sketch(Path::new("/build/sketch"), Path::new("/elsewhere/a.cpp"));
        assert!(matches!(result, Err(DiscoveryError::OutsideRoot { .. })));
    }

    #[test]
    fn test_identity_ignores_how_path_was_given() {
        let a = sketch_file("a.cpp");
        let b = SourceFile::sketch(Path::new("/build/sketch"), Path::new("/build/sketch/a.cpp"))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_queue_is_fifo_and_deduplicates() {
        let mut queue = SourceFileQueue::new();
        assert!(queue.push(sketch_file("a.cpp")));
        assert!(queue.push(sketch_file("b.cpp")));
        assert!(!queue.push(sketch_file("a.cpp")));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.pop().unwrap().relative_path(), Path::new("a.cpp"));
        // Once popped, the same file can be queued again.
        assert!(queue.push(sketch_file("a.cpp")));
        assert_eq!(queue.pop().unwrap().relative_path(), Path::new("b.cpp"));
        assert_eq!(queue.pop().unwrap().relative_path(), Path::new("a.cpp"));
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_queue_keeps_first_occurrence_order(
            paths in prop::collection::vec(relative_source_path(), 0..30)
        ) {
            let mut queue = SourceFileQueue::new();
            for p in &paths {
                queue.push(sketch_file(p));
            }

            let mut expected: Vec<&String> = Vec::new();
            for p in &paths {
                if !expected.contains(&p) {
                    expected.push(p);
                }
            }

            prop_assert_eq!(queue.len(), expected.len());
            for p in expected {
                let popped = queue.pop().unwrap();
                prop_assert_eq!(popped.relative_path(), Path::new(p));
            }
            prop_assert!(queue.is_empty());
        }
    }
}
