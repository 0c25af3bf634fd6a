//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests: a temporary
//! project layout, a fake preprocessor and controllable staleness checks.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use firmkit::core::discovery::{DiscoveryOptions, StalenessCheck};
use firmkit::core::library::LibraryLocation;
use firmkit::core::resolver::HeaderIndex;
use firmkit::error::DiscoveryError;
use firmkit::infra::preprocessor::{PreprocessError, PreprocessOutput, Preprocessor};
use regex::Regex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Name of the merged sketch translation unit
pub const MAIN_FILE: &str = "Sketch.ino.cpp";

/// Test project context
///
/// Creates a temporary directory for test projects and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create a new test project in a temporary directory
    pub fn new() -> Self {
        let project = Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        };
        project.create_dir("core");
        project.create_dir("libs");
        project.create_dir("build/sketch");
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Write the merged sketch source
    pub fn sketch(&self, content: &str) {
        self.create_file(&format!("build/sketch/{MAIN_FILE}"), content);
    }

    /// Write a file of library `name` (relative to the library folder)
    pub fn library_file(&self, name: &str, file: &str, content: &str) {
        self.create_file(&format!("libs/{name}/{file}"), content);
    }

    /// Write a legacy library with a header and a source including it
    pub fn simple_library(&self, name: &str, header_body: &str) {
        self.library_file(name, &format!("{name}.h"), header_body);
        self.library_file(name, &format!("{name}.cpp"), &format!("#include \"{name}.h\"\n"));
    }

    /// Source folder of library `name` (flat layout)
    pub fn library_dir(&self, name: &str) -> PathBuf {
        self.path().join("libs").join(name)
    }

    /// Platform core folder
    pub fn core_dir(&self) -> PathBuf {
        self.path().join("core")
    }

    /// Discovery options for this project
    pub fn options(&self) -> DiscoveryOptions {
        DiscoveryOptions::new(&self.path().join("build"), &self.core_dir(), MAIN_FILE, "avr")
    }

    /// Index of everything under `libs/`
    pub fn index(&self) -> HeaderIndex {
        let mut index = HeaderIndex::new();
        index
            .scan_libraries_dir(&self.path().join("libs"), LibraryLocation::User)
            .expect("Failed to index libraries");
        index
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Preprocessor stand-in that follows `#include` lines through the files
/// on disk.
///
/// Quoted includes are looked up next to the including file first, then in
/// the include folders. The first header that cannot be found produces a
/// GCC-style "fatal error" diagnostic. An `#error` line produces an
/// ordinary compile error.
#[derive(Default)]
pub struct FakePreprocessor {
    runs: Cell<usize>,
    sources: RefCell<Vec<PathBuf>>,
}

enum Failure {
    Missing {
        file: PathBuf,
        line: usize,
        text: String,
        header: String,
    },
    Error {
        file: PathBuf,
        line: usize,
        text: String,
    },
}

impl FakePreprocessor {
    /// Create a fake with zero recorded runs
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations so far
    pub fn runs(&self) -> usize {
        self.runs.get()
    }

    /// Sources passed to each invocation, in order
    pub fn sources(&self) -> Vec<PathBuf> {
        self.sources.borrow().clone()
    }

    /// Forget recorded invocations
    pub fn reset(&self) {
        self.runs.set(0);
        self.sources.borrow_mut().clear();
    }

    fn scan(
        &self,
        file: &Path,
        include_dirs: &[PathBuf],
        visited: &mut HashSet<PathBuf>,
    ) -> Result<(), Failure> {
        let include = Regex::new(r#"^\s*#\s*include\s*([<"])([^>"]+)[>"]"#).unwrap();
        let content = std::fs::read_to_string(file).unwrap_or_default();

        for (i, text) in content.lines().enumerate() {
            if text.trim_start().starts_with("#error") {
                return Err(Failure::Error {
                    file: file.to_path_buf(),
                    line: i + 1,
                    text: text.trim().to_string(),
                });
            }
            let Some(caps) = include.captures(text) else {
                continue;
            };
            let header = &caps[2];

            let mut search: Vec<PathBuf> = Vec::new();
            if &caps[1] == "\"" {
                if let Some(parent) = file.parent() {
                    search.push(parent.to_path_buf());
                }
            }
            search.extend(include_dirs.iter().cloned());

            let Some(found) = search.iter().map(|d| d.join(header)).find(|p| p.is_file()) else {
                return Err(Failure::Missing {
                    file: file.to_path_buf(),
                    line: i + 1,
                    text: text.to_string(),
                    header: header.to_string(),
                });
            };
            if visited.insert(found.clone()) {
                self.scan(&found, include_dirs, visited)?;
            }
        }
        Ok(())
    }
}

impl Preprocessor for FakePreprocessor {
    fn run(
        &self,
        source: &Path,
        output: &Path,
        include_dirs: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<PreprocessOutput, PreprocessError> {
        if cancel.is_cancelled() {
            return Err(PreprocessError::Cancelled);
        }
        self.runs.set(self.runs.get() + 1);
        self.sources.borrow_mut().push(source.to_path_buf());

        let mut args = vec!["fake-g++".to_string(), "-E".to_string()];
        args.extend(include_dirs.iter().map(|d| format!("-I{}", d.display())));
        args.push(source.display().to_string());
        args.push("-o".to_string());
        args.push(output.display().to_string());

        let mut visited = HashSet::new();
        visited.insert(source.to_path_buf());
        let stderr = match self.scan(source, include_dirs, &mut visited) {
            Ok(()) => {
                return Ok(PreprocessOutput {
                    args,
                    success: true,
                    ..Default::default()
                })
            }
            Err(Failure::Missing {
                file,
                line,
                text,
                header,
            }) => format!(
                "{}:{line}:10: fatal error: {header}: No such file or directory\n {text}\n          ^~~~~~~~~~\ncompilation terminated.\n",
                file.display()
            ),
            Err(Failure::Error { file, line, text }) => {
                format!("{}:{line}:2: error: {text}\n", file.display())
            }
        };

        Ok(PreprocessOutput {
            args,
            stdout: Vec::new(),
            stderr: stderr.into_bytes(),
            success: false,
        })
    }
}

/// Every object is up to date
pub struct AlwaysFresh;

impl StalenessCheck for AlwaysFresh {
    fn is_up_to_date(&self, _: &Path, _: &Path, _: &Path) -> Result<bool, DiscoveryError> {
        Ok(true)
    }
}

/// Every object is stale
pub struct AlwaysStale;

impl StalenessCheck for AlwaysStale {
    fn is_up_to_date(&self, _: &Path, _: &Path, _: &Path) -> Result<bool, DiscoveryError> {
        Ok(false)
    }
}

/// Objects are up to date except for the listed sources
#[derive(Default)]
pub struct ChangedFiles {
    changed: HashSet<PathBuf>,
}

impl ChangedFiles {
    /// Mark `source` as modified
    pub fn with(mut self, source: PathBuf) -> Self {
        self.changed.insert(source);
        self
    }
}

impl StalenessCheck for ChangedFiles {
    fn is_up_to_date(&self, source: &Path, _: &Path, _: &Path) -> Result<bool, DiscoveryError> {
        Ok(!self.changed.contains(source))
    }
}

/// Sample project file for CLI tests
pub const SAMPLE_PROJECT: &str = r#"
[build]
path = "build"
sketch = "Sketch.ino"
core_path = "core"
arch = "avr"

[libraries]
dirs = ["libs"]
"#;
