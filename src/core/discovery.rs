//! Library discovery engine
//!
//! Finds every library a sketch depends on by repeatedly preprocessing its
//! sources. Each run of the preprocessor reveals at most one missing header;
//! the library providing it is added to the include path, its own sources
//! are queued, and the file is preprocessed again until it is clean.
//!
//! Every step is recorded in the include cache. On the next build, files
//! whose objects are still up to date replay the recorded steps instead of
//! running the preprocessor.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::defaults::{
    INCLUDES_CACHE_FILE, LIBRARIES_BUILD_SUBDIR, LIBRARIES_CACHE_FILE, SKETCH_BUILD_SUBDIR,
    SOURCE_EXTENSIONS,
};
use crate::core::detector::{self, Detection};
use crate::core::diagnostics::{self, Diagnostic};
use crate::core::include_cache::IncludeCache;
use crate::core::library::Library;
use crate::core::resolver::LibraryResolver;
use crate::core::source_file::{SourceFile, SourceFileQueue};
use crate::core::validate::{LibraryLayoutValidator, PostDiscoveryValidator};
use crate::error::{DiscoveryError, FilesystemError};
use crate::infra::depfile;
use crate::infra::filesystem;
use crate::infra::preprocessor::{null_device, Preprocessor};

/// Decides whether a source file changed since its object was built
pub trait StalenessCheck {
    /// Whether `object` is up to date with `source` according to `depfile`
    fn is_up_to_date(
        &self,
        source: &Path,
        object: &Path,
        depfile: &Path,
    ) -> Result<bool, DiscoveryError>;
}

/// Timestamp and depfile based staleness check
#[derive(Debug, Default, Clone, Copy)]
pub struct DepfileStaleness;

impl StalenessCheck for DepfileStaleness {
    fn is_up_to_date(
        &self,
        source: &Path,
        object: &Path,
        depfile: &Path,
    ) -> Result<bool, DiscoveryError> {
        depfile::object_is_up_to_date(source, object, depfile).map_err(|e| {
            DiscoveryError::Staleness {
                path: source.to_path_buf(),
                error: e.to_string(),
            }
        })
    }
}

/// Per-run context handed to the engine
#[derive(Debug, Clone, Default)]
pub struct DiscoveryContext {
    /// Emit the per-step progress messages
    pub verbose: bool,
    /// Cancels the run and any running preprocessor
    pub cancel: CancellationToken,
}

/// Where to look and what to do
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Build directory; holds both cache files
    pub build_path: PathBuf,
    /// Platform core folder, always on the include path
    pub core_path: PathBuf,
    /// Board variant folder, always on the include path when set
    pub variant_path: Option<PathBuf>,
    /// Folder holding the preprocessed sketch sources
    pub sketch_build_path: PathBuf,
    /// Merged sketch translation unit, relative to `sketch_build_path`
    pub main_file: PathBuf,
    /// Library build products go in `<libraries_build_path>/<dir name>`
    pub libraries_build_path: PathBuf,
    /// Target architecture used to rank candidate libraries
    pub arch: String,
    /// Reuse `libraries.cache` when present instead of scanning
    pub use_cached_libraries_resolution: bool,
    /// Log and swallow discovery errors
    pub only_update_compilation_database: bool,
}

impl DiscoveryOptions {
    /// Options with the standard build folder layout
    pub fn new(
        build_path: &Path,
        core_path: &Path,
        main_file: impl Into<PathBuf>,
        arch: impl Into<String>,
    ) -> Self {
        Self {
            build_path: build_path.to_path_buf(),
            core_path: core_path.to_path_buf(),
            variant_path: None,
            sketch_build_path: build_path.join(SKETCH_BUILD_SUBDIR),
            main_file: main_file.into(),
            libraries_build_path: build_path.join(LIBRARIES_BUILD_SUBDIR),
            arch: arch.into(),
            use_cached_libraries_resolution: false,
            only_update_compilation_database: false,
        }
    }

    /// Path of the include cache
    pub fn includes_cache_path(&self) -> PathBuf {
        self.build_path.join(INCLUDES_CACHE_FILE)
    }

    /// Path of the resolved include-folder list
    pub fn libraries_cache_path(&self) -> PathBuf {
        self.build_path.join(LIBRARIES_CACHE_FILE)
    }
}

/// The library chosen for a header and the candidates that lost
#[derive(Debug, Clone)]
pub struct ResolutionResult {
    /// Selected library
    pub library: Arc<Library>,
    /// Other libraries providing the same header
    pub not_used: Vec<Arc<Library>>,
}

/// Counters for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStats {
    /// Preprocessor invocations
    pub preprocessor_runs: usize,
    /// Steps answered from the include cache
    pub cache_hits: usize,
    /// Files taken from the queue
    pub files_scanned: usize,
    /// Files accepted by the queue
    pub files_queued: usize,
}

/// Outcome of a discovery run
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Include folders in discovery order (core and variant first)
    pub include_folders: Vec<PathBuf>,
    /// Imported libraries in discovery order, without duplicates
    pub imported_libraries: Vec<Arc<Library>>,
    /// Resolution decisions by header
    pub resolution_results: BTreeMap<String, ResolutionResult>,
    /// Run counters
    pub stats: DiscoveryStats,
    /// The include folders were read back from `libraries.cache`
    pub from_libraries_cache: bool,
}

impl DiscoveryResult {
    /// See [`used_and_not_used_report`]
    pub fn used_and_not_used_report(&self) -> Option<String> {
        used_and_not_used_report(&self.resolution_results)
    }
}

/// Describe every header that more than one library could provide.
///
/// Returns `None` when there was no ambiguity.
pub fn used_and_not_used_report(results: &BTreeMap<String, ResolutionResult>) -> Option<String> {
    let mut report = String::new();
    for (header, result) in results {
        if result.not_used.is_empty() {
            continue;
        }
        let _ = writeln!(report, "Multiple libraries were found for \"{header}\"");
        let _ = writeln!(report, "  Used: {}", result.library.install_dir.display());
        for lib in &result.not_used {
            let _ = writeln!(report, "  Not used: {}", lib.install_dir.display());
        }
    }
    let report = report.trim();
    (!report.is_empty()).then(|| report.to_string())
}

/// Transitive library discovery for one build
pub struct DiscoveryEngine<'a> {
    ctx: DiscoveryContext,
    preprocessor: &'a dyn Preprocessor,
    resolver: &'a dyn LibraryResolver,
    staleness: &'a dyn StalenessCheck,
    validator: &'a dyn PostDiscoveryValidator,

    include_folders: Vec<PathBuf>,
    imported_libraries: Vec<Arc<Library>>,
    resolution_results: BTreeMap<String, ResolutionResult>,
    diagnostics: Vec<Diagnostic>,
    stats: DiscoveryStats,
}

impl<'a> DiscoveryEngine<'a> {
    /// Engine using depfile staleness and the standard library validation
    pub fn new(
        ctx: DiscoveryContext,
        preprocessor: &'a dyn Preprocessor,
        resolver: &'a dyn LibraryResolver,
    ) -> Self {
        Self {
            ctx,
            preprocessor,
            resolver,
            staleness: &DepfileStaleness,
            validator: &LibraryLayoutValidator,
            include_folders: Vec::new(),
            imported_libraries: Vec::new(),
            resolution_results: BTreeMap::new(),
            diagnostics: Vec::new(),
            stats: DiscoveryStats::default(),
        }
    }

    /// Replace the staleness check
    pub fn with_staleness(mut self, staleness: &'a dyn StalenessCheck) -> Self {
        self.staleness = staleness;
        self
    }

    /// Replace the post-discovery validator
    pub fn with_validator(mut self, validator: &'a dyn PostDiscoveryValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Counters of the last run
    pub fn stats(&self) -> DiscoveryStats {
        self.stats
    }

    /// Compiler diagnostics collected from the failing preprocessor run
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Resolution decisions made so far
    pub fn resolution_results(&self) -> &BTreeMap<String, ResolutionResult> {
        &self.resolution_results
    }

    /// Discover the libraries needed by the sketch described by `opts`.
    ///
    /// In compilation-database mode an error is logged and whatever was
    /// discovered up to that point is returned.
    pub fn run(&mut self, opts: &DiscoveryOptions) -> Result<DiscoveryResult, DiscoveryError> {
        self.include_folders.clear();
        self.imported_libraries.clear();
        self.resolution_results.clear();
        self.diagnostics.clear();
        self.stats = DiscoveryStats::default();

        match self.find_includes(opts) {
            Ok(result) => Ok(result),
            Err(e) if opts.only_update_compilation_database => {
                tracing::info!(
                    "An error occurred detecting libraries: the compilation database may be incomplete or inaccurate ({e})"
                );
                Ok(self.result(false))
            }
            Err(e) => Err(e),
        }
    }

    fn result(&self, from_libraries_cache: bool) -> DiscoveryResult {
        DiscoveryResult {
            include_folders: self.include_folders.clone(),
            imported_libraries: self.imported_libraries.clone(),
            resolution_results: self.resolution_results.clone(),
            stats: self.stats,
            from_libraries_cache,
        }
    }

    fn find_includes(&mut self, opts: &DiscoveryOptions) -> Result<DiscoveryResult, DiscoveryError> {
        let libraries_cache = opts.libraries_cache_path();
        if opts.use_cached_libraries_resolution && libraries_cache.is_file() {
            let bytes = filesystem::read_file(&libraries_cache)?;
            self.include_folders = serde_json::from_slice(&bytes).map_err(|e| {
                FilesystemError::ReadFile {
                    path: libraries_cache.clone(),
                    error: e.to_string(),
                }
            })?;
            if self.ctx.verbose {
                tracing::info!("Using cached library discovery: {}", libraries_cache.display());
            }
            return Ok(self.result(true));
        }

        let mut cache = IncludeCache::load(&opts.includes_cache_path());

        if let Err(e) = self.seed_and_drain(&mut cache, opts) {
            if let Err(remove_err) = cache.remove() {
                tracing::warn!("Could not remove include cache: {remove_err}");
            }
            return Err(e);
        }

        cache.expect_end();
        if let Err(e) = cache.flush() {
            tracing::warn!("Could not write include cache: {e}");
            if let Err(remove_err) = cache.remove() {
                tracing::warn!("Could not remove include cache: {remove_err}");
            }
        }

        self.validator.validate(&self.imported_libraries)?;

        let json = serde_json::to_vec(&self.include_folders).map_err(|e| {
            FilesystemError::WriteFile {
                path: libraries_cache.clone(),
                error: e.to_string(),
            }
        })?;
        filesystem::write_file(&libraries_cache, &json)?;

        Ok(self.result(false))
    }

    fn seed_and_drain(
        &mut self,
        cache: &mut IncludeCache,
        opts: &DiscoveryOptions,
    ) -> Result<(), DiscoveryError> {
        self.append_include_folder(cache, None, "", &opts.core_path);
        if let Some(variant) = &opts.variant_path {
            self.append_include_folder(cache, None, "", variant);
        }

        let mut queue = SourceFileQueue::new();
        let sketch_dir = &opts.sketch_build_path;
        self.enqueue(&mut queue, SourceFile::sketch(sketch_dir, &opts.main_file)?);
        for path in filesystem::find_files_in_folder(sketch_dir, false, SOURCE_EXTENSIONS)? {
            self.enqueue(&mut queue, SourceFile::sketch(sketch_dir, &path)?);
        }
        let src_dir = sketch_dir.join("src");
        if src_dir.is_dir() {
            for path in filesystem::find_files_in_folder(&src_dir, true, SOURCE_EXTENSIONS)? {
                self.enqueue(&mut queue, SourceFile::sketch(sketch_dir, &path)?);
            }
        }

        while let Some(file) = queue.pop() {
            if self.ctx.cancel.is_cancelled() {
                return Err(DiscoveryError::Cancelled);
            }
            self.find_includes_until_done(cache, &mut queue, &file, opts)?;
        }
        Ok(())
    }

    fn enqueue(&mut self, queue: &mut SourceFileQueue, file: SourceFile) {
        if queue.push(file) {
            self.stats.files_queued += 1;
        }
    }

    fn append_include_folder(
        &mut self,
        cache: &mut IncludeCache,
        source: Option<&Path>,
        header: &str,
        folder: &Path,
    ) {
        self.include_folders.push(folder.to_path_buf());
        cache.expect_entry(source, header, Some(folder));
    }

    fn find_includes_until_done(
        &mut self,
        cache: &mut IncludeCache,
        queue: &mut SourceFileQueue,
        file: &SourceFile,
        opts: &DiscoveryOptions,
    ) -> Result<(), DiscoveryError> {
        self.stats.files_scanned += 1;
        let source_path = file.source_path();
        tracing::debug!(
            "Scanning {} from {}",
            file.relative_path().display(),
            file.owner().map_or("the sketch", |lib| lib.name.as_str())
        );
        let target = null_device();
        let unchanged = self.staleness.is_up_to_date(
            &source_path,
            &file.object_path(),
            &file.depfile_path(),
        )?;

        // Extra folders searched for this file only; never recorded
        let mut local_includes: Vec<PathBuf> =
            file.extra_include_path().map(Path::to_path_buf).into_iter().collect();
        let mut first = true;

        loop {
            cache.expect_file(&source_path);

            let mut include_dirs = self.include_folders.clone();
            include_dirs.extend(local_includes.iter().cloned());

            let mut live_stderr: Option<String> = None;
            let missing = if unchanged && cache.is_valid() {
                self.stats.cache_hits += 1;
                if first && self.ctx.verbose {
                    tracing::info!("Using cached library dependencies for file: {}", source_path.display());
                }
                cache.next().map(|e| e.include.clone()).unwrap_or_default()
            } else {
                let run = self.detect(&source_path, &target, &include_dirs)?;
                match run.detection {
                    Detection::Clean => String::new(),
                    Detection::MissingHeader(header) => {
                        live_stderr = Some(run.output.stderr_text());
                        header
                    }
                }
            };

            if missing.is_empty() {
                cache.expect_entry(Some(&source_path), "", None);
                return Ok(());
            }

            let Some(library) = self.resolve_library(&missing, &opts.arch) else {
                let (header, diagnostic) = match live_stderr {
                    Some(stderr) => (missing, stderr),
                    None => {
                        // The header came from the cache: get the real diagnostic.
                        let run = self.detect(&source_path, &target, &include_dirs)?;
                        match run.detection {
                            Detection::Clean => {
                                return Err(DiscoveryError::CacheInconsistency {
                                    source_file: source_path,
                                    header: missing,
                                });
                            }
                            Detection::MissingHeader(live) => (live, run.output.stderr_text()),
                        }
                    }
                };
                self.diagnostics = diagnostics::parse_gcc_output(&diagnostic);
                return Err(DiscoveryError::UnresolvedHeader {
                    header,
                    diagnostic: diagnostic.trim_end().to_string(),
                });
            };

            if !self.imported_libraries.contains(&library) {
                self.imported_libraries.push(Arc::clone(&library));
            }
            self.append_include_folder(cache, Some(&source_path), &missing, &library.source_dir);

            if let Some(utility) = &library.utility_dir {
                if !local_includes.contains(utility) {
                    local_includes.push(utility.clone());
                }
            }

            if library.precompiled && library.precompiled_with_sources {
                if self.ctx.verbose {
                    tracing::info!("Skipping dependencies detection for precompiled library {}", library.name);
                }
            } else {
                for source_dir in library.source_dirs() {
                    if !source_dir.dir.is_dir() {
                        continue;
                    }
                    let files = filesystem::find_files_in_folder(
                        &source_dir.dir,
                        source_dir.recurse,
                        SOURCE_EXTENSIONS,
                    )?;
                    for path in files {
                        let queued = SourceFile::library(&library, &opts.libraries_build_path, &path)?;
                        self.enqueue(queue, queued);
                    }
                }
            }
            first = false;
        }
    }

    fn detect(
        &mut self,
        source: &Path,
        target: &Path,
        include_dirs: &[PathBuf],
    ) -> Result<detector::DetectorRun, DiscoveryError> {
        self.stats.preprocessor_runs += 1;
        let run = detector::detect(self.preprocessor, source, target, include_dirs, &self.ctx.cancel)?;
        if self.ctx.verbose {
            tracing::info!("{}", run.output.args.join(" "));
        }
        Ok(run)
    }

    /// Pick the library providing `header`.
    ///
    /// When any candidate is already imported no library is selected, even
    /// if the imported one could provide the header.
    fn resolve_library(&mut self, header: &str, arch: &str) -> Option<Arc<Library>> {
        let mut candidates = self.resolver.alternatives_for(header);
        if self.ctx.verbose {
            let names: Vec<String> = candidates.iter().map(|l| l.to_string()).collect();
            tracing::info!("Alternatives for {}: [{}]", header, names.join(", "));
        }
        if candidates.is_empty() {
            return None;
        }
        if candidates.iter().any(|c| self.imported_libraries.contains(c)) {
            return None;
        }

        let selected = self.resolver.resolve_for(header, arch)?;
        candidates.retain(|c| c != &selected);
        self.resolution_results.insert(
            header.to_string(),
            ResolutionResult {
                library: Arc::clone(&selected),
                not_used: candidates,
            },
        );
        Some(selected)
    }
}
