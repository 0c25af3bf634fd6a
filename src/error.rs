//! Error types for firmkit
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Library discovery errors
///
/// Every variant is fatal for the discovery run that produced it.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The preprocessor could not be started or failed for a reason other
    /// than a missing include
    #[error("Preprocessor failed on '{source_file}': {message}")]
    Preprocessor {
        source_file: PathBuf,
        message: String,
    },

    /// No library provides the missing header.
    ///
    /// The message is the preprocessor's own diagnostic output so the user
    /// sees the real compiler error.
    #[error("{diagnostic}")]
    UnresolvedHeader { header: String, diagnostic: String },

    /// The include cache predicted a missing header that the preprocessor
    /// no longer reports
    #[error("Internal error in cache")]
    CacheInconsistency { source_file: PathBuf, header: String },

    /// The run was cancelled by the caller
    #[error("Library discovery cancelled")]
    Cancelled,

    /// A queued file does not live under its source root
    #[error("Source file '{path}' is not inside '{root}'")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Object/depfile inspection failed
    #[error("Could not check previous build results for '{path}': {error}")]
    Staleness { path: PathBuf, error: String },

    /// Filesystem error while enumerating sources or handling the cache
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Post-discovery validation failed
    #[error(transparent)]
    Library(#[from] LibraryError),
}

/// Library loading and validation errors
#[derive(Error, Debug)]
pub enum LibraryError {
    /// Directory is neither a 1.5-format nor a legacy library
    #[error("Invalid library in '{path}': no header files found")]
    NoHeaders { path: PathBuf },

    /// Failed to read library.properties or the library folder
    #[error("Failed to load library in '{path}': {error}")]
    Load { path: PathBuf, error: String },

    /// The unsupported `arch` folder is present
    #[error("'arch' folder is no longer supported! Found in '{path}'")]
    ArchFolder { path: PathBuf },

    /// A mandatory library.properties field is missing
    #[error("Missing '{property}' from library in {path}")]
    MissingProperty { property: String, path: PathBuf },

    /// Recursive layout combined with a utility folder
    #[error("Library can't use both 'src' and 'utility' folders. Double check in '{path}'.")]
    SrcAndUtility { path: PathBuf },
}

/// Project configuration errors
#[derive(Error, Debug)]
pub enum ProjectError {
    /// Project file not found
    #[error("Project file not found at '{path}'. Create a firmkit.toml first.")]
    NotFound { path: PathBuf },

    /// Project file parse error
    #[error("Failed to parse project file '{path}': {error}")]
    Parse { path: PathBuf, error: String },

    /// Required setting missing or invalid
    #[error("Invalid project setting '{field}': {message}")]
    Invalid { field: String, message: String },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to read directory
    #[error("Failed to read directory '{path}': {error}")]
    ReadDir { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },
}

/// Top-level firmkit error type
#[derive(Error, Debug)]
pub enum FirmkitError {
    /// Discovery error
    #[error("Library discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Library error
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    /// Project error
    #[error("Project error: {0}")]
    Project(#[from] ProjectError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_header_shows_diagnostic_verbatim() {
        let err = DiscoveryError::UnresolvedHeader {
            header: "Missing.h".to_string(),
            diagnostic: "sketch.ino:1:10: fatal error: Missing.h: No such file or directory"
                .to_string(),
        };
        assert_eq!(
            err.to_string(),
            "sketch.ino:1:10: fatal error: Missing.h: No such file or directory"
        );
    }

    #[test]
    fn test_every_top_level_variant_comes_from_a_domain_error() {
        let errors: Vec<FirmkitError> = vec![
            DiscoveryError::Cancelled.into(),
            LibraryError::NoHeaders { path: PathBuf::from("/libs/X") }.into(),
            ProjectError::NotFound { path: PathBuf::from("/p/firmkit.toml") }.into(),
            FilesystemError::ReadFile {
                path: PathBuf::from("/b/includes.cache"),
                error: "denied".to_string(),
            }
            .into(),
        ];
        for err in &errors {
            let prefix = match err {
                FirmkitError::Discovery(_) => "Library discovery failed: ",
                FirmkitError::Library(_) => "Library error: ",
                FirmkitError::Project(_) => "Project error: ",
                FirmkitError::Filesystem(_) => "Filesystem error: ",
            };
            assert!(err.to_string().starts_with(prefix));
        }
    }

    #[test]
    fn test_top_level_wraps_discovery_error() {
        let err: FirmkitError = DiscoveryError::Cancelled.into();
        assert_eq!(err.to_string(), "Library discovery failed: Library discovery cancelled");
    }
}
