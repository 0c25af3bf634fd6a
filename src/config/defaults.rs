//! Default configuration values

/// Project file name
pub const PROJECT_FILE: &str = "firmkit.toml";

/// Include discovery journal, one per build directory
pub const INCLUDES_CACHE_FILE: &str = "includes.cache";

/// Final include-folder list written after a successful discovery
pub const LIBRARIES_CACHE_FILE: &str = "libraries.cache";

/// Default build directory (relative to the project)
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Sketch sources are copied here inside the build directory
pub const SKETCH_BUILD_SUBDIR: &str = "sketch";

/// Library build products live here inside the build directory
pub const LIBRARIES_BUILD_SUBDIR: &str = "libraries";

/// Default preprocessor command
pub const DEFAULT_PREPROCESSOR: &str = "g++";

/// Environment variable overriding the preprocessor command
pub const ENV_PREPROCESSOR: &str = "FIRMKIT_PREPROCESSOR";

/// Flags added to every discovery-phase preprocessor run
pub const PREPROCESS_FLAGS: &[&str] = &["-w", "-x", "c++", "-E", "-CC"];

/// Maximum captured preprocessor stderr (in bytes)
pub const MAX_STDERR_BYTES: usize = 100 * 1024;

/// Extensions of files scanned for includes
pub const SOURCE_EXTENSIONS: &[&str] = &["c", "cpp", "S"];

/// Extensions of files indexed as library headers
pub const HEADER_EXTENSIONS: &[&str] = &["h", "hpp", "hh"];

/// Folders never descended into while enumerating sources
pub const SOURCE_CONTROL_FOLDERS: &[&str] = &[
    "CVS",
    "RCS",
    ".git",
    ".github",
    ".svn",
    ".hg",
    ".bzr",
    ".vscode",
    ".settings",
    ".pioenvs",
    ".piolibdeps",
];

/// Properties every 1.5-format library must declare
pub const MANDATORY_LIBRARY_PROPERTIES: &[&str] = &["name", "version", "author", "maintainer"];

