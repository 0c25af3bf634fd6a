//! Library definition handling
//!
//! Loads libraries from disk, either in the 1.5 format (with a
//! `library.properties` file) or in the legacy format (a flat folder of
//! sources and headers).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use semver::Version;

use crate::config::defaults::{HEADER_EXTENSIONS, MANDATORY_LIBRARY_PROPERTIES};
use crate::error::LibraryError;

/// Name of the library metadata file
pub const LIBRARY_PROPERTIES: &str = "library.properties";

/// How the library sources are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryLayout {
    /// Sources in the library root (plus optional `utility/`), not recursive
    Flat,
    /// Sources under `src/`, scanned recursively
    Recursive,
}

/// Where a library was found; drives the ranking bonus
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LibraryLocation {
    /// Bundled with the toolchain manager itself
    IdeBuiltIn,
    /// Bundled with a platform referenced by the board's platform
    ReferencedPlatformBuiltIn,
    /// Bundled with the board's platform
    PlatformBuiltIn,
    /// Installed in the user library folder
    User,
    /// Passed explicitly as a single-library folder
    Unmanaged,
}

impl fmt::Display for LibraryLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LibraryLocation::IdeBuiltIn => "ide-builtin",
            LibraryLocation::ReferencedPlatformBuiltIn => "referenced-platform",
            LibraryLocation::PlatformBuiltIn => "platform",
            LibraryLocation::User => "user",
            LibraryLocation::Unmanaged => "unmanaged",
        };
        write!(f, "{s}")
    }
}

/// A directory holding library sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDir {
    /// Directory path
    pub dir: PathBuf,
    /// Whether subdirectories are scanned too
    pub recurse: bool,
}

/// An installed library
#[derive(Debug, Clone)]
pub struct Library {
    /// Library name (from properties, or folder name for legacy libraries)
    pub name: String,
    /// Name of the install folder
    pub dir_name: String,
    /// Install folder
    pub install_dir: PathBuf,
    /// Main source folder; added to the include path when imported
    pub source_dir: PathBuf,
    /// Legacy `utility/` folder, only for flat layouts
    pub utility_dir: Option<PathBuf>,
    /// Source layout
    pub layout: LibraryLayout,
    /// Install location
    pub location: LibraryLocation,
    /// Declared architectures (`*` means any)
    pub architectures: Vec<String>,
    /// Parsed version, if valid
    pub version: Option<Version>,
    /// Ships a prebuilt archive
    pub precompiled: bool,
    /// Ships a prebuilt archive that must be used together with its sources
    pub precompiled_with_sources: bool,
    /// Loaded without library.properties
    pub is_legacy: bool,
    /// Raw library.properties content
    pub properties: BTreeMap<String, String>,
}

impl PartialEq for Library {
    fn eq(&self, other: &Self) -> bool {
        self.install_dir == other.install_dir && self.name == other.name
    }
}

impl Eq for Library {}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

impl Library {
    /// Load the library installed in `dir`
    pub fn load(dir: &Path, location: LibraryLocation) -> Result<Self, LibraryError> {
        let dir = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| LibraryError::Load {
                    path: dir.to_path_buf(),
                    error: e.to_string(),
                })?
                .join(dir)
        };

        if dir.join(LIBRARY_PROPERTIES).is_file() {
            Self::load_1_5(&dir, location)
        } else {
            Self::load_legacy(&dir, location)
        }
    }

    fn load_1_5(dir: &Path, location: LibraryLocation) -> Result<Self, LibraryError> {
        let props_path = dir.join(LIBRARY_PROPERTIES);
        let content = fs::read_to_string(&props_path).map_err(|e| LibraryError::Load {
            path: props_path.clone(),
            error: e.to_string(),
        })?;
        let mut properties = parse_properties(&content);

        let name = properties
            .get("name")
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| dir_name_of(dir));

        if properties.get("maintainer").map_or(true, |m| m.is_empty()) {
            if let Some(email) = properties.get("email").filter(|e| !e.is_empty()).cloned() {
                properties.insert("maintainer".to_string(), email);
            }
        }
        // Absent mandatory properties are recorded as "-"
        for property in MANDATORY_LIBRARY_PROPERTIES {
            let value = properties.entry((*property).to_string()).or_default();
            if value.is_empty() {
                *value = "-".to_string();
            }
        }

        let (layout, source_dir, utility_dir) = if dir.join("src").is_dir() {
            (LibraryLayout::Recursive, dir.join("src"), None)
        } else {
            (LibraryLayout::Flat, dir.to_path_buf(), utility_dir_of(dir))
        };

        let architectures = match properties.get("architectures") {
            Some(a) if !a.trim().is_empty() => comma_separated(a),
            _ => vec!["*".to_string()],
        };

        let precompiled_prop = properties.get("precompiled").map(String::as_str);
        let precompiled_with_sources = precompiled_prop == Some("full");
        let precompiled = precompiled_prop == Some("true") || precompiled_with_sources;

        Ok(Self {
            name,
            dir_name: dir_name_of(dir),
            install_dir: dir.to_path_buf(),
            source_dir,
            utility_dir,
            layout,
            location,
            architectures,
            version: properties.get("version").and_then(|v| parse_version(v)),
            precompiled,
            precompiled_with_sources,
            is_legacy: false,
            properties,
        })
    }

    fn load_legacy(dir: &Path, location: LibraryLocation) -> Result<Self, LibraryError> {
        let entries = fs::read_dir(dir).map_err(|e| LibraryError::Load {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;
        let has_header = entries
            .filter_map(Result::ok)
            .any(|e| e.path().is_file() && is_header(&e.path()));
        if !has_header {
            return Err(LibraryError::NoHeaders {
                path: dir.to_path_buf(),
            });
        }

        Ok(Self {
            name: dir_name_of(dir),
            dir_name: dir_name_of(dir),
            install_dir: dir.to_path_buf(),
            source_dir: dir.to_path_buf(),
            utility_dir: utility_dir_of(dir),
            layout: LibraryLayout::Flat,
            location,
            architectures: vec!["*".to_string()],
            version: None,
            precompiled: false,
            precompiled_with_sources: false,
            is_legacy: true,
            properties: BTreeMap::new(),
        })
    }

    /// All folders whose sources belong to this library
    pub fn source_dirs(&self) -> Vec<SourceDir> {
        let mut dirs = vec![SourceDir {
            dir: self.source_dir.clone(),
            recurse: self.layout == LibraryLayout::Recursive,
        }];
        if let Some(utility) = &self.utility_dir {
            dirs.push(SourceDir {
                dir: utility.clone(),
                recurse: false,
            });
        }
        dirs
    }

    /// Header files at the top level of the source folder
    pub fn source_headers(&self) -> Result<Vec<String>, LibraryError> {
        let entries = fs::read_dir(&self.source_dir).map_err(|e| LibraryError::Load {
            path: self.source_dir.clone(),
            error: format!("reading library source directory: {e}"),
        })?;
        let mut headers: Vec<String> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_header(p))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect();
        headers.sort();
        Ok(headers)
    }

    /// The library explicitly lists `arch`
    pub fn is_optimized_for_architecture(&self, arch: &str) -> bool {
        self.architectures.iter().any(|a| a == arch)
    }

    /// The library declares compatibility with every architecture
    pub fn is_architecture_independent(&self) -> bool {
        self.architectures.is_empty() || self.is_optimized_for_architecture("*")
    }

    /// The library declares compatibility with `arch`
    pub fn is_compatible_with(&self, arch: &str) -> bool {
        self.is_architecture_independent() || self.is_optimized_for_architecture(arch)
    }
}

fn dir_name_of(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn utility_dir_of(dir: &Path) -> Option<PathBuf> {
    let utility = dir.join("utility");
    utility.is_dir().then_some(utility)
}

fn is_header(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| HEADER_EXTENSIONS.contains(&e))
}

fn comma_separated(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).collect()
}

/// Parse a version leniently: "1.2" and "1" are padded to full semver
fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    if let Ok(v) = Version::parse(raw) {
        return Some(v);
    }
    let parts = raw.split('.').count();
    let padded = match parts {
        1 => format!("{raw}.0.0"),
        2 => format!("{raw}.0"),
        _ => return None,
    };
    Version::parse(&padded).ok()
}

/// Parse `key=value` lines; `#` starts a comment line
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_parse_properties() {
        let props = parse_properties("# comment\nname=Wire\n version = 1.0 \nbroken line\n");
        assert_eq!(props.get("name").unwrap(), "Wire");
        assert_eq!(props.get("version").unwrap(), "1.0");
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_parse_version_lenient() {
        assert_eq!(parse_version("1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("1.2"), Some(Version::new(1, 2, 0)));
        assert_eq!(parse_version("2"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_version("latest"), None);
    }

    #[test]
    fn test_load_recursive_layout() {
        let dir = TempDir::new().unwrap();
        let lib_dir = dir.path().join("Servo");
        write(
            &lib_dir,
            "library.properties",
            "name=Servo\nversion=1.1.8\nauthor=A\nmaintainer=M\narchitectures=avr,sam\n",
        );
        write(&lib_dir, "src/Servo.h", "");
        write(&lib_dir, "src/avr/Servo.cpp", "");
        write(&lib_dir, "utility/old.c", "");

        let lib = Library::load(&lib_dir, LibraryLocation::User).unwrap();
        assert_eq!(lib.name, "Servo");
        assert_eq!(lib.layout, LibraryLayout::Recursive);
        assert_eq!(lib.source_dir, lib_dir.join("src"));
        assert!(lib.utility_dir.is_none());
        assert_eq!(lib.architectures, vec!["avr", "sam"]);
        assert_eq!(lib.version, Some(Version::new(1, 1, 8)));
        assert_eq!(lib.to_string(), "Servo@1.1.8");
        assert!(lib.is_compatible_with("avr"));
        assert!(!lib.is_compatible_with("esp32"));
        assert_eq!(
            lib.source_dirs(),
            vec![SourceDir {
                dir: lib_dir.join("src"),
                recurse: true
            }]
        );
        assert_eq!(lib.source_headers().unwrap(), vec!["Servo.h"]);
    }

    #[test]
    fn test_load_flat_layout_with_utility() {
        let dir = TempDir::new().unwrap();
        let lib_dir = dir.path().join("Wire");
        write(&lib_dir, "library.properties", "name=Wire\nemail=me@example.com\n");
        write(&lib_dir, "Wire.h", "");
        write(&lib_dir, "utility/twi.c", "");

        let lib = Library::load(&lib_dir, LibraryLocation::PlatformBuiltIn).unwrap();
        assert_eq!(lib.layout, LibraryLayout::Flat);
        assert_eq!(lib.utility_dir, Some(lib_dir.join("utility")));
        assert_eq!(lib.properties.get("maintainer").unwrap(), "me@example.com");
        assert_eq!(lib.properties.get("author").unwrap(), "-");
        assert_eq!(lib.properties.get("version").unwrap(), "-");
        assert!(lib.version.is_none());
        assert!(lib.is_architecture_independent());
        assert_eq!(lib.source_dirs().len(), 2);
        assert!(!lib.source_dirs()[1].recurse);
    }

    #[test]
    fn test_precompiled_flags() {
        let dir = TempDir::new().unwrap();
        let full = dir.path().join("Full");
        write(&full, "library.properties", "name=Full\nprecompiled=full\n");
        let partial = dir.path().join("Partial");
        write(&partial, "library.properties", "name=Partial\nprecompiled=true\n");

        let full = Library::load(&full, LibraryLocation::User).unwrap();
        assert!(full.precompiled && full.precompiled_with_sources);
        let partial = Library::load(&partial, LibraryLocation::User).unwrap();
        assert!(partial.precompiled && !partial.precompiled_with_sources);
    }

    #[test]
    fn test_legacy_library_requires_header() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("Legacy");
        write(&legacy, "Legacy.h", "");
        let lib = Library::load(&legacy, LibraryLocation::User).unwrap();
        assert!(lib.is_legacy);
        assert_eq!(lib.name, "Legacy");

        let empty = dir.path().join("Empty");
        write(&empty, "readme.txt", "");
        assert!(matches!(
            Library::load(&empty, LibraryLocation::User),
            Err(LibraryError::NoHeaders { .. })
        ));
    }
}
