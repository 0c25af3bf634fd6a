//! Post-discovery library validation
//!
//! Imported libraries are checked once discovery has finished; a library
//! that cannot be built correctly fails the run here.

use std::sync::Arc;

use crate::config::defaults::MANDATORY_LIBRARY_PROPERTIES;
use crate::core::library::{Library, LibraryLayout};
use crate::error::LibraryError;

/// Checks the imported libraries after discovery
pub trait PostDiscoveryValidator {
    /// Fail on the first library that is not acceptable
    fn validate(&self, imported: &[Arc<Library>]) -> Result<(), LibraryError>;
}

/// Rejects libraries with an unsupported layout or incomplete metadata
#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryLayoutValidator;

impl PostDiscoveryValidator for LibraryLayoutValidator {
    fn validate(&self, imported: &[Arc<Library>]) -> Result<(), LibraryError> {
        imported.iter().try_for_each(|lib| check_library(lib))
    }
}

/// Accepts everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoValidation;

impl PostDiscoveryValidator for NoValidation {
    fn validate(&self, _imported: &[Arc<Library>]) -> Result<(), LibraryError> {
        Ok(())
    }
}

fn check_library(lib: &Library) -> Result<(), LibraryError> {
    if lib.is_legacy {
        return Ok(());
    }

    if lib.install_dir.join("arch").is_dir() {
        return Err(LibraryError::ArchFolder {
            path: lib.install_dir.clone(),
        });
    }

    for property in MANDATORY_LIBRARY_PROPERTIES {
        let present = lib
            .properties
            .get(*property)
            .is_some_and(|v| !v.trim().is_empty());
        if !present {
            return Err(LibraryError::MissingProperty {
                property: (*property).to_string(),
                path: lib.install_dir.clone(),
            });
        }
    }

    if lib.layout == LibraryLayout::Recursive && lib.install_dir.join("utility").is_dir() {
        return Err(LibraryError::SrcAndUtility {
            path: lib.install_dir.clone(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::library::LibraryLocation;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const COMPLETE: &str = "name=Good\nversion=1.0.0\nauthor=A\nmaintainer=M\n";

    fn make(root: &Path, name: &str, props: Option<&str>, dirs: &[&str]) -> Arc<Library> {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.h")), "").unwrap();
        if let Some(props) = props {
            fs::write(dir.join("library.properties"), props).unwrap();
        }
        for d in dirs {
            fs::create_dir_all(dir.join(d)).unwrap();
        }
        Arc::new(Library::load(&dir, LibraryLocation::User).unwrap())
    }

    #[test]
    fn test_valid_libraries_pass() {
        let tmp = TempDir::new().unwrap();
        let good = make(tmp.path(), "Good", Some(COMPLETE), &["src"]);
        let legacy = make(tmp.path(), "Legacy", None, &["arch"]);
        assert!(LibraryLayoutValidator.validate(&[good, legacy]).is_ok());
    }

    #[test]
    fn test_arch_folder_rejected() {
        let tmp = TempDir::new().unwrap();
        let lib = make(tmp.path(), "Arch", Some(COMPLETE), &["arch"]);
        assert!(matches!(
            LibraryLayoutValidator.validate(&[lib]),
            Err(LibraryError::ArchFolder { .. })
        ));
    }

    #[test]
    fn test_loaded_library_with_sparse_properties_passes() {
        let tmp = TempDir::new().unwrap();
        let lib = make(tmp.path(), "Sparse", Some("name=Sparse\n"), &["src"]);
        assert!(LibraryLayoutValidator.validate(&[lib]).is_ok());
    }

    #[test]
    fn test_missing_property_rejected() {
        let tmp = TempDir::new().unwrap();
        let loaded = make(tmp.path(), "NoAuthor", Some(COMPLETE), &[]);
        let mut lib = (*loaded).clone();
        lib.properties.remove("author");
        match LibraryLayoutValidator.validate(&[Arc::new(lib)]) {
            Err(LibraryError::MissingProperty { property, .. }) => assert_eq!(property, "author"),
            other => panic!("expected missing property, got {other:?}"),
        }
    }

    #[test]
    fn test_src_and_utility_rejected() {
        let tmp = TempDir::new().unwrap();
        let lib = make(tmp.path(), "Both", Some(COMPLETE), &["src", "utility"]);
        assert!(matches!(
            LibraryLayoutValidator.validate(&[lib]),
            Err(LibraryError::SrcAndUtility { .. })
        ));
        assert!(NoValidation.validate(&[]).is_ok());
    }
}
