//! Filesystem operations
//!
//! Handles file and directory operations, including the source-file
//! enumeration used to feed the discovery queue.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::{DirEntry, WalkDir};

use crate::config::defaults::SOURCE_CONTROL_FOLDERS;
use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Write content to a file
pub fn write_file(path: &Path, content: &[u8]) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<Vec<u8>, FilesystemError> {
    fs::read(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a file, ignoring it if it does not exist
pub fn remove_file(path: &Path) -> Result<(), FilesystemError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesystemError::RemoveFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Set the modification time of an existing file to now
pub fn touch(path: &Path) -> Result<(), FilesystemError> {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    file.set_modified(SystemTime::now())
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

fn is_visible(entry: &DirEntry) -> bool {
    if entry.depth() == 0 {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    !name.starts_with('.') && !SOURCE_CONTROL_FOLDERS.contains(&name.as_ref())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext))
}

/// List the files in `dir` whose extension is one of `extensions`.
///
/// Hidden entries and version-control folders are skipped. With `recurse`
/// set, subdirectories are walked too. Results are sorted by path so that
/// the queue order (and therefore the include cache) is stable across runs.
pub fn find_files_in_folder(
    dir: &Path,
    recurse: bool,
    extensions: &[&str],
) -> Result<Vec<PathBuf>, FilesystemError> {
    let max_depth = if recurse { usize::MAX } else { 1 };
    let mut files = Vec::new();

    let walker = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(is_visible);

    for entry in walker {
        let entry = entry.map_err(|e| FilesystemError::ReadDir {
            path: dir.to_path_buf(),
            error: e.to_string(),
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        if has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
