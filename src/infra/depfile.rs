//! Make-style dependency files
//!
//! Reads the `.d` files emitted by `gcc -MMD` and decides whether an object
//! file is still up to date with respect to its source and headers.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::SystemTime;

use crate::error::FilesystemError;

/// Parsed dependency file
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DepFile {
    /// Target of the rule (the object file)
    pub object_file: String,
    /// Prerequisites; the first one is the compiled source
    pub dependencies: Vec<String>,
}

impl DepFile {
    /// Parse depfile content.
    ///
    /// Returns `None` when the content is not a make rule. Empty content
    /// yields an empty `DepFile`.
    pub fn parse(content: &str) -> Option<Self> {
        let tokens = tokenize(content)?;
        let mut tokens = tokens.into_iter();

        let Some(first) = tokens.next() else {
            return Some(Self::default());
        };

        let object_file = if let Some(target) = first.strip_suffix(':') {
            target.to_string()
        } else {
            match tokens.next() {
                Some(colon) if colon == ":" => first,
                _ => return None,
            }
        };

        Some(Self {
            object_file,
            dependencies: tokens.collect(),
        })
    }
}

/// Split depfile content into unescaped words
fn tokenize(content: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\n') => flush(&mut tokens, &mut current),
                Some('\r') if chars.peek() == Some(&'\n') => {
                    chars.next();
                    flush(&mut tokens, &mut current);
                }
                Some(' ') => current.push(' '),
                Some('#') => current.push('#'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => return None,
            },
            '$' => match chars.next() {
                Some('$') => current.push('$'),
                _ => return None,
            },
            c if c.is_whitespace() => flush(&mut tokens, &mut current),
            c => current.push(c),
        }
    }
    flush(&mut tokens, &mut current);
    Some(tokens)
}

fn flush(tokens: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

fn modified(path: &Path) -> Result<Option<SystemTime>, FilesystemError> {
    match fs::metadata(path).and_then(|m| m.modified()) {
        Ok(time) => Ok(Some(time)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(FilesystemError::ReadFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Check whether `object_file` is up to date with `source_file`.
///
/// A missing object or depfile means "stale", not an error. A malformed
/// depfile also means "stale" so that a rebuild regenerates it.
pub fn object_is_up_to_date(
    source_file: &Path,
    object_file: &Path,
    depfile: &Path,
) -> Result<bool, FilesystemError> {
    tracing::debug!(
        "Checking previous results for {} (result = {}, dep = {})",
        source_file.display(),
        object_file.display(),
        depfile.display()
    );

    let source_time = modified(source_file)?.ok_or_else(|| FilesystemError::ReadFile {
        path: source_file.to_path_buf(),
        error: "file not found".to_string(),
    })?;

    let Some(object_time) = modified(object_file)? else {
        tracing::debug!("Object file not found: {}", object_file.display());
        return Ok(false);
    };
    let Some(depfile_time) = modified(depfile)? else {
        tracing::debug!("Dependency file not found: {}", depfile.display());
        return Ok(false);
    };

    if source_time > object_time {
        tracing::debug!("{} newer than {}", source_file.display(), object_file.display());
        return Ok(false);
    }
    if source_time > depfile_time {
        tracing::debug!("{} newer than {}", source_file.display(), depfile.display());
        return Ok(false);
    }

    let content = fs::read_to_string(depfile).map_err(|e| FilesystemError::ReadFile {
        path: depfile.to_path_buf(),
        error: e.to_string(),
    })?;
    let Some(deps) = DepFile::parse(&content) else {
        tracing::debug!("Could not parse dependency file: {}", depfile.display());
        return Ok(false);
    };
    if deps.dependencies.is_empty() {
        return Ok(true);
    }

    if Path::new(&deps.object_file) != object_file {
        tracing::debug!(
            "Depfile is about different object file: {} (expected {})",
            deps.object_file,
            object_file.display()
        );
        return Ok(false);
    }
    if Path::new(&deps.dependencies[0]) != source_file {
        tracing::debug!(
            "Depfile is about different source file: {} (expected {})",
            deps.dependencies[0],
            source_file.display()
        );
        return Ok(false);
    }

    for dep in &deps.dependencies[1..] {
        match modified(Path::new(dep)) {
            Ok(Some(time)) if time > object_time => {
                tracing::debug!("{} newer than {}", dep, object_file.display());
                return Ok(false);
            }
            Ok(Some(_)) => {}
            Ok(None) | Err(_) => {
                tracing::debug!("Not found: {}", dep);
                return Ok(false);
            }
        }
    }

    Ok(true)
}
