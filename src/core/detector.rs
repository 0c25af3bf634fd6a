//! Missing-include detection
//!
//! Runs the preprocessor on one source file and classifies the outcome:
//! clean, missing header (the expected signal that drives discovery), or a
//! hard failure that aborts the whole run.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::error::DiscoveryError;
use crate::infra::preprocessor::{PreprocessError, PreprocessOutput, Preprocessor};

/// Outcome of one detection run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The preprocessor completed without a missing header
    Clean,
    /// The preprocessor stopped on this unresolved `#include`
    MissingHeader(String),
}

/// A detection together with the raw preprocessor output
#[derive(Debug, Clone)]
pub struct DetectorRun {
    /// Classified outcome
    pub detection: Detection,
    /// Captured output, kept for diagnostics
    pub output: PreprocessOutput,
}

/// Preprocess `source` and classify the result.
///
/// A non-zero exit whose diagnostics do not name a missing header is a hard
/// failure, as is any failure to run the tool at all.
pub fn detect(
    preprocessor: &dyn Preprocessor,
    source: &Path,
    output: &Path,
    include_dirs: &[PathBuf],
    cancel: &CancellationToken,
) -> Result<DetectorRun, DiscoveryError> {
    let result = preprocessor
        .run(source, output, include_dirs, cancel)
        .map_err(|e| match e {
            PreprocessError::Cancelled => DiscoveryError::Cancelled,
            other => DiscoveryError::Preprocessor {
                source_file: source.to_path_buf(),
                message: other.to_string(),
            },
        })?;

    if result.success {
        return Ok(DetectorRun {
            detection: Detection::Clean,
            output: result,
        });
    }

    let stderr = result.stderr_text();
    match find_missing_include(&stderr) {
        Some(header) => Ok(DetectorRun {
            detection: Detection::MissingHeader(header),
            output: result,
        }),
        None => {
            tracing::info!("Error while detecting libraries included by {}", source.display());
            Err(DiscoveryError::Preprocessor {
                source_file: source.to_path_buf(),
                message: stderr.trim().to_string(),
            })
        }
    }
}

fn include_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?ms)^\s*#[ \t]*include\s*[<"](\S+)[">]"#).expect("valid include regex")
    })
}

/// Extract the missing header name from preprocessor diagnostics.
///
/// GCC echoes the offending `#include` line below the error; that line is
/// matched first. Older toolchains only print
/// `file:line: fatal error: header.h: No such file or directory`, which is
/// the fallback.
pub fn find_missing_include(stderr: &str) -> Option<String> {
    if let Some(caps) = include_regex().captures(stderr) {
        let header = caps[1].trim();
        if !header.is_empty() {
            return Some(header.to_string());
        }
    }
    find_include_for_old_compilers(stderr)
}

fn find_include_for_old_compilers(stderr: &str) -> Option<String> {
    for line in stderr.lines() {
        let parts: Vec<&str> = line.split(':').collect();
        for (i, part) in parts.iter().enumerate() {
            if part.contains("fatal error") {
                let header = parts.get(i + 1)?.trim();
                return (!header.is_empty()).then(|| header.to_string());
            }
        }
    }
    None
}
