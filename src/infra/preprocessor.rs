//! Preprocessor invocation
//!
//! Runs the discovery-phase preprocessor (`g++ -E` or compatible) as an
//! external process. The discovery engine only sees the [`Preprocessor`]
//! trait; spawning, output capture and cancellation live here.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::defaults::{MAX_STDERR_BYTES, PREPROCESS_FLAGS};

/// Interval between child-process status polls
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Appended to stderr when the capture limit is hit
pub const TRUNCATION_NOTICE: &str = "Compiler error output has been truncated.";

/// Errors raised before or while running the preprocessor
///
/// A non-zero exit status is *not* an error here; it is reported through
/// [`PreprocessOutput::success`].
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Preprocessor executable not found
    #[error("Preprocessor '{command}' not found in PATH")]
    NotFound { command: String },

    /// The process could not be spawned
    #[error("Failed to start '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Waiting on or reading from the process failed
    #[error("I/O error while running '{command}': {error}")]
    Io { command: String, error: String },

    /// The run was cancelled and the process killed
    #[error("Preprocessor run cancelled")]
    Cancelled,
}

/// Captured result of a preprocessor run
#[derive(Debug, Clone, Default)]
pub struct PreprocessOutput {
    /// Full command line
    pub args: Vec<String>,
    /// Standard output, prefixed with the echoed command line
    pub stdout: Vec<u8>,
    /// Standard error (capped)
    pub stderr: Vec<u8>,
    /// Whether the process exited with status 0
    pub success: bool,
}

impl PreprocessOutput {
    /// Standard error as text
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Something that can preprocess one source file
pub trait Preprocessor {
    /// Preprocess `source` into `output` using `include_dirs` as search path.
    fn run(
        &self,
        source: &Path,
        output: &Path,
        include_dirs: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<PreprocessOutput, PreprocessError>;
}

/// Path of the null device, the default preprocessor output target
pub fn null_device() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("nul")
    } else {
        PathBuf::from("/dev/null")
    }
}

/// GCC-compatible preprocessor driven through a command line
#[derive(Debug, Clone)]
pub struct GccPreprocessor {
    /// Executable name or path
    command: String,
    /// Extra flags placed before the discovery flags
    flags: Vec<String>,
}

impl GccPreprocessor {
    /// Create a preprocessor wrapper for `command`
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            flags: Vec::new(),
        }
    }

    /// Set extra compiler flags (defines, CPU flags, ...)
    #[must_use]
    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    /// Get the command name
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Build the argument list (without the program name)
    pub fn build_args(&self, source: &Path, output: &Path, include_dirs: &[PathBuf]) -> Vec<String> {
        let mut args: Vec<String> = self.flags.clone();
        args.extend(PREPROCESS_FLAGS.iter().map(|f| (*f).to_string()));
        args.extend(include_dirs.iter().map(|d| format!("-I{}", d.display())));
        args.push(source.display().to_string());
        args.push("-o".to_string());
        args.push(output.display().to_string());

        // -MMD would make gcc try to write a dependency file next to the
        // output, which fails for the null device.
        args.retain(|a| a != "-MMD");
        args
    }
}

impl Preprocessor for GccPreprocessor {
    fn run(
        &self,
        source: &Path,
        output: &Path,
        include_dirs: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<PreprocessOutput, PreprocessError> {
        let program = which::which(&self.command).map_err(|_| PreprocessError::NotFound {
            command: self.command.clone(),
        })?;
        let args = self.build_args(source, output, include_dirs);

        let mut full_args = vec![self.command.clone()];
        full_args.extend(args.iter().cloned());
        tracing::debug!("Running preprocessor: {}", full_args.join(" "));

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PreprocessError::Spawn {
                command: self.command.clone(),
                error: e.to_string(),
            })?;

        let io_error = |e: std::io::Error| PreprocessError::Io {
            command: self.command.clone(),
            error: e.to_string(),
        };

        let mut stdout_pipe = child.stdout.take().ok_or_else(|| PreprocessError::Io {
            command: self.command.clone(),
            error: "stdout not captured".to_string(),
        })?;
        let mut stderr_pipe = child.stderr.take().ok_or_else(|| PreprocessError::Io {
            command: self.command.clone(),
            error: "stderr not captured".to_string(),
        })?;

        let stdout_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf);
            buf
        });

        let overflow = Arc::new(AtomicBool::new(false));
        let overflow_flag = Arc::clone(&overflow);
        let stderr_reader = thread::spawn(move || {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 8192];
            loop {
                match stderr_pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.len() > MAX_STDERR_BYTES {
                            overflow_flag.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            }
            buf
        });

        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(PreprocessError::Cancelled);
            }
            if overflow.load(Ordering::SeqCst) {
                let _ = child.kill();
            }
            if let Some(status) = child.try_wait().map_err(io_error)? {
                break status;
            }
            thread::sleep(POLL_INTERVAL);
        };

        let mut stdout = full_args.join(" ").into_bytes();
        stdout.push(b'\n');
        stdout.extend(stdout_reader.join().unwrap_or_default());

        let mut stderr = stderr_reader.join().unwrap_or_default();
        if overflow.load(Ordering::SeqCst) {
            stderr.push(b'\n');
            stderr.extend_from_slice(TRUNCATION_NOTICE.as_bytes());
            stderr.push(b'\n');
        }

        Ok(PreprocessOutput {
            args: full_args,
            stdout,
            stderr,
            success: status.success(),
        })
    }
}
