//! firmkit - library discovery for embedded firmware sketches
//!
//! Given a sketch, firmkit works out which libraries must be placed on the
//! compiler's include path by repeatedly running the preprocessor, reading
//! its "missing header" diagnostics and pulling in the library that provides
//! each header. An on-disk cache lets unchanged files skip the preprocessor
//! on later builds.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Discovery logic: sources, cache, detector, resolver, engine
//! - [`infra`] - Infrastructure layer (filesystem, depfiles, processes)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
