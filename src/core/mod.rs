//! Core discovery logic
//!
//! Process spawning and raw filesystem access belong in [`crate::infra`].
//!
//! # Submodules
//!
//! - [`source_file`] - Source files and the scan queue
//! - [`include_cache`] - Replayable discovery journal
//! - [`detector`] - Missing-include detection
//! - [`diagnostics`] - GCC diagnostic parsing
//! - [`library`] - Library loading
//! - [`resolver`] - Header to library resolution
//! - [`validate`] - Post-discovery library checks
//! - [`discovery`] - The discovery engine
//! - [`project`] - Project configuration (firmkit.toml)

pub mod detector;
pub mod diagnostics;
pub mod discovery;
pub mod include_cache;
pub mod library;
pub mod project;
pub mod resolver;
pub mod source_file;
pub mod validate;
