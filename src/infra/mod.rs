//! Infrastructure layer
//!
//! Handles I/O operations: filesystem access and external processes.

pub mod depfile;
pub mod filesystem;
pub mod preprocessor;
