//! Unified error types for mimekit.
//!
//! This module provides a single error type shared by the cache reader,
//! the definition parser and the cache compiler.

// Submodule declarations
pub mod conversions;
pub mod types;

// Re-exports
pub use types::{Error, Result};
