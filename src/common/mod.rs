//! Common types and utilities shared across the engine.
//!
//! This module provides the unified error type, bounds-checked binary
//! readers used by the cache reader, the text heuristic used by content
//! sniffing, and XML escaping helpers.

// Submodule declarations
pub mod binary;
pub mod bom;
pub mod error;
pub mod xml;

// Re-exports for convenience
pub use error::{Error, Result};
