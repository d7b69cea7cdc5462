//! Unified error type for the mimekit loaders.
//!
//! Queries against a [`Database`](crate::Database) never fail; these errors
//! surface only from the loaders (cache files, definition files, the cache
//! compiler) and are otherwise logged and swallowed by the providers.
use thiserror::Error;

use crate::common::binary::BinaryError;

/// Main error type for mimekit operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// XML parsing error in a definition file
    #[error("XML error: {0}")]
    Xml(String),

    /// A definition file parsed as XML but does not describe MIME types
    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    /// A cache file is structurally unusable
    #[error("Invalid cache: {0}")]
    InvalidCache(String),

    /// A cache file carries a version this engine does not read
    #[error("Unsupported cache version {major}.{minor}")]
    UnsupportedCacheVersion { major: u16, minor: u16 },

    /// Out-of-bounds or malformed read inside a cache file
    #[error("Binary error: {0}")]
    Binary(BinaryError),
}

/// Result type for mimekit operations.
pub type Result<T> = std::result::Result<T, Error>;
