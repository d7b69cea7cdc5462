//! Mimekit - MIME type classification over the shared MIME-info database
//!
//! This library answers "what kind of file is this?" from a file name, the
//! leading bytes of its content, or both, using the glob patterns, magic
//! rules and type hierarchy that freedesktop.org's shared-mime-info
//! database installs under `$XDG_DATA_DIRS/mime`.
//!
//! # Features
//!
//! - **Binary cache**: memory-mapped `mime.cache` files read through
//!   bounds-checked views; a corrupt or truncated cache never panics
//! - **XML fallback**: `packages/*.xml` definitions parsed when no usable
//!   cache exists, with a minimal built-in set when nothing is installed
//! - **Glob matching**: weights, case sensitivity and longest-pattern
//!   tie-breaking
//! - **Magic sniffing**: nested, masked, ranged match rules with priorities
//! - **Type hierarchy**: aliases, parents, ancestors and `inherits` queries
//! - **Live reload**: backing files are re-validated at most once per
//!   configurable interval, inline with queries
//! - **Cache compiler**: write `mime.cache`, `types` and per-type detail
//!   files from package definitions
//!
//! # Example - Classifying a file
//!
//! ```no_run
//! use mimekit::{Database, MatchMode};
//!
//! let db = Database::global();
//! let mime = db.mime_type_for_file("report.pdf", MatchMode::Default);
//! println!("{} - {}", mime.name(), mime.comment());
//!
//! for ancestor in mime.all_ancestors() {
//!     println!("  is also a {ancestor}");
//! }
//! ```
//!
//! # Example - Name and content together
//!
//! ```no_run
//! use mimekit::Database;
//!
//! let db = Database::global();
//! let found = db.classify(Some("archive.jar"), Some(b"PK\x03\x04"));
//! println!("{} (accuracy {})", found.mime_type, found.accuracy);
//! ```
//!
//! # Example - A private database
//!
//! ```no_run
//! use std::time::Duration;
//! use mimekit::{Database, DatabaseOptions};
//!
//! let db = Database::new(
//!     DatabaseOptions::new()
//!         .with_directories(["/opt/app/share/mime", "/usr/share/mime"])
//!         .with_recheck_interval(Duration::from_secs(60)),
//! );
//! assert!(db.mime_type_for_name("text/plain").is_valid());
//! ```
//!
//! # Example - Compiling a cache
//!
//! ```no_run
//! # fn main() -> mimekit::Result<()> {
//! let report = mimekit::compile_directory("/opt/app/share/mime")?;
//! println!("{} types, {} globs, {} magic rules", report.types, report.globs, report.magic);
//! # Ok(())
//! # }
//! ```

/// Binary `mime.cache` reading and writing
pub mod cache;

/// Shared infrastructure: errors, bounds-checked binary reads, the text
/// heuristic and XML escaping
pub mod common;

/// Cache compiler for a mime directory
pub mod compile;

/// Database options and XDG directory discovery
pub mod config;

/// The public query surface
pub mod database;

/// XML definition files and the merged definition registry
pub mod definitions;

/// Filename glob matching
pub mod glob;

/// Parent and alias relations
pub mod graph;

/// Content sniffing with magic rules
pub mod magic;

/// The MimeType value type
pub mod mime_type;

/// Data sources behind a database
pub mod provider;

// Re-export commonly used types for convenience
pub use common::{Error, Result};
pub use compile::{CompileReport, compile_directory};
pub use config::DatabaseOptions;
pub use database::{Classification, DEFAULT_MIME_TYPE, Database, MatchMode};
pub use mime_type::{MimeType, MimeTypeDetails};
pub use provider::ProviderKind;
