//! The binary `mime.cache` format.
//!
//! A cache file starts with a 40-byte header (format version, then the
//! offsets of nine sections) and is otherwise a set of fixed-stride tables
//! sorted for binary search. All integers are big-endian; all strings are
//! NUL-terminated and referenced by absolute offset.
//!
//! [`CacheFile`] maps and validates a file, [`CacheView`] reads it with
//! bounds checks on every access, and [`CacheWriter`] produces new images.

pub mod file;
pub mod lookup;
pub mod writer;

pub use file::{CacheFile, CacheHeader, CacheView, HEADER_LEN, is_supported_version};
pub use writer::{CacheWriter, MAJOR_VERSION, MINOR_VERSION};
