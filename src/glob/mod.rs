//! Filename matching.
//!
//! A [`GlobTable`] holds every registered [`GlobPattern`]; a lookup feeds
//! each hit into a [`GlobMatchResult`], which keeps only the strongest
//! matches (highest weight, then longest pattern).
//!
//! The binary cache provider does not use a `GlobTable` (its patterns live in
//! the cache file) but runs its candidates through the same matcher and
//! accumulator, so both backends rank matches identically.

pub mod pattern;
pub mod result;
pub mod table;

pub use pattern::{
    DEFAULT_WEIGHT, GlobFlags, GlobPattern, has_wildcards, match_file_name,
    pack_flags_and_weight, unpack_flags_and_weight,
};
pub use result::GlobMatchResult;
pub use table::GlobTable;
