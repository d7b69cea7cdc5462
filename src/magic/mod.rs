//! Content sniffing.
//!
//! Each [`MagicRuleMatcher`] holds the `<magic>` rules of one MIME type. A
//! [`MagicRule`] is a value (optionally masked) that must occur somewhere in
//! an offset range; nested rules refine their parent. Numeric match types
//! are converted to byte patterns when parsed, so matching is a plain
//! byte comparison for every kind.

pub mod matcher;
pub mod rule;
pub mod value;

pub use matcher::{DEFAULT_PRIORITY, MagicRuleMatcher, find_best_match};
pub use rule::{MagicRule, MagicRuleError, match_range};
pub use value::MatchKind;

/// Maximum number of leading content bytes consulted by sniffing.
pub const MAX_PEEK: usize = 16 * 1024;
