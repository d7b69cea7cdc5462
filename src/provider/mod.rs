//! Data sources behind a [`Database`](crate::Database).
//!
//! Two backends answer the same questions: [`BinaryCacheProvider`] reads
//! memory-mapped `mime.cache` files, [`XmlProvider`] parses the package
//! definition files. Both feed filename hits through a
//! [`GlobMatchResult`] and rank magic by the same priority rule, so a
//! dataset expressible in both formats classifies identically.

mod binary;
mod xml;

use std::time::{Duration, Instant};

use crate::glob::GlobMatchResult;
use crate::mime_type::MimeTypeDetails;

pub use binary::BinaryCacheProvider;
pub(crate) use binary::detail_file;
pub use xml::XmlProvider;

/// Which backend a provider is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    BinaryCache,
    Xml,
}

/// Query surface shared by the two backends.
///
/// Name arguments are canonical (aliases already resolved) unless a method
/// says otherwise.
pub trait Provider: Send {
    fn kind(&self) -> ProviderKind;

    /// Whether the provider has usable data. A binary provider whose cache
    /// files have all disappeared becomes invalid.
    fn is_valid(&self) -> bool;

    /// Re-validate backing files if the recheck interval has elapsed.
    fn recheck(&mut self, now: Instant);

    fn has_mime_type(&mut self, name: &str) -> bool;

    /// Canonical name for `alias`, or `None` if it is not an alias.
    fn resolve_alias(&self, alias: &str) -> Option<String>;

    /// Feed every glob match for `file_name` into `result`.
    fn add_file_name_matches(&self, file_name: &str, result: &mut GlobMatchResult);

    /// Best magic match for `data` as (type, priority).
    fn find_by_magic(&self, data: &[u8]) -> Option<(String, u32)>;

    /// Explicitly declared parents, without the fallback rule.
    fn parents(&self, name: &str) -> Vec<String>;

    /// Aliases of `name`, sorted.
    fn aliases(&self, name: &str) -> Vec<String>;

    /// Every known type name, sorted.
    fn all_names(&mut self) -> Vec<String>;

    fn details(&self, name: &str) -> MimeTypeDetails;
}

/// Throttle shared by both providers: answers whether a check is due at
/// `now` and, if so, records it.
#[derive(Debug, Clone)]
pub(crate) struct RecheckTimer {
    interval: Duration,
    last: Option<Instant>,
}

impl RecheckTimer {
    pub(crate) fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last: Some(now),
        }
    }

    pub(crate) fn due(&mut self, now: Instant) -> bool {
        let due = self
            .last
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if due {
            self.last = Some(now);
        }
        due
    }
}
