//! Aggregated glob patterns for filename matching.

use std::collections::HashMap;

use smallvec::SmallVec;

use super::pattern::{DEFAULT_WEIGHT, GlobPattern};
use super::result::GlobMatchResult;

/// All known glob patterns, split for fast lookup.
///
/// `*.ext` patterns with the default weight live in an extension hash; the
/// rest are kept in two lists ordered by descending weight: `> 50` and
/// `<= 50`.
#[derive(Debug, Clone, Default)]
pub struct GlobTable {
    fast: HashMap<String, SmallVec<[String; 2]>>,
    high_weight: Vec<GlobPattern>,
    low_weight: Vec<GlobPattern>,
}

impl GlobTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern. Identical (pattern, type) pairs are ignored.
    pub fn add(&mut self, glob: GlobPattern) {
        if glob.is_fast_pattern() {
            let extension = glob.pattern()[2..].to_string();
            let types = self.fast.entry(extension).or_default();
            if !types.iter().any(|t| t == glob.mime_type()) {
                types.push(glob.mime_type().to_string());
            }
            return;
        }

        let list = if glob.weight() > DEFAULT_WEIGHT {
            &mut self.high_weight
        } else {
            &mut self.low_weight
        };
        if list
            .iter()
            .any(|g| g.pattern() == glob.pattern() && g.mime_type() == glob.mime_type())
        {
            return;
        }
        let at = list.partition_point(|g| g.weight() >= glob.weight());
        list.insert(at, glob);
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.fast.values().map(|v| v.len()).sum::<usize>()
            + self.high_weight.len()
            + self.low_weight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evaluate `file_name` (a final path component) and feed every match
    /// into `result`.
    pub fn match_file_name(&self, file_name: &str, result: &mut GlobMatchResult) {
        for glob in &self.high_weight {
            if glob.matches(file_name) {
                result.add_match(glob.mime_type(), glob.weight(), glob.pattern());
            }
        }

        if result.is_empty()
            && let Some(dot) = file_name.rfind('.')
        {
            let extension = file_name[dot + 1..].to_lowercase();
            if let Some(types) = self.fast.get(&extension) {
                let pattern = format!("*.{extension}");
                for mime_type in types {
                    result.add_match(mime_type, DEFAULT_WEIGHT, &pattern);
                }
            }
        }

        // Always consulted: "*.tar.bz2" must be able to beat a "*.bz2" fast hit.
        for glob in &self.low_weight {
            if glob.matches(file_name) {
                result.add_match(glob.mime_type(), glob.weight(), glob.pattern());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(globs: &[(&str, &str, u32)]) -> GlobTable {
        let mut table = GlobTable::new();
        for &(pattern, mime, weight) in globs {
            table.add(GlobPattern::new(pattern, mime, weight, false));
        }
        table
    }

    fn lookup(table: &GlobTable, name: &str) -> Vec<String> {
        let mut result = GlobMatchResult::new();
        table.match_file_name(name, &mut result);
        result.into_matches()
    }

    #[test]
    fn test_single_extension() {
        let t = table(&[("*.txt", "text/plain", 50), ("*.png", "image/png", 50)]);
        assert_eq!(lookup(&t, "notes.TXT"), vec!["text/plain"]);
        assert_eq!(lookup(&t, "picture.png"), vec!["image/png"]);
        assert!(lookup(&t, "archive.zip").is_empty());
        assert!(lookup(&t, "noextension").is_empty());
    }

    #[test]
    fn test_low_weight_longer_pattern_beats_fast_path() {
        let t = table(&[
            ("*.bz2", "application/x-bzip", 50),
            ("*.tar.bz2", "application/x-bzip-compressed-tar", 50),
        ]);
        assert_eq!(lookup(&t, "x.tar.bz2"), vec!["application/x-bzip-compressed-tar"]);
        assert_eq!(lookup(&t, "x.bz2"), vec!["application/x-bzip"]);
    }

    #[test]
    fn test_high_weight_wins() {
        let t = table(&[("*.txt", "text/plain", 50), ("README*", "text/x-readme", 80)]);
        assert_eq!(lookup(&t, "README.txt"), vec!["text/x-readme"]);
        assert_eq!(lookup(&t, "other.txt"), vec!["text/plain"]);
    }

    #[test]
    fn test_duplicates_and_len() {
        let mut t = table(&[("*.txt", "text/plain", 50), ("*.txt", "text/plain", 50)]);
        t.add(GlobPattern::new("*~", "application/x-trash", 50, false));
        t.add(GlobPattern::new("*~", "application/x-trash", 50, false));
        t.add(GlobPattern::new("core", "application/x-core", 60, true));
        assert_eq!(t.len(), 3);
        assert!(!t.is_empty());
    }

    #[test]
    fn test_ambiguous_extension_keeps_all() {
        let t = table(&[("*.h", "text/x-chdr", 50), ("*.h", "text/x-c++hdr", 50)]);
        let mut found = lookup(&t, "a.h");
        found.sort();
        assert_eq!(found, vec!["text/x-c++hdr", "text/x-chdr"]);
    }

    #[test]
    fn test_low_weight_list_sorted() {
        let t = table(&[("a*", "x/a", 10), ("b*", "x/b", 40), ("c*", "x/c", 20)]);
        let weights: Vec<u32> = t.low_weight.iter().map(|g| g.weight()).collect();
        assert_eq!(weights, vec![40, 20, 10]);
    }
}
