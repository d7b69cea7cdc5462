//! Accumulator resolving competing glob matches to a winning set.

use smallvec::SmallVec;

/// Collects glob matches for one file name.
///
/// Higher weight always wins; at equal weight the longer pattern wins; equal
/// weight and length ties are kept side by side.
#[derive(Debug, Clone, Default)]
pub struct GlobMatchResult {
    weight: u32,
    pattern_len: usize,
    matching: SmallVec<[String; 4]>,
    found_suffix: Option<String>,
}

impl GlobMatchResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a match of `mime_type` by `pattern` at `weight`.
    pub fn add_match(&mut self, mime_type: &str, weight: u32, pattern: &str) {
        if weight < self.weight {
            return;
        }

        let pattern_len = pattern.chars().count();
        let replace = if weight > self.weight {
            true
        } else if pattern_len < self.pattern_len {
            return;
        } else {
            pattern_len > self.pattern_len
        };

        if replace {
            self.matching.clear();
            self.found_suffix = None;
            self.weight = weight;
            self.pattern_len = pattern_len;
        }

        if self.matching.iter().any(|m| m == mime_type) {
            return;
        }
        self.matching.push(mime_type.to_string());

        if self.found_suffix.is_none()
            && let Some(suffix) = pattern.strip_prefix("*.")
        {
            self.found_suffix = Some(suffix.to_string());
        }
    }

    /// Winning MIME type names, in the order they were adopted.
    #[inline]
    pub fn matches(&self) -> &[String] {
        &self.matching
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.matching.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.matching.len()
    }

    /// Weight of the current winners (0 when nothing matched).
    #[inline]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Text after `*.` of the winning suffix pattern, if one won.
    #[inline]
    pub fn found_suffix(&self) -> Option<&str> {
        self.found_suffix.as_deref()
    }

    pub fn into_matches(self) -> Vec<String> {
        self.matching.into_vec()
    }
}
