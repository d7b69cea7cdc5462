//! Prioritized rule sets, one per MIME type.

use super::rule::MagicRule;

/// Priority given to `<magic>` blocks that do not declare one.
pub const DEFAULT_PRIORITY: u32 = 50;

/// All top-level magic rules of one `<magic>` block; the rules are OR'd.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicRuleMatcher {
    mime_type: String,
    priority: u32,
    rules: Vec<MagicRule>,
}

impl MagicRuleMatcher {
    /// Create an empty matcher. The priority is clamped to 1..=100.
    pub fn new(mime_type: impl Into<String>, priority: u32) -> Self {
        Self {
            mime_type: mime_type.into(),
            priority: priority.clamp(1, 100),
            rules: Vec::new(),
        }
    }

    #[inline]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[inline]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    #[inline]
    pub fn rules(&self) -> &[MagicRule] {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: MagicRule) {
        self.rules.push(rule);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        self.rules.iter().any(|rule| rule.matches(data))
    }

    /// Bytes of content needed to evaluate every rule.
    pub fn extent(&self) -> u32 {
        self.rules.iter().map(MagicRule::extent).max().unwrap_or(0)
    }
}

/// Scan `matchers` and return the matching type with the highest priority.
///
/// Ties keep the earliest match; the slice does not need to be sorted.
pub fn find_best_match<'a, I>(matchers: I, data: &[u8]) -> Option<(&'a str, u32)>
where
    I: IntoIterator<Item = &'a MagicRuleMatcher>,
{
    let mut best: Option<(&'a str, u32)> = None;
    for matcher in matchers {
        let better = best.is_none_or(|(_, priority)| matcher.priority() > priority);
        if better && matcher.matches(data) {
            best = Some((matcher.mime_type(), matcher.priority()));
        }
    }
    best
}
