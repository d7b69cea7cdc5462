//! A single content-match rule and its nested sub-rules.

use thiserror::Error;

use super::value::{MatchKind, parse_offset};

/// Reasons a `<match>` element is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MagicRuleError {
    #[error("unsupported match type '{0}'")]
    UnsupportedType(String),
    #[error("invalid match value '{0}'")]
    InvalidValue(String),
    #[error("invalid match offset '{0}'")]
    InvalidOffset(String),
    #[error("mask '{0}' does not fit the match value")]
    InvalidMask(String),
}

/// Test whether `value` (optionally masked) occurs in `data` at some start
/// offset in `[range_start, range_start + range_len)`.
///
/// Offsets whose window would run past the end of `data` are not tried.
/// Shared by the in-memory rules and the cache reader.
pub fn match_range(
    data: &[u8],
    range_start: usize,
    range_len: usize,
    value: &[u8],
    mask: Option<&[u8]>,
) -> bool {
    let last = range_start.saturating_add(range_len);
    for offset in range_start..last {
        let Some(window) = offset
            .checked_add(value.len())
            .and_then(|end| data.get(offset..end))
        else {
            return false;
        };
        let hit = match mask {
            None => window == value,
            Some(mask) => window
                .iter()
                .zip(value)
                .zip(mask)
                .all(|((d, v), m)| d & m == v & m),
        };
        if hit {
            return true;
        }
    }
    false
}

/// A byte-range/value/mask test with optional children.
///
/// A rule matches when its value is found in range and, if it has children,
/// at least one child also matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicRule {
    kind: MatchKind,
    value: Vec<u8>,
    mask: Option<Vec<u8>>,
    start: u32,
    end: u32,
    children: Vec<MagicRule>,
}

impl MagicRule {
    /// Build a rule from `<match>` attribute values.
    pub fn parse(
        kind: &str,
        value: &str,
        offset: &str,
        mask: Option<&str>,
    ) -> Result<Self, MagicRuleError> {
        let kind = MatchKind::from_keyword(kind)
            .ok_or_else(|| MagicRuleError::UnsupportedType(kind.to_string()))?;
        let bytes = kind
            .parse_value(value)
            .ok_or_else(|| MagicRuleError::InvalidValue(value.to_string()))?;
        let (start, end) =
            parse_offset(offset).ok_or_else(|| MagicRuleError::InvalidOffset(offset.to_string()))?;
        let mask = match mask {
            Some(m) => Some(
                kind.parse_mask(m, bytes.len())
                    .ok_or_else(|| MagicRuleError::InvalidMask(m.to_string()))?,
            ),
            None => None,
        };
        Ok(Self::new(kind, bytes, mask, start, end))
    }

    /// Build a rule from already-decoded parts.
    pub fn new(kind: MatchKind, value: Vec<u8>, mask: Option<Vec<u8>>, start: u32, end: u32) -> Self {
        Self {
            kind,
            value,
            mask,
            start,
            end,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> MatchKind {
        self.kind
    }

    #[inline]
    pub fn value(&self) -> &[u8] {
        &self.value
    }

    #[inline]
    pub fn mask(&self) -> Option<&[u8]> {
        self.mask.as_deref()
    }

    /// First offset at which the value may start.
    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Last offset (inclusive) at which the value may start.
    #[inline]
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of candidate start offsets, saturating at `u32::MAX`.
    #[inline]
    pub fn range_len(&self) -> u32 {
        (self.end - self.start).saturating_add(1)
    }

    #[inline]
    pub fn children(&self) -> &[MagicRule] {
        &self.children
    }

    pub fn push_child(&mut self, child: MagicRule) {
        self.children.push(child);
    }

    /// Bytes of content needed to evaluate this rule and its subtree.
    pub fn extent(&self) -> u32 {
        let own = self.end.saturating_add(self.value.len() as u32);
        self.children.iter().map(Self::extent).fold(own, u32::max)
    }

    pub fn matches(&self, data: &[u8]) -> bool {
        if !match_range(
            data,
            self.start as usize,
            self.range_len() as usize,
            &self.value,
            self.mask(),
        ) {
            return false;
        }
        self.children.is_empty() || self.children.iter().any(|c| c.matches(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_range_scans_offsets() {
        let data = b"xxABCxx";
        assert!(match_range(data, 0, 3, b"ABC", None));
        assert!(!match_range(data, 0, 2, b"ABC", None));
        assert!(match_range(data, 2, 1, b"ABC", None));
        assert!(!match_range(data, 5, 10, b"ABC", None));
        assert!(!match_range(data, 100, 1, b"A", None));
    }

    #[test]
    fn test_match_range_masked() {
        let data = [0x12, 0x3F, 0x99];
        assert!(match_range(&data, 0, 1, &[0x12, 0x30], Some(&[0xFF, 0xF0])));
        assert!(!match_range(&data, 0, 1, &[0x12, 0x40], Some(&[0xFF, 0xF0])));
        assert!(match_range(&data, 0, 2, &[0x30, 0x90], Some(&[0xF0, 0xF0])));
    }

    #[test]
    fn test_parse_rejects_bad_rules() {
        assert_eq!(
            MagicRule::parse("regex", "a.*", "0", None),
            Err(MagicRuleError::UnsupportedType("regex".into()))
        );
        assert!(matches!(
            MagicRule::parse("big16", "x", "0", None),
            Err(MagicRuleError::InvalidValue(_))
        ));
        assert!(matches!(
            MagicRule::parse("string", "A", "3:1", None),
            Err(MagicRuleError::InvalidOffset(_))
        ));
        assert!(matches!(
            MagicRule::parse("string", "AB", "0", Some("0xFF")),
            Err(MagicRuleError::InvalidMask(_))
        ));
    }

    #[test]
    fn test_children_are_anded() {
        let mut parent = MagicRule::parse("string", "PK\\003\\004", "0", None).unwrap();
        parent.push_child(MagicRule::parse("string", "mimetype", "30", None).unwrap());
        parent.push_child(MagicRule::parse("string", "META-INF", "30", None).unwrap());

        let mut zip_only = b"PK\x03\x04".to_vec();
        zip_only.resize(64, 0);
        assert!(!parent.matches(&zip_only));

        let mut with_child = zip_only.clone();
        with_child[30..38].copy_from_slice(b"META-INF");
        assert!(parent.matches(&with_child));

        assert_eq!(parent.extent(), 38);
    }

    #[test]
    fn test_numeric_rule() {
        let rule = MagicRule::parse("big32", "0xCAFEBABE", "0:4", None).unwrap();
        assert!(rule.matches(&[0, 0, 0xCA, 0xFE, 0xBA, 0xBE]));
        assert!(!rule.matches(&[0xCA, 0xFE, 0xBA]));
        assert_eq!(rule.range_len(), 5);
    }

    #[test]
    fn test_range_reaching_u32_max() {
        let rule = MagicRule::parse("string", "A", "0:4294967295", None).unwrap();
        assert_eq!(rule.range_len(), u32::MAX);
        assert!(rule.matches(b"xxA"));
        assert!(!rule.matches(b"xyz"));

        let last = MagicRule::parse("string", "A", "4294967295", None).unwrap();
        assert_eq!(last.range_len(), 1);
        assert!(!last.matches(b"A"));
    }
}
