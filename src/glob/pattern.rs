//! A single weighted filename pattern and the shell-style matcher behind it.

use bitflags::bitflags;

/// Weight given to patterns that do not declare one (or declare 0).
pub const DEFAULT_WEIGHT: u32 = 50;

bitflags! {
    /// Flag bits packed above the 8-bit weight in cache glob records.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GlobFlags: u32 {
        /// Pattern must be matched without case folding.
        const CASE_SENSITIVE = 0x100;
    }
}

/// Pack a weight and case-sensitivity flag into a cache `flagsAndWeight` word.
#[inline]
pub fn pack_flags_and_weight(weight: u32, case_sensitive: bool) -> u32 {
    let mut flags = GlobFlags::empty();
    flags.set(GlobFlags::CASE_SENSITIVE, case_sensitive);
    flags.bits() | (weight & 0xFF)
}

/// Split a cache `flagsAndWeight` word into weight and case sensitivity.
#[inline]
pub fn unpack_flags_and_weight(word: u32) -> (u32, bool) {
    let flags = GlobFlags::from_bits_truncate(word);
    (word & 0xFF, flags.contains(GlobFlags::CASE_SENSITIVE))
}

/// Whether a pattern contains any glob metacharacter.
#[inline]
pub fn has_wildcards(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// A filename pattern owned by one MIME type.
///
/// Case-insensitive patterns are stored lower-cased; the file name is folded
/// the same way before matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    pattern: String,
    mime_type: String,
    weight: u32,
    case_sensitive: bool,
}

impl GlobPattern {
    /// Create a pattern. A weight of 0 is normalized to [`DEFAULT_WEIGHT`];
    /// any other weight is clamped to 1..=100.
    pub fn new(
        pattern: impl Into<String>,
        mime_type: impl Into<String>,
        weight: u32,
        case_sensitive: bool,
    ) -> Self {
        let pattern = pattern.into();
        Self {
            pattern: if case_sensitive {
                pattern
            } else {
                pattern.to_lowercase()
            },
            mime_type: mime_type.into(),
            weight: if weight == 0 { DEFAULT_WEIGHT } else { weight.min(100) },
            case_sensitive,
        }
    }

    #[inline]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    #[inline]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.weight
    }

    #[inline]
    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// `*.ext` with weight 50, case-insensitive and no other metacharacter:
    /// the shape that goes into the extension hash.
    pub fn is_fast_pattern(&self) -> bool {
        self.weight == DEFAULT_WEIGHT
            && !self.case_sensitive
            && self.pattern.rfind('*') == Some(0)
            && self.pattern.rfind('.') == Some(1)
            && !self.pattern.contains(['?', '['])
    }

    /// Match a file name (final path component) against this pattern.
    pub fn matches(&self, file_name: &str) -> bool {
        if self.case_sensitive {
            match_file_name(&self.pattern, file_name)
        } else {
            match_file_name(&self.pattern, &file_name.to_lowercase())
        }
    }
}

/// Match `name` against a shell-style `pattern` with no case folding.
///
/// Suffix (`*.txt`), prefix (`README*`), substring (`*lit*`) and literal
/// patterns take a direct comparison; everything else goes through
/// [`wildcard_match`].
pub fn match_file_name(pattern: &str, name: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }

    let star_count = pattern.matches('*').count();
    let has_class_or_any = pattern.contains(['?', '[']);

    if !has_class_or_any {
        // "*.txt", "*~"
        if star_count == 1 && pattern.starts_with('*') {
            return name.ends_with(&pattern[1..]);
        }
        if pattern.len() > 1 && pattern.ends_with('*') {
            let body = &pattern[..pattern.len() - 1];
            // "README*"
            if star_count == 1 {
                return name.starts_with(body);
            }
            // "*lit*"
            if star_count == 2 && body.starts_with('*') {
                return memchr::memmem::find(name.as_bytes(), &body.as_bytes()[1..]).is_some();
            }
        }
        // "Makefile"
        if star_count == 0 {
            return pattern == name;
        }
    }

    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    wildcard_match(&pattern, &name)
}

/// Full shell wildcard matching over the whole string.
///
/// `*` matches any run of characters (including `/`), `?` any single
/// character, `[...]` a character class with ranges and `!`/`^` negation,
/// and `\` escapes the next character. An unterminated `[` is literal.
pub fn wildcard_match(pattern: &[char], name: &[char]) -> bool {
    let (mut p, mut n) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, n));
            p += 1;
            continue;
        }
        if p < pattern.len()
            && let Some(next) = match_token(pattern, p, name[n])
        {
            p = next;
            n += 1;
            continue;
        }
        match star {
            Some((star_p, star_n)) => {
                p = star_p + 1;
                n = star_n + 1;
                star = Some((star_p, star_n + 1));
            },
            None => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match a single non-star token at `pattern[p]` against `ch`, returning the
/// index after the token on success.
fn match_token(pattern: &[char], p: usize, ch: char) -> Option<usize> {
    match pattern[p] {
        '?' => Some(p + 1),
        '[' => match match_class(pattern, p, ch) {
            Some((true, next)) => Some(next),
            Some((false, _)) => None,
            None => (ch == '[').then_some(p + 1),
        },
        '\\' if p + 1 < pattern.len() => (pattern[p + 1] == ch).then_some(p + 2),
        c => (c == ch).then_some(p + 1),
    }
}

/// Evaluate the character class starting at `pattern[open]`.
///
/// Returns `(matched, index_after_class)`, or `None` if the class is not
/// terminated.
fn match_class(pattern: &[char], open: usize, ch: char) -> Option<(bool, usize)> {
    let mut i = open + 1;
    let negated = matches!(pattern.get(i), Some('!') | Some('^'));
    if negated {
        i += 1;
    }

    let mut matched = false;
    let mut first = true;
    loop {
        let c = *pattern.get(i)?;
        if c == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;

        if pattern.get(i + 1) == Some(&'-')
            && let Some(&hi) = pattern.get(i + 2)
            && hi != ']'
        {
            if c <= ch && ch <= hi {
                matched = true;
            }
            i += 3;
        } else {
            if c == ch {
                matched = true;
            }
            i += 1;
        }
    }
}
