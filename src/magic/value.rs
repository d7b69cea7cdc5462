//! Parsing of `<match>` attribute values into raw bytes.
//!
//! Every rule is normalized to a byte pattern (plus optional byte mask) at
//! load time, so matching never needs to know the declared type.

use phf::phf_map;

/// Declared type of a `<match>` element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchKind {
    String,
    Byte,
    Big16,
    Big32,
    Little16,
    Little32,
    Host16,
    Host32,
}

static MATCH_KINDS: phf::Map<&'static str, MatchKind> = phf_map! {
    "string" => MatchKind::String,
    "byte" => MatchKind::Byte,
    "big16" => MatchKind::Big16,
    "big32" => MatchKind::Big32,
    "little16" => MatchKind::Little16,
    "little32" => MatchKind::Little32,
    "host16" => MatchKind::Host16,
    "host32" => MatchKind::Host32,
};

impl MatchKind {
    /// Look up a `type="..."` keyword. Returns `None` for unsupported kinds
    /// such as `regex`.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        MATCH_KINDS.get(keyword).copied()
    }

    /// Byte width of numeric kinds; `None` for strings.
    pub const fn width(&self) -> Option<usize> {
        match self {
            MatchKind::String => None,
            MatchKind::Byte => Some(1),
            MatchKind::Big16 | MatchKind::Little16 | MatchKind::Host16 => Some(2),
            MatchKind::Big32 | MatchKind::Little32 | MatchKind::Host32 => Some(4),
        }
    }

    /// Encode a numeric value in this kind's width and byte order.
    fn encode(&self, number: u32) -> Vec<u8> {
        match self {
            MatchKind::String | MatchKind::Byte => vec![number as u8],
            MatchKind::Big16 => (number as u16).to_be_bytes().to_vec(),
            MatchKind::Little16 => (number as u16).to_le_bytes().to_vec(),
            MatchKind::Host16 => (number as u16).to_ne_bytes().to_vec(),
            MatchKind::Big32 => number.to_be_bytes().to_vec(),
            MatchKind::Little32 => number.to_le_bytes().to_vec(),
            MatchKind::Host32 => number.to_ne_bytes().to_vec(),
        }
    }

    /// Turn a `value="..."` attribute into the bytes to look for.
    pub fn parse_value(&self, value: &str) -> Option<Vec<u8>> {
        match self {
            MatchKind::String => {
                let bytes = unescape_string_value(value);
                (!bytes.is_empty()).then_some(bytes)
            },
            _ => parse_c_uint(value).map(|n| self.encode(n)),
        }
    }

    /// Turn a `mask="..."` attribute into a byte mask of `len` bytes.
    pub fn parse_mask(&self, mask: &str, len: usize) -> Option<Vec<u8>> {
        let bytes = match self {
            MatchKind::String => parse_hex_bytes(mask)?,
            _ => self.encode(parse_c_uint(mask)?),
        };
        (bytes.len() == len).then_some(bytes)
    }
}

/// Parse an unsigned integer with C-style base detection: `0x` hex, leading
/// `0` octal, otherwise decimal.
///
/// # Examples
///
/// ```
/// use mimekit::magic::value::parse_c_uint;
/// assert_eq!(parse_c_uint("0x1F"), Some(31));
/// assert_eq!(parse_c_uint("017"), Some(15));
/// assert_eq!(parse_c_uint("42"), Some(42));
/// assert_eq!(parse_c_uint("0"), Some(0));
/// assert_eq!(parse_c_uint("zz"), None);
/// ```
pub fn parse_c_uint(s: &str) -> Option<u32> {
    let s = s.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if s.len() > 1 && s.starts_with('0') {
        u32::from_str_radix(&s[1..], 8).ok()
    } else {
        s.parse().ok()
    }
}

/// Parse an `offset="start[:end]"` attribute into an inclusive range.
///
/// ```
/// use mimekit::magic::value::parse_offset;
/// assert_eq!(parse_offset("4"), Some((4, 4)));
/// assert_eq!(parse_offset("0:256"), Some((0, 256)));
/// assert_eq!(parse_offset("8:2"), None);
/// ```
pub fn parse_offset(s: &str) -> Option<(u32, u32)> {
    let (start, end) = match s.split_once(':') {
        Some((start, end)) => (start.trim().parse().ok()?, end.trim().parse().ok()?),
        None => {
            let start = s.trim().parse().ok()?;
            (start, start)
        },
    };
    (start <= end).then_some((start, end))
}

/// Decode a `0x`-prefixed hex string into bytes.
fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok())
        .collect()
}

/// Expand the escape sequences allowed in string match values: `\xHH`,
/// octal `\ooo`, `\n`, `\r`, `\t`, and `\c` for any other literal `c`.
///
/// # Examples
///
/// ```
/// use mimekit::magic::value::unescape_string_value;
/// assert_eq!(unescape_string_value("%PDF-"), b"%PDF-");
/// assert_eq!(unescape_string_value("\\x89PNG"), b"\x89PNG");
/// assert_eq!(unescape_string_value("\\177ELF"), b"\x7fELF");
/// assert_eq!(unescape_string_value("a\\\\b\\n"), b"a\\b\n");
/// ```
pub fn unescape_string_value(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b != b'\\' || i >= bytes.len() {
            out.push(b);
            continue;
        }

        let esc = bytes[i];
        i += 1;
        match esc {
            b'x' => {
                let mut value = 0u8;
                let mut digits = 0;
                while digits < 2
                    && let Some(d) = bytes.get(i).and_then(|c| (*c as char).to_digit(16))
                {
                    value = (value << 4) | d as u8;
                    i += 1;
                    digits += 1;
                }
                out.push(value);
            },
            b'0'..=b'7' => {
                let mut value = u32::from(esc - b'0');
                let mut digits = 1;
                while digits < 3
                    && let Some(&c) = bytes.get(i)
                    && (b'0'..=b'7').contains(&c)
                    && value * 8 + u32::from(c - b'0') <= 0xFF
                {
                    value = value * 8 + u32::from(c - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push(value as u8);
            },
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_encodings() {
        assert_eq!(MatchKind::Big16.parse_value("0xCAFE"), Some(vec![0xCA, 0xFE]));
        assert_eq!(MatchKind::Little16.parse_value("0xCAFE"), Some(vec![0xFE, 0xCA]));
        assert_eq!(
            MatchKind::Big32.parse_value("0x7f454c46"),
            Some(b"\x7fELF".to_vec())
        );
        assert_eq!(
            MatchKind::Little32.parse_value("0x04034b50"),
            Some(b"PK\x03\x04".to_vec())
        );
        assert_eq!(MatchKind::Byte.parse_value("0x1f"), Some(vec![0x1F]));
        assert_eq!(
            MatchKind::Host16.parse_value("1"),
            Some(1u16.to_ne_bytes().to_vec())
        );
        assert_eq!(MatchKind::Big16.parse_value("nope"), None);
    }

    #[test]
    fn test_masks() {
        assert_eq!(
            MatchKind::String.parse_mask("0xFF00FF", 3),
            Some(vec![0xFF, 0x00, 0xFF])
        );
        assert_eq!(MatchKind::String.parse_mask("0xFF00", 3), None);
        assert_eq!(MatchKind::String.parse_mask("FF00FF", 3), None);
        assert_eq!(MatchKind::Big16.parse_mask("0xFFF0", 2), Some(vec![0xFF, 0xF0]));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(MatchKind::from_keyword("little32"), Some(MatchKind::Little32));
        assert_eq!(MatchKind::from_keyword("regex"), None);
        assert_eq!(MatchKind::Host32.width(), Some(4));
        assert_eq!(MatchKind::String.width(), None);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(unescape_string_value("\\x1f\\x8b"), vec![0x1F, 0x8B]);
        assert_eq!(unescape_string_value("\\0\\0"), vec![0, 0]);
        assert_eq!(unescape_string_value("\\377"), vec![0xFF]);
        // A fourth octal digit (or one that would overflow) is literal text.
        assert_eq!(unescape_string_value("\\1234"), vec![0o123, b'4']);
        assert_eq!(unescape_string_value("\\477"), vec![0o47, b'7']);
        assert_eq!(unescape_string_value("trailing\\"), b"trailing\\".to_vec());
        assert_eq!(MatchKind::String.parse_value(""), None);
    }
}
