//! The plain-text heuristic.
//!
//! Content sniffing falls back to `text/plain` when no magic rule matched but
//! the leading bytes look like text.

/// UTF-16 little-endian BOM bytes.
pub const UTF16_LE_BOM: [u8; 2] = [0xFF, 0xFE];
/// UTF-16 big-endian BOM bytes.
pub const UTF16_BE_BOM: [u8; 2] = [0xFE, 0xFF];
/// Number of leading bytes inspected by [`looks_like_text`].
pub const TEXT_SAMPLE_LEN: usize = 32;

/// Plain-text heuristic used when no magic rule matched.
///
/// True when the data starts with a UTF-16 byte order mark, or when none of
/// the first 32 bytes is a control character other than tab, LF or CR.
///
/// # Examples
///
/// ```
/// use mimekit::common::bom::looks_like_text;
/// assert!(looks_like_text(b"hello world\n"));
/// assert!(looks_like_text(&[0xFF, 0xFE, 0x00, 0x00]));
/// assert!(!looks_like_text(&[0u8; 40]));
/// ```
pub fn looks_like_text(data: &[u8]) -> bool {
    if data.starts_with(&UTF16_BE_BOM) || data.starts_with(&UTF16_LE_BOM) {
        return true;
    }

    data.iter()
        .take(TEXT_SAMPLE_LEN)
        .all(|&b| b >= 0x20 || b == b'\t' || b == b'\n' || b == b'\r')
}
