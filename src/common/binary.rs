//! Bounds-checked binary readers shared by the cache reader and writer.
//!
//! All numeric fields in a `mime.cache` file are big-endian regardless of the
//! host byte order, and every offset inside the file comes from the file
//! itself. Every read therefore checks the requested range against the
//! buffer length before touching it.

use thiserror::Error;
use zerocopy::{BE, FromBytes, U32};

/// Binary parsing error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BinaryError {
    /// Not enough data to read the requested type
    #[error("Out of bounds read: {len} bytes at offset {offset}, {available} available")]
    OutOfBounds {
        offset: usize,
        len: usize,
        available: usize,
    },
    /// A string runs to the end of the buffer without a NUL terminator
    #[error("Unterminated string at offset {offset}")]
    UnterminatedString { offset: usize },
    /// A string is not valid UTF-8
    #[error("Invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },
}

/// Result type for binary operations
pub type BinaryResult<T> = Result<T, BinaryError>;

#[inline]
fn slice_at(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(BinaryError::OutOfBounds {
            offset,
            len,
            available: data.len(),
        })
}

/// Read a big-endian u32 from a byte slice at the given offset.
///
/// # Examples
///
/// ```
/// use mimekit::common::binary::read_u32_be;
/// let data = [0x12, 0x34, 0x56, 0x78];
/// assert_eq!(read_u32_be(&data, 0).unwrap(), 0x12345678);
/// assert!(read_u32_be(&data, 1).is_err());
/// ```
#[inline]
pub fn read_u32_be(data: &[u8], offset: usize) -> BinaryResult<u32> {
    let bytes = slice_at(data, offset, 4)?;
    U32::<BE>::read_from_bytes(bytes)
        .map(|v| v.get())
        .map_err(|_| BinaryError::OutOfBounds {
            offset,
            len: 4,
            available: data.len(),
        })
}

/// Read `len` raw bytes starting at `offset`.
#[inline]
pub fn read_bytes(data: &[u8], offset: usize, len: usize) -> BinaryResult<&[u8]> {
    slice_at(data, offset, len)
}

/// Read a NUL-terminated byte string starting at `offset`, without the
/// terminator.
///
/// # Examples
///
/// ```
/// use mimekit::common::binary::read_cstr;
/// let data = b"text/plain\0image/png\0";
/// assert_eq!(read_cstr(data, 0).unwrap(), b"text/plain");
/// assert_eq!(read_cstr(data, 11).unwrap(), b"image/png");
/// ```
pub fn read_cstr(data: &[u8], offset: usize) -> BinaryResult<&[u8]> {
    let tail = data.get(offset..).ok_or(BinaryError::OutOfBounds {
        offset,
        len: 1,
        available: data.len(),
    })?;
    match memchr::memchr(0, tail) {
        Some(end) => Ok(&tail[..end]),
        None => Err(BinaryError::UnterminatedString { offset }),
    }
}

/// Read a NUL-terminated UTF-8 string starting at `offset`.
pub fn read_str(data: &[u8], offset: usize) -> BinaryResult<&str> {
    let bytes = read_cstr(data, offset)?;
    std::str::from_utf8(bytes).map_err(|_| BinaryError::InvalidUtf8 { offset })
}

/// Append a big-endian u32 to a buffer.
#[inline]
pub fn write_u32_be(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_be_bytes());
}

/// Overwrite a big-endian u32 previously reserved in a buffer.
///
/// Panics if `offset + 4` exceeds the buffer; callers only patch slots they
/// reserved themselves.
#[inline]
pub fn patch_u32_be(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_u32_be_overflowing_offset() {
        let data = [0u8; 8];
        assert!(matches!(
            read_u32_be(&data, usize::MAX - 1),
            Err(BinaryError::OutOfBounds { .. })
        ));
        assert!(read_u32_be(&data, 4).is_ok_and(|v| v == 0));
        assert!(read_u32_be(&data, 5).is_err());
    }

    #[test]
    fn test_read_cstr_unterminated() {
        let data = b"abc";
        assert_eq!(
            read_cstr(data, 0),
            Err(BinaryError::UnterminatedString { offset: 0 })
        );
        assert!(read_cstr(data, 10).is_err());
    }

    #[test]
    fn test_read_str_invalid_utf8() {
        let data = [0xFF, 0xFE, 0x00];
        assert_eq!(read_str(&data, 0), Err(BinaryError::InvalidUtf8 { offset: 0 }));
    }

    #[test]
    fn test_write_and_patch() {
        let mut out = Vec::new();
        write_u32_be(&mut out, 0);
        write_u32_be(&mut out, 7);
        patch_u32_be(&mut out, 0, 0xDEADBEEF);
        assert_eq!(read_u32_be(&out, 0).unwrap(), 0xDEADBEEF);
        assert_eq!(read_u32_be(&out, 4).unwrap(), 7);
    }
}
