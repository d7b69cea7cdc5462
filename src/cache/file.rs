//! A memory-mapped `mime.cache` file and a bounds-checked view over it.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use memmap2::Mmap;
use tracing::debug;
use zerocopy::{BE, FromBytes, U16, U32};
use zerocopy_derive::FromBytes as DeriveFromBytes;

use crate::common::binary::{BinaryResult, read_bytes, read_cstr, read_str, read_u32_be};
use crate::common::{Error, Result};

/// Size of the fixed header.
pub const HEADER_LEN: usize = 40;

/// On-disk header: format version followed by section offsets.
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    major: U16<BE>,
    minor: U16<BE>,
    alias_list: U32<BE>,
    parent_list: U32<BE>,
    literal_list: U32<BE>,
    reverse_suffix_tree: U32<BE>,
    glob_list: U32<BE>,
    magic_list: U32<BE>,
    namespace_list: U32<BE>,
    icons_list: U32<BE>,
    generic_icons_list: U32<BE>,
}

/// Decoded header of a cache file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    pub major: u16,
    pub minor: u16,
    pub alias_list: u32,
    pub parent_list: u32,
    pub literal_list: u32,
    pub reverse_suffix_tree: u32,
    pub glob_list: u32,
    pub magic_list: u32,
    pub namespace_list: u32,
    pub icons_list: u32,
    pub generic_icons_list: u32,
}

impl CacheHeader {
    /// Decode and version-check the first [`HEADER_LEN`] bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bytes = data.get(..HEADER_LEN).ok_or_else(|| {
            Error::InvalidCache(format!("{} bytes is too short for a header", data.len()))
        })?;
        let raw = RawHeader::read_from_bytes(bytes)
            .map_err(|_| Error::InvalidCache("unreadable header".to_string()))?;

        let (major, minor) = (raw.major.get(), raw.minor.get());
        if !is_supported_version(major, minor) {
            return Err(Error::UnsupportedCacheVersion { major, minor });
        }

        Ok(Self {
            major,
            minor,
            alias_list: raw.alias_list.get(),
            parent_list: raw.parent_list.get(),
            literal_list: raw.literal_list.get(),
            reverse_suffix_tree: raw.reverse_suffix_tree.get(),
            glob_list: raw.glob_list.get(),
            magic_list: raw.magic_list.get(),
            namespace_list: raw.namespace_list.get(),
            icons_list: raw.icons_list.get(),
            generic_icons_list: raw.generic_icons_list.get(),
        })
    }
}

/// Versions this reader understands: 1.1 and 1.2.
///
/// ```
/// use mimekit::cache::is_supported_version;
/// assert!(is_supported_version(1, 2));
/// assert!(!is_supported_version(1, 0));
/// assert!(!is_supported_version(1, 3));
/// assert!(!is_supported_version(2, 0));
/// ```
#[inline]
pub fn is_supported_version(major: u16, minor: u16) -> bool {
    major == 1 && (1..=2).contains(&minor)
}

/// Backing bytes of a cache file.
enum CacheStorage {
    Mmap(Mmap),
    Owned(Vec<u8>),
}

impl CacheStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            CacheStorage::Mmap(mmap) => &mmap[..],
            CacheStorage::Owned(data) => &data[..],
        }
    }
}

/// One validated cache file.
///
/// Remembers the modification time and length it was mapped with so the
/// provider can tell when the file on disk has been replaced.
pub struct CacheFile {
    path: PathBuf,
    storage: CacheStorage,
    header: CacheHeader,
    modified: Option<SystemTime>,
    len: u64,
}

impl std::fmt::Debug for CacheFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFile")
            .field("path", &self.path)
            .field("header", &self.header)
            .field("len", &self.len)
            .finish()
    }
}

impl CacheFile {
    /// Map and validate the cache at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        if (metadata.len() as usize) < HEADER_LEN {
            return Err(Error::InvalidCache(format!(
                "{}: {} bytes is too short for a header",
                path.display(),
                metadata.len()
            )));
        }

        // SAFETY: the mapping is read-only and every access goes through
        // bounds-checked readers. A file truncated behind our back is
        // detected by the next staleness check.
        let mmap = unsafe { Mmap::map(&file) }?;
        let header = CacheHeader::parse(&mmap)?;
        debug!(path = %path.display(), major = header.major, minor = header.minor, "mapped cache file");

        Ok(Self {
            path: path.to_path_buf(),
            storage: CacheStorage::Mmap(mmap),
            header,
            modified: metadata.modified().ok(),
            len: metadata.len(),
        })
    }

    /// Validate an in-memory cache image.
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Result<Self> {
        let header = CacheHeader::parse(&data)?;
        let len = data.len() as u64;
        Ok(Self {
            path: path.into(),
            storage: CacheStorage::Owned(data),
            header,
            modified: None,
            len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the file on disk no longer matches this mapping.
    ///
    /// Returns `None` when the file has disappeared or cannot be stat'ed.
    pub fn is_stale(&self) -> Option<bool> {
        let metadata = fs::metadata(&self.path).ok()?;
        Some(metadata.modified().ok() != self.modified || metadata.len() != self.len)
    }

    pub fn view(&self) -> CacheView<'_> {
        CacheView {
            data: self.storage.as_slice(),
            header: self.header,
        }
    }
}

/// Bounds-checked accessors over cache bytes.
#[derive(Debug, Clone, Copy)]
pub struct CacheView<'a> {
    data: &'a [u8],
    header: CacheHeader,
}

impl<'a> CacheView<'a> {
    pub fn new(data: &'a [u8], header: CacheHeader) -> Self {
        Self { data, header }
    }

    #[inline]
    pub fn header(&self) -> &CacheHeader {
        &self.header
    }

    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn u32_at(&self, offset: u32) -> BinaryResult<u32> {
        read_u32_be(self.data, offset as usize)
    }

    /// NUL-terminated bytes at `offset`, without the terminator.
    #[inline]
    pub fn cstr_at(&self, offset: u32) -> BinaryResult<&'a [u8]> {
        read_cstr(self.data, offset as usize)
    }

    /// NUL-terminated UTF-8 string at `offset`.
    #[inline]
    pub fn str_at(&self, offset: u32) -> BinaryResult<&'a str> {
        read_str(self.data, offset as usize)
    }

    #[inline]
    pub fn bytes_at(&self, offset: u32, len: u32) -> BinaryResult<&'a [u8]> {
        read_bytes(self.data, offset as usize, len as usize)
    }
}
