//! The public query surface.
//!
//! A [`Database`] owns one provider, chosen on first use: the binary cache
//! when a valid `mime.cache` exists, otherwise the XML definitions. Every
//! query takes the database lock once, lets the provider re-validate its
//! files if the recheck interval has passed, and runs to completion under
//! the lock, so no query ever sees a half-reloaded table.
//!
//! Queries never fail. Unknown names give an invalid [`MimeType`];
//! unclassifiable input gives `application/octet-stream`.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::common::bom::looks_like_text;
use crate::config::DatabaseOptions;
use crate::glob::GlobMatchResult;
use crate::graph::{all_ancestors, fallback_parent, inherits};
use crate::magic::MAX_PEEK;
use crate::mime_type::{MimeType, MimeTypeDetails};
use crate::provider::{BinaryCacheProvider, Provider, ProviderKind, XmlProvider};


/// Result of any classification that finds nothing better.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
const ZERO_SIZE: &str = "application/x-zerosize";
const TEXT_PLAIN: &str = "text/plain";
const DIRECTORY: &str = "inode/directory";

/// Types classification can return on its own; they are always valid.
const CORE_TYPES: [&str; 8] = [
    DEFAULT_MIME_TYPE,
    ZERO_SIZE,
    TEXT_PLAIN,
    DIRECTORY,
    "inode/chardevice",
    "inode/blockdevice",
    "inode/fifo",
    "inode/socket",
];

/// Accuracy of a filename match that content did not contradict.
const ACCURACY_CERTAIN: u32 = 100;
/// Accuracy of an ambiguous filename match with no content to settle it.
const ACCURACY_AMBIGUOUS_NAME: u32 = 20;
/// Accuracy of the plain-text heuristic.
const ACCURACY_TEXT_GUESS: u32 = 5;

/// Which evidence [`Database::mime_type_for_file`] looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    /// File name first, content to disambiguate.
    #[default]
    Default,
    /// File name only.
    Extension,
    /// Content only.
    Content,
}

/// A classification and how sure it is (0–100).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub mime_type: MimeType,
    pub accuracy: u32,
}

struct State {
    provider: Option<Box<dyn Provider>>,
}

/// State shared between a [`Database`] and the [`MimeType`]s it hands out.
pub(crate) struct Shared {
    options: DatabaseOptions,
    state: Mutex<State>,
}

impl Shared {
    /// Run `f` against the active provider, choosing or re-validating it
    /// first.
    fn with_provider<R>(&self, f: impl FnOnce(&mut dyn Provider) -> R) -> R {
        let mut state = self.state.lock();
        let provider = match state.provider.take() {
            Some(mut provider) => {
                provider.recheck(Instant::now());
                if provider.is_valid() {
                    provider
                } else {
                    debug!("binary caches are gone, switching to XML definitions");
                    self.xml_provider()
                }
            },
            None => self.select_provider(),
        };
        let provider = state.provider.insert(provider);
        f(provider.as_mut())
    }

    fn select_provider(&self) -> Box<dyn Provider> {
        if self.options.binary_cache {
            let binary = BinaryCacheProvider::new(
                self.options.directories.clone(),
                self.options.recheck_interval,
            );
            if binary.is_valid() {
                debug!(caches = ?binary.cache_paths(), "using binary cache provider");
                return Box::new(binary);
            }
            debug!("no usable mime.cache, using XML definitions");
        }
        self.xml_provider()
    }

    fn xml_provider(&self) -> Box<dyn Provider> {
        Box::new(XmlProvider::new(
            self.options.directories.clone(),
            self.options.recheck_interval,
            self.options.builtin_fallback,
        ))
    }

    pub(crate) fn locales(&self) -> &[String] {
        &self.options.locales
    }

    pub(crate) fn details(&self, name: &str) -> MimeTypeDetails {
        self.with_provider(|p| p.details(name))
    }

    pub(crate) fn parents(&self, name: &str) -> Vec<String> {
        self.with_provider(|p| parents_of(p, &resolve(p, name)))
    }

    pub(crate) fn all_ancestors(&self, name: &str) -> Vec<String> {
        self.with_provider(|p| {
            let p: &dyn Provider = p;
            all_ancestors(&resolve(p, name), |n| parents_of(p, n))
        })
    }

    pub(crate) fn aliases(&self, name: &str) -> Vec<String> {
        self.with_provider(|p| p.aliases(&resolve(p, name)))
    }

    pub(crate) fn inherits(&self, name: &str, ancestor: &str) -> bool {
        self.with_provider(|p| {
            let p: &dyn Provider = p;
            let ancestor = resolve(p, ancestor);
            inherits(&resolve(p, name), &ancestor, |n| parents_of(p, n))
        })
    }
}

/// Canonical spelling of `name`.
fn resolve(p: &dyn Provider, name: &str) -> String {
    p.resolve_alias(name).unwrap_or_else(|| name.to_string())
}

/// Direct parents with the fallback rule applied and aliases resolved.
fn parents_of(p: &dyn Provider, name: &str) -> Vec<String> {
    let explicit = p.parents(name);
    if explicit.is_empty() {
        return fallback_parent(name).map(str::to_string).into_iter().collect();
    }
    explicit.iter().map(|parent| resolve(p, parent)).collect()
}

/// The final path component; `a/b/c.txt` → `c.txt`.
fn base_name(file_name: &str) -> &str {
    Path::new(file_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(file_name)
}

/// Glob candidates for a file name, sorted.
fn name_candidates(p: &dyn Provider, file_name: &str) -> (Vec<String>, GlobMatchResult) {
    let mut result = GlobMatchResult::new();
    p.add_file_name_matches(base_name(file_name), &mut result);
    let mut candidates = result.matches().to_vec();
    candidates.sort();
    (candidates, result)
}

fn match_name(p: &dyn Provider, file_name: &str) -> (String, u32) {
    if file_name.ends_with('/') {
        return (DIRECTORY.to_string(), ACCURACY_CERTAIN);
    }
    let (candidates, _) = name_candidates(p, file_name);
    match candidates.len() {
        0 => (DEFAULT_MIME_TYPE.to_string(), 0),
        1 => (candidates[0].clone(), ACCURACY_CERTAIN),
        _ => (candidates[0].clone(), ACCURACY_AMBIGUOUS_NAME),
    }
}

fn match_data(p: &dyn Provider, data: &[u8]) -> (String, u32) {
    if data.is_empty() {
        return (ZERO_SIZE.to_string(), ACCURACY_CERTAIN);
    }
    let data = &data[..data.len().min(MAX_PEEK)];
    if let Some((name, priority)) = p.find_by_magic(data)
        && priority > 0
    {
        return (name, priority);
    }
    if looks_like_text(data) {
        return (TEXT_PLAIN.to_string(), ACCURACY_TEXT_GUESS);
    }
    (DEFAULT_MIME_TYPE.to_string(), 0)
}

fn match_name_and_data(p: &dyn Provider, file_name: &str, data: &[u8]) -> (String, u32) {
    if file_name.ends_with('/') {
        return (DIRECTORY.to_string(), ACCURACY_CERTAIN);
    }
    let (candidates, _) = name_candidates(p, file_name);
    if candidates.len() == 1 {
        return (candidates[0].clone(), ACCURACY_CERTAIN);
    }

    let (sniffed, accuracy) = match_data(p, data);
    if accuracy > 0 {
        let sniffed = resolve(p, &sniffed);
        // A more specific name match that agrees with the content wins.
        if let Some(candidate) = candidates
            .iter()
            .find(|c| inherits(c, &sniffed, |n| parents_of(p, n)))
        {
            return (candidate.clone(), ACCURACY_CERTAIN);
        }
        return (sniffed, accuracy);
    }

    match candidates.into_iter().next() {
        Some(first) => (first, ACCURACY_AMBIGUOUS_NAME),
        None => (DEFAULT_MIME_TYPE.to_string(), 0),
    }
}

/// Read up to [`MAX_PEEK`] bytes and seek back to where the reader was.
fn peek<R: Read + Seek>(reader: &mut R) -> Option<Vec<u8>> {
    let start = reader.stream_position().ok()?;
    let mut data = Vec::new();
    let read = reader.by_ref().take(MAX_PEEK as u64).read_to_end(&mut data);
    let rewound = reader.seek(SeekFrom::Start(start));
    match (read, rewound) {
        (Ok(_), Ok(_)) => Some(data),
        (Err(err), _) | (_, Err(err)) => {
            debug!(error = %err, "content not readable");
            None
        },
    }
}

/// Special file kinds that are classified without reading them.
#[cfg(unix)]
fn inode_type(file_type: &fs::FileType) -> Option<&'static str> {
    use std::os::unix::fs::FileTypeExt;

    if file_type.is_dir() {
        Some(DIRECTORY)
    } else if file_type.is_char_device() {
        Some("inode/chardevice")
    } else if file_type.is_block_device() {
        Some("inode/blockdevice")
    } else if file_type.is_fifo() {
        Some("inode/fifo")
    } else if file_type.is_socket() {
        Some("inode/socket")
    } else {
        None
    }
}

#[cfg(not(unix))]
fn inode_type(file_type: &fs::FileType) -> Option<&'static str> {
    file_type.is_dir().then_some(DIRECTORY)
}

/// A MIME type database.
///
/// Cheap to clone; clones share the provider and its lock.
///
/// # Examples
///
/// ```no_run
/// use mimekit::Database;
///
/// let db = Database::global();
/// let mime = db.mime_type_for_file_name_and_data("report.pdf", b"%PDF-1.7");
/// println!("{} ({})", mime.name(), mime.comment());
/// ```
#[derive(Clone)]
pub struct Database {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("options", &self.shared.options)
            .finish()
    }
}

static GLOBAL: Lazy<Database> = Lazy::new(Database::from_env);

impl Database {
    /// Create a database. Nothing is loaded until the first query.
    pub fn new(options: DatabaseOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(State { provider: None }),
            }),
        }
    }

    /// A database over the current user's XDG mime directories.
    pub fn from_env() -> Self {
        Self::new(DatabaseOptions::from_env())
    }

    /// The process-wide database, created from the environment on first use.
    pub fn global() -> &'static Database {
        &GLOBAL
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.shared.options
    }

    /// Which backend is answering queries.
    pub fn provider_kind(&self) -> ProviderKind {
        self.shared.with_provider(|p| p.kind())
    }

    fn mime_type(&self, name: impl Into<String>) -> MimeType {
        MimeType::new(name, Arc::downgrade(&self.shared))
    }

    fn classification(&self, (name, accuracy): (String, u32)) -> Classification {
        Classification {
            mime_type: self.mime_type(name),
            accuracy,
        }
    }

    /// Look a type up by name or alias.
    ///
    /// Names are matched exactly first, then ASCII-lowercased. Returns an
    /// invalid type for unknown names.
    pub fn mime_type_for_name(&self, name: &str) -> MimeType {
        let found = self.shared.with_provider(|p| {
            let canonical = resolve(p, name);
            if p.has_mime_type(&canonical) {
                return Some(canonical);
            }
            let lower = name.to_ascii_lowercase();
            if lower != name {
                let canonical = resolve(p, &lower);
                if p.has_mime_type(&canonical) {
                    return Some(canonical);
                }
            }
            CORE_TYPES.contains(&canonical.as_str()).then_some(canonical)
        });
        match found {
            Some(name) => self.mime_type(name),
            None => MimeType::invalid(),
        }
    }

    /// Every type whose glob patterns best match `file_name`, sorted by name.
    pub fn mime_types_for_file_name(&self, file_name: &str) -> Vec<MimeType> {
        let (candidates, _) = self.shared.with_provider(|p| name_candidates(p, file_name));
        candidates.into_iter().map(|name| self.mime_type(name)).collect()
    }

    /// Classify by file name only. Ambiguous matches resolve to the first
    /// candidate by name.
    pub fn mime_type_for_file_name(&self, file_name: &str) -> MimeType {
        self.classify(Some(file_name), None).mime_type
    }

    /// The extension the winning glob matched (`"tar.gz"` for
    /// `"x.tar.gz"`), or an empty string.
    pub fn suffix_for_file_name(&self, file_name: &str) -> String {
        let (_, result) = self.shared.with_provider(|p| name_candidates(p, file_name));
        result.found_suffix().unwrap_or_default().to_string()
    }

    /// Classify by content only.
    pub fn mime_type_for_data(&self, data: &[u8]) -> MimeType {
        self.classify(None, Some(data)).mime_type
    }

    /// Classify by the first 16 KiB of `reader`, leaving its position
    /// unchanged. Unreadable content gives the default type.
    pub fn mime_type_for_reader<R: Read + Seek>(&self, reader: &mut R) -> MimeType {
        match peek(reader) {
            Some(data) => self.mime_type_for_data(&data),
            None => self.mime_type(DEFAULT_MIME_TYPE),
        }
    }

    /// Classify by file name, using content to settle ambiguity.
    pub fn mime_type_for_file_name_and_data(&self, file_name: &str, data: &[u8]) -> MimeType {
        self.classify(Some(file_name), Some(data)).mime_type
    }

    /// Like [`mime_type_for_file_name_and_data`](Self::mime_type_for_file_name_and_data)
    /// with content peeked from `reader`. Unreadable content falls back to
    /// the file name alone.
    pub fn mime_type_for_file_name_and_reader<R: Read + Seek>(
        &self,
        file_name: &str,
        reader: &mut R,
    ) -> MimeType {
        let data = peek(reader);
        self.classify(Some(file_name), data.as_deref()).mime_type
    }

    /// Classify a file on disk.
    ///
    /// Directories and (on Unix) device nodes, FIFOs and sockets map to
    /// their `inode/*` types without being opened.
    pub fn mime_type_for_file(&self, path: impl AsRef<Path>, mode: MatchMode) -> MimeType {
        let path = path.as_ref();
        if let Ok(metadata) = fs::metadata(path)
            && let Some(inode) = inode_type(&metadata.file_type())
        {
            return self.mime_type(inode);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = || File::open(path).ok().and_then(|mut file| peek(&mut file));

        match mode {
            MatchMode::Extension => self.classify(Some(&name), None).mime_type,
            MatchMode::Content => match content() {
                Some(data) => self.classify(None, Some(&data)).mime_type,
                None => self.mime_type(DEFAULT_MIME_TYPE),
            },
            MatchMode::Default => {
                let data = content();
                self.classify(Some(&name), data.as_deref()).mime_type
            },
        }
    }

    /// Classify from a file name, content, both or neither.
    ///
    /// * name only: glob matching; ambiguity resolves to the first
    ///   candidate by name;
    /// * content only: magic, then the plain-text heuristic;
    /// * both: a single glob candidate wins outright; otherwise magic
    ///   decides, preferring a glob candidate that derives from the sniffed
    ///   type.
    pub fn classify(&self, file_name: Option<&str>, data: Option<&[u8]>) -> Classification {
        let result = self.shared.with_provider(|p| match (file_name, data) {
            (Some(name), Some(data)) => match_name_and_data(p, name, data),
            (Some(name), None) => match_name(p, name),
            (None, Some(data)) => match_data(p, data),
            (None, None) => (DEFAULT_MIME_TYPE.to_string(), 0),
        });
        self.classification(result)
    }

    /// Every known type, sorted by name.
    pub fn all_mime_types(&self) -> Vec<MimeType> {
        self.shared
            .with_provider(|p| p.all_names())
            .into_iter()
            .map(|name| self.mime_type(name))
            .collect()
    }

    /// Whether `name` is, or derives from, `ancestor`. Aliases are resolved.
    pub fn inherits(&self, name: &str, ancestor: &str) -> bool {
        self.shared.inherits(name, ancestor)
    }

    /// Direct parents of `name`, including the fallback parent.
    pub fn parents(&self, name: &str) -> Vec<String> {
        self.shared.parents(name)
    }

    /// All ancestors of `name`, nearest first.
    pub fn all_ancestors(&self, name: &str) -> Vec<String> {
        self.shared.all_ancestors(name)
    }

    /// Aliases of `name`, sorted.
    pub fn aliases(&self, name: &str) -> Vec<String> {
        self.shared.aliases(name)
    }
}
