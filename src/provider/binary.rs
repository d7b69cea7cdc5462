//! Provider backed by memory-mapped `mime.cache` files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{Provider, ProviderKind, RecheckTimer};
use crate::cache::CacheFile;
use crate::common::binary::BinaryResult;
use crate::definitions::load_definition_file;
use crate::glob::GlobMatchResult;
use crate::mime_type::MimeTypeDetails;

const CACHE_FILE: &str = "mime.cache";
const TYPES_FILE: &str = "types";

/// One mime directory's cache.
#[derive(Debug)]
struct CacheEntry {
    directory: PathBuf,
    cache: CacheFile,
}

/// Every `mime.cache` found under the configured directories, in
/// precedence order.
///
/// At most once per recheck interval each mapped file is re-stat'ed: a file
/// that vanished is dropped, one whose modification time or length changed
/// is re-mapped, and directories without a cache are checked for a new one.
#[derive(Debug)]
pub struct BinaryCacheProvider {
    directories: Vec<PathBuf>,
    caches: Vec<CacheEntry>,
    timer: RecheckTimer,
    /// Bumped whenever the set of mapped files changes.
    epoch: u64,
    names: Option<BTreeSet<String>>,
    names_epoch: u64,
}

impl BinaryCacheProvider {
    pub fn new(directories: Vec<PathBuf>, recheck_interval: Duration) -> Self {
        let mut provider = Self {
            directories,
            caches: Vec::new(),
            timer: RecheckTimer::new(recheck_interval, Instant::now()),
            epoch: 0,
            names: None,
            names_epoch: 0,
        };
        provider.rescan();
        provider
    }

    /// Paths of the currently mapped cache files.
    pub fn cache_paths(&self) -> Vec<&Path> {
        self.caches.iter().map(|c| c.cache.path()).collect()
    }

    fn rescan(&mut self) {
        let mut previous = std::mem::take(&mut self.caches);
        let mut changed = false;

        for directory in &self.directories {
            let path = directory.join(CACHE_FILE);
            let known = previous.iter().position(|c| c.directory == *directory);
            let entry = match known.map(|i| previous.swap_remove(i)) {
                Some(entry) => match entry.cache.is_stale() {
                    Some(false) => Some(entry),
                    Some(true) => {
                        debug!(path = %path.display(), "cache file changed, remapping");
                        changed = true;
                        open_cache(directory, &path)
                    },
                    None => {
                        debug!(path = %path.display(), "cache file disappeared, dropping");
                        changed = true;
                        None
                    },
                },
                None => {
                    let opened = path.exists().then(|| open_cache(directory, &path)).flatten();
                    changed |= opened.is_some();
                    opened
                },
            };
            self.caches.extend(entry);
        }

        changed |= !previous.is_empty();
        if changed {
            self.epoch += 1;
        }
    }

    /// Run `f` on each cache in precedence order until it returns `Some`.
    fn first_answer<'s, T>(
        &'s self,
        mut f: impl FnMut(&'s CacheFile) -> BinaryResult<Option<T>>,
    ) -> Option<T> {
        for entry in &self.caches {
            match f(&entry.cache) {
                Ok(Some(answer)) => return Some(answer),
                Ok(None) => {},
                Err(err) => trace!(path = %entry.cache.path().display(), error = %err, "cache read failed"),
            }
        }
        None
    }

    fn names(&mut self) -> &BTreeSet<String> {
        if self.names_epoch != self.epoch {
            self.names = None;
            self.names_epoch = self.epoch;
        }
        self.names.get_or_insert_with(|| collect_names(&self.caches))
    }
}

/// Names from each cache's `types` file, or harvested from the cache
/// tables when a directory has none.
fn collect_names(caches: &[CacheEntry]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();
    for entry in caches {
        match fs::read_to_string(entry.directory.join(TYPES_FILE)) {
            Ok(text) => names.extend(
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            ),
            Err(_) => match entry.cache.view().harvest_names() {
                Ok(found) => names.extend(found.into_iter().map(str::to_string)),
                Err(err) => trace!(error = %err, "harvesting names failed"),
            },
        }
    }
    names
}

fn open_cache(directory: &Path, path: &Path) -> Option<CacheEntry> {
    match CacheFile::open(path) {
        Ok(cache) => Some(CacheEntry {
            directory: directory.to_path_buf(),
            cache,
        }),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "rejecting cache file");
            None
        },
    }
}

/// `<dir>/<media>/<subtype>.xml` for a type name; `None` for names that
/// would leave `dir`.
pub(crate) fn detail_file(directory: &Path, name: &str) -> Option<PathBuf> {
    let (media, subtype) = name.split_once('/')?;
    if media.is_empty() || subtype.is_empty() || subtype.contains('/') || media.starts_with('.') {
        return None;
    }
    Some(directory.join(media).join(format!("{subtype}.xml")))
}

impl Provider for BinaryCacheProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BinaryCache
    }

    fn is_valid(&self) -> bool {
        !self.caches.is_empty()
    }

    fn recheck(&mut self, now: Instant) {
        if self.timer.due(now) {
            self.rescan();
        }
    }

    fn has_mime_type(&mut self, name: &str) -> bool {
        self.names().contains(name)
    }

    fn resolve_alias(&self, alias: &str) -> Option<String> {
        self.first_answer(|cache| cache.view().resolve_alias(alias))
            .map(str::to_string)
    }

    fn add_file_name_matches(&self, file_name: &str, result: &mut GlobMatchResult) {
        for entry in &self.caches {
            if let Err(err) = entry.cache.view().add_file_name_matches(file_name, result) {
                trace!(path = %entry.cache.path().display(), error = %err, "cache read failed");
            }
        }
    }

    fn find_by_magic(&self, data: &[u8]) -> Option<(String, u32)> {
        self.first_answer(|cache| cache.view().find_magic(data))
            .map(|(name, priority)| (name.to_string(), priority))
    }

    fn parents(&self, name: &str) -> Vec<String> {
        self.first_answer(|cache| {
            let parents = cache.view().parents(name)?;
            Ok((!parents.is_empty()).then_some(parents))
        })
        .map(|parents| parents.into_iter().map(str::to_string).collect())
        .unwrap_or_default()
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        let mut aliases = BTreeSet::new();
        for entry in &self.caches {
            match entry.cache.view().aliases_of(name) {
                Ok(found) => aliases.extend(found.into_iter().map(str::to_string)),
                Err(err) => trace!(error = %err, "cache read failed"),
            }
        }
        aliases.into_iter().collect()
    }

    fn all_names(&mut self) -> Vec<String> {
        self.names().iter().cloned().collect()
    }

    fn details(&self, name: &str) -> MimeTypeDetails {
        let mut details = self
            .caches
            .iter()
            .filter_map(|entry| detail_file(&entry.directory, name))
            .find(|path| path.is_file())
            .and_then(|path| match load_definition_file(&path) {
                Ok(definitions) => definitions.get(name).map(|t| t.details()),
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "skipping detail file");
                    None
                },
            })
            .unwrap_or_default();

        details.icon_name = self
            .first_answer(|cache| cache.view().icon(name))
            .map(str::to_string)
            .or(details.icon_name);
        details.generic_icon_name = self
            .first_answer(|cache| cache.view().generic_icon(name))
            .map(str::to_string)
            .or(details.generic_icon_name);
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheWriter;
    use crate::definitions::parse_definitions;

    fn write_cache(dir: &Path, xml: &str) {
        let defs = parse_definitions(xml).unwrap();
        CacheWriter::new(&defs).write_to(dir.join(CACHE_FILE)).unwrap();
    }

    const FOO: &str = r#"<mime-info>
        <mime-type type="text/x-foo">
          <alias type="text/foo"/>
          <icon name="foo-icon"/>
          <glob pattern="*.foo"/>
        </mime-type>
      </mime-info>"#;

    #[test]
    fn test_invalid_without_caches() {
        let dir = tempfile::tempdir().unwrap();
        let provider = BinaryCacheProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO);
        assert!(!provider.is_valid());
    }

    #[test]
    fn test_rejects_unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut image = vec![0u8; 40];
        image[1] = 1;
        image[3] = 3;
        fs::write(dir.path().join(CACHE_FILE), image).unwrap();
        let provider = BinaryCacheProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO);
        assert!(!provider.is_valid());
    }

    #[test]
    fn test_queries_and_harvested_names() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), FOO);
        let mut provider = BinaryCacheProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO);
        assert!(provider.is_valid());
        assert_eq!(provider.resolve_alias("text/foo").as_deref(), Some("text/x-foo"));
        assert_eq!(provider.aliases("text/x-foo"), ["text/foo"]);
        // No `types` file: names come from the cache tables.
        assert!(provider.has_mime_type("text/x-foo"));
        assert_eq!(provider.details("text/x-foo").icon_name.as_deref(), Some("foo-icon"));
    }

    #[test]
    fn test_types_file_and_detail_file() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), FOO);
        fs::write(dir.path().join(TYPES_FILE), "text/x-foo\ntext/x-listed\n").unwrap();
        fs::create_dir(dir.path().join("text")).unwrap();
        fs::write(
            dir.path().join("text").join("x-foo.xml"),
            r#"<mime-info><mime-type type="text/x-foo"><comment>Foo file</comment><glob pattern="*.foo"/></mime-type></mime-info>"#,
        )
        .unwrap();

        let mut provider = BinaryCacheProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO);
        assert_eq!(provider.all_names(), ["text/x-foo", "text/x-listed"]);
        let details = provider.details("text/x-foo");
        assert_eq!(details.comments.get(""), Some(&"Foo file".to_string()));
        assert_eq!(details.glob_patterns, ["*.foo"]);
        assert_eq!(details.icon_name.as_deref(), Some("foo-icon"));
    }

    #[test]
    fn test_reload_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        write_cache(dir.path(), FOO);
        let mut provider = BinaryCacheProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO);
        assert!(provider.has_mime_type("text/x-foo"));

        write_cache(
            dir.path(),
            r#"<mime-info><mime-type type="text/x-bar"><glob pattern="*.bar"/><glob pattern="*.barbar"/></mime-type></mime-info>"#,
        );
        provider.recheck(Instant::now());
        assert!(provider.has_mime_type("text/x-bar"));
        assert!(!provider.has_mime_type("text/x-foo"));

        fs::remove_file(dir.path().join(CACHE_FILE)).unwrap();
        provider.recheck(Instant::now());
        assert!(!provider.is_valid());
    }

    #[test]
    fn test_detail_file_paths() {
        let dir = Path::new("/usr/share/mime");
        assert_eq!(
            detail_file(dir, "image/png"),
            Some(PathBuf::from("/usr/share/mime/image/png.xml"))
        );
        assert_eq!(detail_file(dir, "nonsense"), None);
        assert_eq!(detail_file(dir, "../x"), None);
        assert_eq!(detail_file(dir, "a/b/c"), None);
    }
}
