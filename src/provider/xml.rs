//! Provider backed by parsed `packages/*.xml` definition files.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use tracing::debug;

use super::{Provider, ProviderKind, RecheckTimer};
use crate::definitions::{Definitions, builtin_definitions, load_files, package_files};
use crate::glob::{GlobMatchResult, GlobTable};
use crate::magic::{MagicRuleMatcher, find_best_match};
use crate::mime_type::MimeTypeDetails;

/// The discovered definition files and their modification times, lowest
/// precedence first.
type Fingerprint = Vec<(PathBuf, Option<SystemTime>)>;

/// In-memory definitions parsed from XML.
///
/// Re-parses everything when the set of discovered files (or any file's
/// modification time) changes.
#[derive(Debug)]
pub struct XmlProvider {
    directories: Vec<PathBuf>,
    builtin_fallback: bool,
    timer: RecheckTimer,
    fingerprint: Fingerprint,
    definitions: Definitions,
    globs: GlobTable,
    magic: Vec<MagicRuleMatcher>,
}

impl XmlProvider {
    /// Load the definitions under `directories` (highest precedence first).
    pub fn new(directories: Vec<PathBuf>, recheck_interval: Duration, builtin_fallback: bool) -> Self {
        let mut provider = Self {
            directories,
            builtin_fallback,
            timer: RecheckTimer::new(recheck_interval, Instant::now()),
            fingerprint: Vec::new(),
            definitions: Definitions::new(),
            globs: GlobTable::new(),
            magic: Vec::new(),
        };
        let fingerprint = provider.discover();
        provider.load(fingerprint);
        provider
    }

    /// Build directly from already-parsed definitions; never reloads.
    pub fn from_definitions(definitions: Definitions) -> Self {
        let mut provider = Self {
            directories: Vec::new(),
            builtin_fallback: false,
            timer: RecheckTimer::new(Duration::MAX, Instant::now()),
            fingerprint: Vec::new(),
            definitions: Definitions::new(),
            globs: GlobTable::new(),
            magic: Vec::new(),
        };
        provider.install(definitions);
        provider
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    fn discover(&self) -> Fingerprint {
        self.directories
            .iter()
            .rev()
            .flat_map(|dir| package_files(dir))
            .map(|path| {
                let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
                (path, modified)
            })
            .collect()
    }

    fn load(&mut self, fingerprint: Fingerprint) {
        let mut definitions = load_files(fingerprint.iter().map(|(path, _)| path.as_path()));
        if fingerprint.is_empty() && self.builtin_fallback {
            debug!("no definition files found, using built-in definitions");
            definitions = builtin_definitions();
        }
        debug!(files = fingerprint.len(), types = definitions.len(), "loaded XML definitions");
        self.fingerprint = fingerprint;
        self.install(definitions);
    }

    fn install(&mut self, definitions: Definitions) {
        self.globs = definitions.glob_table();
        self.magic = definitions.magic_matchers();
        self.definitions = definitions;
    }
}

impl Provider for XmlProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Xml
    }

    fn is_valid(&self) -> bool {
        true
    }

    fn recheck(&mut self, now: Instant) {
        if self.directories.is_empty() || !self.timer.due(now) {
            return;
        }
        let fingerprint = self.discover();
        if fingerprint != self.fingerprint {
            debug!("definition files changed, reloading");
            self.load(fingerprint);
        }
    }

    fn has_mime_type(&mut self, name: &str) -> bool {
        self.definitions.contains(name)
    }

    fn resolve_alias(&self, alias: &str) -> Option<String> {
        self.definitions.aliases().resolve(alias).map(str::to_string)
    }

    fn add_file_name_matches(&self, file_name: &str, result: &mut GlobMatchResult) {
        self.globs.match_file_name(file_name, result);
    }

    fn find_by_magic(&self, data: &[u8]) -> Option<(String, u32)> {
        find_best_match(&self.magic, data).map(|(name, priority)| (name.to_string(), priority))
    }

    fn parents(&self, name: &str) -> Vec<String> {
        self.definitions.parents().explicit_parents(name).to_vec()
    }

    fn aliases(&self, name: &str) -> Vec<String> {
        self.definitions.aliases().aliases_of(name)
    }

    fn all_names(&mut self) -> Vec<String> {
        self.definitions.names().map(str::to_string).collect()
    }

    fn details(&self, name: &str) -> MimeTypeDetails {
        self.definitions
            .get(name)
            .map(|t| t.details())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_package(dir: &std::path::Path, file: &str, body: &str) {
        let packages = dir.join("packages");
        fs::create_dir_all(&packages).unwrap();
        fs::write(packages.join(file), format!("<mime-info>{body}</mime-info>")).unwrap();
    }

    #[test]
    fn test_builtin_when_nothing_found() {
        let dir = tempfile::tempdir().unwrap();
        let mut provider = XmlProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO, true);
        assert!(provider.has_mime_type("text/plain"));
        assert!(provider.has_mime_type("application/octet-stream"));

        let mut bare = XmlProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO, false);
        assert!(bare.all_names().is_empty());
    }

    #[test]
    fn test_local_directory_overrides() {
        let local = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();
        write_package(
            system.path(),
            "freedesktop.org.xml",
            r#"<mime-type type="text/x-foo"><comment>Foo</comment><glob pattern="*.foo"/></mime-type>"#,
        );
        write_package(
            local.path(),
            "Override.xml",
            r#"<mime-type type="text/x-foo"><comment>Local foo</comment></mime-type>"#,
        );

        let provider = XmlProvider::new(
            vec![local.path().to_path_buf(), system.path().to_path_buf()],
            Duration::ZERO,
            true,
        );
        let details = provider.details("text/x-foo");
        assert_eq!(details.comments.get(""), Some(&"Local foo".to_string()));
        assert_eq!(details.glob_patterns, ["*.foo"]);
    }

    #[test]
    fn test_reload_on_new_file() {
        let dir = tempfile::tempdir().unwrap();
        write_package(dir.path(), "a.xml", r#"<mime-type type="text/x-a"/>"#);
        let mut provider = XmlProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO, true);
        assert!(!provider.has_mime_type("text/x-b"));

        write_package(dir.path(), "b.xml", r#"<mime-type type="text/x-b"/>"#);
        provider.recheck(Instant::now());
        assert!(provider.has_mime_type("text/x-b"));
        assert!(provider.has_mime_type("text/x-a"));
    }

    #[test]
    fn test_queries() {
        let dir = tempfile::tempdir().unwrap();
        write_package(
            dir.path(),
            "a.xml",
            r#"<mime-type type="application/x-thing">
                 <alias type="application/thing"/>
                 <sub-class-of type="text/plain"/>
                 <glob pattern="*.thing"/>
                 <magic><match type="string" value="THING" offset="0"/></magic>
               </mime-type>"#,
        );
        let provider = XmlProvider::new(vec![dir.path().to_path_buf()], Duration::ZERO, true);
        assert_eq!(provider.resolve_alias("application/thing").as_deref(), Some("application/x-thing"));
        assert_eq!(provider.aliases("application/x-thing"), ["application/thing"]);
        assert_eq!(provider.parents("application/x-thing"), ["text/plain"]);
        assert_eq!(
            provider.find_by_magic(b"THING!"),
            Some(("application/x-thing".to_string(), 50))
        );
        let mut result = GlobMatchResult::new();
        provider.add_file_name_matches("a.THING", &mut result);
        assert_eq!(result.matches(), ["application/x-thing"]);
    }
}
