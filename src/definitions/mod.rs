//! In-memory registry of MIME type definitions.
//!
//! A [`Definitions`] value is what a set of `<mime-info>` documents describe:
//! per-type comments, icons, glob patterns and magic, plus the parent and
//! alias relations. The XML provider queries it directly; the cache compiler
//! serialises it.
//!
//! Definition files are merged lowest precedence first, so a later file can
//! override comments and icons and, with `<glob-deleteall/>` or
//! `<magic-deleteall/>`, drop what earlier files contributed for a type.

mod builtin;
mod parser;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::glob::{GlobPattern, GlobTable};
use crate::graph::{AliasMap, ParentGraph};
use crate::magic::MagicRuleMatcher;
use crate::mime_type::MimeTypeDetails;

pub use builtin::{BUILTIN_DEFINITIONS_XML, builtin_definitions};
pub use parser::{load_definition_file, parse_definitions};

/// Everything declared for one MIME type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDefinition {
    name: String,
    /// Locale → comment; the untagged comment is stored under `""`.
    comments: BTreeMap<String, String>,
    icon: Option<String>,
    generic_icon: Option<String>,
    /// Patterns as written, for display.
    patterns: Vec<String>,
    globs: Vec<GlobPattern>,
    magic: Vec<MagicRuleMatcher>,
    glob_deleteall: bool,
    magic_deleteall: bool,
}

impl TypeDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn comments(&self) -> &BTreeMap<String, String> {
        &self.comments
    }

    pub fn icon(&self) -> Option<&str> {
        self.icon.as_deref()
    }

    pub fn generic_icon(&self) -> Option<&str> {
        self.generic_icon.as_deref()
    }

    /// Glob patterns in declaration order, with their original spelling.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn globs(&self) -> &[GlobPattern] {
        &self.globs
    }

    pub fn magic(&self) -> &[MagicRuleMatcher] {
        &self.magic
    }

    pub fn set_comment(&mut self, locale: &str, text: impl Into<String>) {
        self.comments.insert(locale.to_string(), text.into());
    }

    pub fn set_icon(&mut self, icon: impl Into<String>) {
        self.icon = Some(icon.into());
    }

    pub fn set_generic_icon(&mut self, icon: impl Into<String>) {
        self.generic_icon = Some(icon.into());
    }

    /// Add a glob pattern. A pattern already present is ignored.
    pub fn add_glob(&mut self, pattern: &str, weight: u32, case_sensitive: bool) {
        if self.patterns.iter().any(|p| p == pattern) {
            return;
        }
        self.patterns.push(pattern.to_string());
        self.globs
            .push(GlobPattern::new(pattern, self.name.as_str(), weight, case_sensitive));
    }

    pub fn add_magic(&mut self, matcher: MagicRuleMatcher) {
        self.magic.push(matcher);
    }

    /// Drop globs contributed by lower-precedence files when merged.
    pub fn delete_all_globs(&mut self) {
        self.glob_deleteall = true;
        self.patterns.clear();
        self.globs.clear();
    }

    /// Drop magic contributed by lower-precedence files when merged.
    pub fn delete_all_magic(&mut self) {
        self.magic_deleteall = true;
        self.magic.clear();
    }

    /// Fold a higher-precedence definition of the same type into this one.
    fn absorb(&mut self, incoming: TypeDefinition) {
        if incoming.glob_deleteall {
            self.patterns.clear();
            self.globs.clear();
        }
        if incoming.magic_deleteall {
            self.magic.clear();
        }
        self.glob_deleteall |= incoming.glob_deleteall;
        self.magic_deleteall |= incoming.magic_deleteall;
        self.comments.extend(incoming.comments);
        if incoming.icon.is_some() {
            self.icon = incoming.icon;
        }
        if incoming.generic_icon.is_some() {
            self.generic_icon = incoming.generic_icon;
        }
        for (pattern, glob) in incoming.patterns.into_iter().zip(incoming.globs) {
            if !self.patterns.contains(&pattern) {
                self.patterns.push(pattern);
                self.globs.push(glob);
            }
        }
        self.magic.extend(incoming.magic);
    }

    /// Display data served through [`MimeType`](crate::MimeType).
    pub fn details(&self) -> MimeTypeDetails {
        MimeTypeDetails {
            comments: self.comments.clone(),
            icon_name: self.icon.clone(),
            generic_icon_name: self.generic_icon.clone(),
            glob_patterns: self.patterns.clone(),
        }
    }
}

/// A merged set of MIME type definitions and their relations.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    types: BTreeMap<String, TypeDefinition>,
    parents: ParentGraph,
    aliases: AliasMap,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    /// Type names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// Type definitions in name order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDefinition> {
        self.types.values()
    }

    pub fn parents(&self) -> &ParentGraph {
        &self.parents
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    pub fn add_parent(&mut self, child: &str, parent: &str) {
        self.parents.add_parent(child, parent);
    }

    pub fn add_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases.insert(alias, canonical);
    }

    /// Insert a type, folding it into an existing entry of the same name.
    pub fn insert(&mut self, definition: TypeDefinition) {
        match self.types.get_mut(definition.name()) {
            Some(existing) => existing.absorb(definition),
            None => {
                self.types.insert(definition.name.clone(), definition);
            },
        }
    }

    /// Merge a higher-precedence set into this one.
    ///
    /// Deleteall markers in `other` apply to what this set holds and are
    /// cleared once applied.
    pub fn merge(&mut self, other: Definitions) {
        for (name, definition) in other.types {
            self.insert(definition);
            if let Some(stored) = self.types.get_mut(&name) {
                stored.glob_deleteall = false;
                stored.magic_deleteall = false;
            }
        }
        for (child, parents) in other.parents.iter() {
            for parent in parents {
                self.parents.add_parent(child, parent);
            }
        }
        for (alias, canonical) in other.aliases.iter() {
            self.aliases.insert(alias, canonical);
        }
    }

    /// Build the filename lookup table over every type's globs.
    pub fn glob_table(&self) -> GlobTable {
        let mut table = GlobTable::new();
        for glob in self.types.values().flat_map(|t| t.globs.iter()) {
            table.add(glob.clone());
        }
        table
    }

    /// Every non-empty magic matcher, in type-name order.
    pub fn magic_matchers(&self) -> Vec<MagicRuleMatcher> {
        self.types
            .values()
            .flat_map(|t| t.magic.iter())
            .filter(|m| !m.is_empty())
            .cloned()
            .collect()
    }
}

/// The `packages/*.xml` files of one mime directory, sorted by file name.
pub fn package_files(mime_dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(mime_dir.join("packages")) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "xml") && path.is_file())
        .collect();
    files.sort();
    files
}

/// Parse and merge `files`, given lowest precedence first.
///
/// A file that fails to load is logged and contributes nothing.
pub fn load_files<'a, I>(files: I) -> Definitions
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut definitions = Definitions::new();
    for path in files {
        match load_definition_file(path) {
            Ok(parsed) => {
                debug!(path = %path.display(), types = parsed.len(), "loaded definition file");
                definitions.merge(parsed);
            },
            Err(err) => warn!(path = %path.display(), error = %err, "skipping definition file"),
        }
    }
    definitions
}
