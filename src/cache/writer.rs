//! Serialise a [`Definitions`] registry into the binary cache format.
//!
//! Strings are interned on first use and written immediately before the
//! table that needs them, so every fixed-stride table stays contiguous.
//! Tables whose children are written later reserve the child offset and
//! patch it once the child block exists.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;

use super::file::HEADER_LEN;
use crate::common::Result;
use crate::common::binary::{patch_u32_be, write_u32_be};
use crate::definitions::Definitions;
use crate::glob::{GlobPattern, has_wildcards, pack_flags_and_weight};
use crate::magic::{MagicRule, MagicRuleMatcher};

pub const MAJOR_VERSION: u16 = 1;
pub const MINOR_VERSION: u16 = 2;

/// Where a glob pattern is stored in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlobSlot {
    /// No wildcard at all: the literal list.
    Literal,
    /// `*` followed by wildcard-free text: the reverse suffix tree.
    Suffix,
    /// Everything else: the complex glob list.
    Complex,
}

fn glob_slot(pattern: &str) -> GlobSlot {
    if !has_wildcards(pattern) {
        GlobSlot::Literal
    } else if let Some(rest) = pattern.strip_prefix('*')
        && !rest.is_empty()
        && !has_wildcards(rest)
    {
        GlobSlot::Suffix
    } else {
        GlobSlot::Complex
    }
}

/// Reverse suffix trie node under construction.
#[derive(Default)]
struct SuffixNode {
    children: BTreeMap<char, SuffixNode>,
    /// (mime type, flagsAndWeight) of patterns ending at this node.
    leaves: Vec<(String, u32)>,
}

impl SuffixNode {
    fn insert(&mut self, suffix: &str, mime_type: &str, flags: u32) {
        let mut node = self;
        for ch in suffix.chars().rev() {
            node = node.children.entry(ch).or_default();
        }
        if !node.leaves.iter().any(|(m, f)| m == mime_type && *f == flags) {
            node.leaves.push((mime_type.to_string(), flags));
            node.leaves.sort();
        }
    }

    fn entry_count(&self) -> u32 {
        (self.leaves.len() + self.children.len()) as u32
    }
}

/// Builds a version 1.2 cache image.
pub struct CacheWriter<'a> {
    definitions: &'a Definitions,
}

impl<'a> CacheWriter<'a> {
    pub fn new(definitions: &'a Definitions) -> Self {
        Self { definitions }
    }

    /// Produce the complete cache image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = ImageBuilder::default();
        out.bytes.resize(HEADER_LEN, 0);
        out.bytes[0..2].copy_from_slice(&MAJOR_VERSION.to_be_bytes());
        out.bytes[2..4].copy_from_slice(&MINOR_VERSION.to_be_bytes());

        let defs = self.definitions;
        let mut literals = Vec::new();
        let mut complex = Vec::new();
        let mut tree = SuffixNode::default();
        for glob in defs.types().flat_map(|t| t.globs()) {
            let flags = pack_flags_and_weight(glob.weight(), glob.is_case_sensitive());
            match glob_slot(glob.pattern()) {
                GlobSlot::Literal => literals.push(glob),
                GlobSlot::Suffix => tree.insert(&glob.pattern()[1..], glob.mime_type(), flags),
                GlobSlot::Complex => complex.push(glob),
            }
        }
        literals.sort_by(|a, b| (a.pattern(), a.mime_type()).cmp(&(b.pattern(), b.mime_type())));
        complex.sort_by(|a, b| {
            b.weight()
                .cmp(&a.weight())
                .then_with(|| a.pattern().cmp(b.pattern()))
                .then_with(|| a.mime_type().cmp(b.mime_type()))
        });

        let mut aliases: Vec<(&str, &str)> = defs.aliases().iter().collect();
        aliases.sort();
        let alias_list = out.pair_list(&aliases);

        let parent_list = out.parent_list(defs);
        let literal_list = out.glob_list(&literals);
        let reverse_suffix_tree = out.suffix_tree(&tree);
        let glob_list = out.glob_list(&complex);
        let magic_list = out.magic_list(&defs.magic_matchers());

        out.align();
        let namespace_list = out.offset();
        write_u32_be(&mut out.bytes, 0);

        let mut icons: Vec<(&str, &str)> = defs
            .types()
            .filter_map(|t| t.icon().map(|icon| (t.name(), icon)))
            .collect();
        icons.sort();
        let icons_list = out.pair_list(&icons);

        let mut generic: Vec<(&str, &str)> = defs
            .types()
            .filter_map(|t| t.generic_icon().map(|icon| (t.name(), icon)))
            .collect();
        generic.sort();
        let generic_icons_list = out.pair_list(&generic);

        let sections = [
            alias_list,
            parent_list,
            literal_list,
            reverse_suffix_tree,
            glob_list,
            magic_list,
            namespace_list,
            icons_list,
            generic_icons_list,
        ];
        for (i, offset) in sections.into_iter().enumerate() {
            patch_u32_be(&mut out.bytes, 4 + i * 4, offset);
        }
        out.bytes
    }

    /// Write the image to `path`, replacing any existing file atomically.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let staging = path.with_extension("cache.new");
        fs::write(&staging, self.to_bytes())?;
        fs::rename(&staging, path)?;
        Ok(())
    }
}

#[derive(Default)]
struct ImageBuilder {
    bytes: Vec<u8>,
    strings: HashMap<String, u32>,
    blobs: HashMap<Vec<u8>, u32>,
}

impl ImageBuilder {
    #[inline]
    fn offset(&self) -> u32 {
        self.bytes.len() as u32
    }

    fn align(&mut self) {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
    }

    /// Offset of a NUL-terminated copy of `s`, writing it on first use.
    fn string(&mut self, s: &str) -> u32 {
        if let Some(&offset) = self.strings.get(s) {
            return offset;
        }
        let offset = self.offset();
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
        self.strings.insert(s.to_string(), offset);
        offset
    }

    /// Offset of a raw copy of `bytes`, writing it on first use.
    fn blob(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&offset) = self.blobs.get(bytes) {
            return offset;
        }
        let offset = self.offset();
        self.bytes.extend_from_slice(bytes);
        self.blobs.insert(bytes.to_vec(), offset);
        offset
    }

    /// `count, (key, value)*` over pairs already sorted by key.
    fn pair_list(&mut self, pairs: &[(&str, &str)]) -> u32 {
        let offsets: Vec<(u32, u32)> = pairs
            .iter()
            .map(|(key, value)| (self.string(key), self.string(value)))
            .collect();
        self.align();
        let list = self.offset();
        write_u32_be(&mut self.bytes, offsets.len() as u32);
        for (key, value) in offsets {
            write_u32_be(&mut self.bytes, key);
            write_u32_be(&mut self.bytes, value);
        }
        list
    }

    fn parent_list(&mut self, defs: &Definitions) -> u32 {
        let mut edges: Vec<(&str, &[String])> = defs
            .parents()
            .iter()
            .filter(|(_, parents)| !parents.is_empty())
            .collect();
        edges.sort_by(|a, b| a.0.cmp(b.0));

        let tables: Vec<(u32, Vec<u32>)> = edges
            .iter()
            .map(|(child, parents)| {
                let child = self.string(child);
                let parents = parents.iter().map(|p| self.string(p)).collect();
                (child, parents)
            })
            .collect();

        self.align();
        let list = self.offset();
        write_u32_be(&mut self.bytes, tables.len() as u32);
        let mut slots = Vec::with_capacity(tables.len());
        for (child, _) in &tables {
            write_u32_be(&mut self.bytes, *child);
            slots.push(self.offset() as usize);
            write_u32_be(&mut self.bytes, 0);
        }
        for ((_, parents), slot) in tables.iter().zip(slots) {
            let table = self.offset();
            write_u32_be(&mut self.bytes, parents.len() as u32);
            for parent in parents {
                write_u32_be(&mut self.bytes, *parent);
            }
            patch_u32_be(&mut self.bytes, slot, table);
        }
        list
    }

    fn glob_list(&mut self, globs: &[&GlobPattern]) -> u32 {
        let entries: Vec<(u32, u32, u32)> = globs
            .iter()
            .map(|g| {
                (
                    self.string(g.pattern()),
                    self.string(g.mime_type()),
                    pack_flags_and_weight(g.weight(), g.is_case_sensitive()),
                )
            })
            .collect();
        self.align();
        let list = self.offset();
        write_u32_be(&mut self.bytes, entries.len() as u32);
        for (pattern, mime_type, flags) in entries {
            write_u32_be(&mut self.bytes, pattern);
            write_u32_be(&mut self.bytes, mime_type);
            write_u32_be(&mut self.bytes, flags);
        }
        list
    }

    /// Header `(n_roots, first_root)` followed by breadth-first node blocks;
    /// each block lists leaves first, then child nodes by character.
    fn suffix_tree(&mut self, root: &SuffixNode) -> u32 {
        self.align();
        let tree = self.offset();
        write_u32_be(&mut self.bytes, root.children.len() as u32);
        let first_slot = self.offset() as usize;
        write_u32_be(&mut self.bytes, 0);

        let mut pending: VecDeque<(usize, &SuffixNode)> = VecDeque::from([(first_slot, root)]);
        while let Some((slot, node)) = pending.pop_front() {
            let leaves: Vec<(u32, u32)> = node
                .leaves
                .iter()
                .map(|(mime_type, flags)| (self.string(mime_type), *flags))
                .collect();
            self.align();
            let block = self.offset();
            patch_u32_be(&mut self.bytes, slot, block);

            for (mime_type, flags) in leaves {
                write_u32_be(&mut self.bytes, 0);
                write_u32_be(&mut self.bytes, mime_type);
                write_u32_be(&mut self.bytes, flags);
            }
            for (ch, child) in &node.children {
                write_u32_be(&mut self.bytes, *ch as u32);
                write_u32_be(&mut self.bytes, child.entry_count());
                let child_slot = self.offset() as usize;
                write_u32_be(&mut self.bytes, 0);
                pending.push_back((child_slot, child));
            }
        }
        tree
    }

    /// `(count, max_extent, first_match)` then match records sorted by
    /// descending priority and name, then their matchlet trees.
    fn magic_list(&mut self, matchers: &[MagicRuleMatcher]) -> u32 {
        let mut matchers: Vec<&MagicRuleMatcher> = matchers.iter().collect();
        matchers.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| a.mime_type().cmp(b.mime_type()))
        });
        let names: Vec<u32> = matchers.iter().map(|m| self.string(m.mime_type())).collect();
        let max_extent = matchers.iter().map(|m| m.extent()).max().unwrap_or(0);

        self.align();
        let list = self.offset();
        write_u32_be(&mut self.bytes, matchers.len() as u32);
        write_u32_be(&mut self.bytes, max_extent);
        write_u32_be(&mut self.bytes, list + 12);

        let mut slots = Vec::with_capacity(matchers.len());
        for (matcher, name) in matchers.iter().zip(names) {
            write_u32_be(&mut self.bytes, matcher.priority());
            write_u32_be(&mut self.bytes, name);
            write_u32_be(&mut self.bytes, matcher.rules().len() as u32);
            slots.push(self.offset() as usize);
            write_u32_be(&mut self.bytes, 0);
        }
        for (matcher, slot) in matchers.iter().zip(slots) {
            let block = self.matchlets(matcher.rules());
            patch_u32_be(&mut self.bytes, slot, block);
        }
        list
    }

    /// Write one level of sibling rules, then recurse into their children.
    fn matchlets(&mut self, rules: &[MagicRule]) -> u32 {
        let data: Vec<(u32, u32)> = rules
            .iter()
            .map(|rule| {
                let value = self.blob(rule.value());
                let mask = rule.mask().map_or(0, |mask| self.blob(mask));
                (value, mask)
            })
            .collect();

        self.align();
        let block = self.offset();
        let mut slots = Vec::with_capacity(rules.len());
        for (rule, (value, mask)) in rules.iter().zip(data) {
            write_u32_be(&mut self.bytes, rule.start());
            write_u32_be(&mut self.bytes, rule.range_len());
            write_u32_be(&mut self.bytes, rule.kind().width().unwrap_or(1) as u32);
            write_u32_be(&mut self.bytes, rule.value().len() as u32);
            write_u32_be(&mut self.bytes, value);
            write_u32_be(&mut self.bytes, mask);
            write_u32_be(&mut self.bytes, rule.children().len() as u32);
            slots.push(self.offset() as usize);
            write_u32_be(&mut self.bytes, 0);
        }
        for (rule, slot) in rules.iter().zip(slots) {
            if !rule.children().is_empty() {
                let children = self.matchlets(rule.children());
                patch_u32_be(&mut self.bytes, slot, children);
            }
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheFile;
    use crate::definitions::parse_definitions;
    use crate::glob::GlobMatchResult;

    const DEFS: &str = r#"<mime-info>
      <mime-type type="text/plain">
        <comment>text</comment>
        <glob pattern="*.txt"/>
        <glob pattern="*.TXT" case-sensitive="true"/>
      </mime-type>
      <mime-type type="application/x-bzip">
        <glob pattern="*.bz2"/>
      </mime-type>
      <mime-type type="application/x-bzip-compressed-tar">
        <sub-class-of type="application/x-bzip"/>
        <glob pattern="*.tar.bz2"/>
        <generic-icon name="package-x-generic"/>
      </mime-type>
      <mime-type type="text/x-makefile">
        <sub-class-of type="text/plain"/>
        <alias type="text/x-make"/>
        <icon name="makefile"/>
        <glob pattern="Makefile" case-sensitive="true"/>
        <glob pattern="makefile.*" weight="40"/>
      </mime-type>
      <mime-type type="application/pdf">
        <magic priority="50">
          <match type="string" value="%PDF-" offset="0:16"/>
        </magic>
      </mime-type>
      <mime-type type="application/zip">
        <magic priority="40">
          <match type="string" value="PK\003\004" offset="0">
            <match type="big16" value="0x1400" mask="0xff00" offset="4"/>
          </match>
        </magic>
      </mime-type>
    </mime-info>"#;

    fn cache() -> CacheFile {
        let defs = parse_definitions(DEFS).unwrap();
        CacheFile::from_bytes("mem", CacheWriter::new(&defs).to_bytes()).unwrap()
    }

    fn file_matches(cache: &CacheFile, name: &str) -> Vec<String> {
        let mut result = GlobMatchResult::new();
        cache.view().add_file_name_matches(name, &mut result).unwrap();
        result.into_matches()
    }

    #[test]
    fn test_slots() {
        assert_eq!(glob_slot("Makefile"), GlobSlot::Literal);
        assert_eq!(glob_slot("*.tar.gz"), GlobSlot::Suffix);
        assert_eq!(glob_slot("*"), GlobSlot::Complex);
        assert_eq!(glob_slot("README*"), GlobSlot::Complex);
        assert_eq!(glob_slot("*.[ch]"), GlobSlot::Complex);
    }

    #[test]
    fn test_header_version() {
        let cache = cache();
        assert_eq!(cache.header().major, 1);
        assert_eq!(cache.header().minor, 2);
    }

    #[test]
    fn test_relations_round_trip() {
        let cache = cache();
        let view = cache.view();
        assert_eq!(view.resolve_alias("text/x-make").unwrap(), Some("text/x-makefile"));
        assert_eq!(view.resolve_alias("text/x-makefile").unwrap(), None);
        assert_eq!(view.aliases_of("text/x-makefile").unwrap(), ["text/x-make"]);
        assert_eq!(
            view.parents("application/x-bzip-compressed-tar").unwrap(),
            ["application/x-bzip"]
        );
        assert!(view.parents("text/plain").unwrap().is_empty());
        assert_eq!(view.icon("text/x-makefile").unwrap(), Some("makefile"));
        assert_eq!(
            view.generic_icon("application/x-bzip-compressed-tar").unwrap(),
            Some("package-x-generic")
        );
    }

    #[test]
    fn test_file_name_lookup() {
        let cache = cache();
        assert_eq!(file_matches(&cache, "notes.txt"), ["text/plain"]);
        assert_eq!(file_matches(&cache, "NOTES.Txt"), ["text/plain"]);
        assert_eq!(file_matches(&cache, "x.tar.bz2"), ["application/x-bzip-compressed-tar"]);
        assert_eq!(file_matches(&cache, "x.bz2"), ["application/x-bzip"]);
        assert_eq!(file_matches(&cache, "Makefile"), ["text/x-makefile"]);
        assert_eq!(file_matches(&cache, "makefile.am"), ["text/x-makefile"]);
        assert!(file_matches(&cache, "MAKEFILE").is_empty());
        assert!(file_matches(&cache, "photo.png").is_empty());
        assert_eq!(file_matches(&cache, ".txt"), ["text/plain"]);
    }

    #[test]
    fn test_magic_lookup() {
        let cache = cache();
        let view = cache.view();
        assert_eq!(
            view.find_magic(b"\n\n%PDF-1.4").unwrap(),
            Some(("application/pdf", 50))
        );
        assert_eq!(
            view.find_magic(b"PK\x03\x04\x14\x99").unwrap(),
            Some(("application/zip", 40))
        );
        assert_eq!(view.find_magic(b"PK\x03\x04\x13\x00").unwrap(), None);
        assert_eq!(view.magic_max_extent().unwrap(), 21);
    }

    #[test]
    fn test_unbounded_magic_range() {
        let defs = parse_definitions(
            r#"<mime-info><mime-type type="application/x-anywhere">
                 <magic><match type="string" value="NEEDLE" offset="0:4294967295"/></magic>
               </mime-type></mime-info>"#,
        )
        .unwrap();
        let cache = CacheFile::from_bytes("mem", CacheWriter::new(&defs).to_bytes()).unwrap();
        assert_eq!(
            cache.view().find_magic(b"hay hay NEEDLE").unwrap(),
            Some(("application/x-anywhere", 50))
        );
        assert_eq!(cache.view().find_magic(b"hay").unwrap(), None);
    }

    #[test]
    fn test_harvest_names() {
        let cache = cache();
        let names = cache.view().harvest_names().unwrap();
        for name in [
            "text/plain",
            "application/x-bzip",
            "application/x-bzip-compressed-tar",
            "text/x-makefile",
            "application/pdf",
            "application/zip",
        ] {
            assert!(names.contains(name), "{name}");
        }
        assert!(!names.contains("text/x-make"));
    }

    #[test]
    fn test_truncated_image_never_panics() {
        let defs = parse_definitions(DEFS).unwrap();
        let image = CacheWriter::new(&defs).to_bytes();
        for len in (HEADER_LEN..image.len()).step_by(7) {
            let Ok(cache) = CacheFile::from_bytes("mem", image[..len].to_vec()) else {
                continue;
            };
            let view = cache.view();
            let mut result = GlobMatchResult::new();
            let _ = view.add_file_name_matches("x.tar.bz2", &mut result);
            let _ = view.find_magic(b"%PDF-");
            let _ = view.harvest_names();
            let _ = view.parents("text/x-makefile");
            let _ = view.resolve_alias("text/x-make");
        }
    }

    #[test]
    fn test_write_to_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mime.cache");
        fs::write(&path, b"old").unwrap();
        let defs = parse_definitions(DEFS).unwrap();
        CacheWriter::new(&defs).write_to(&path).unwrap();
        assert!(CacheFile::open(&path).is_ok());
        assert!(!dir.path().join("mime.cache.new").exists());
    }
}
