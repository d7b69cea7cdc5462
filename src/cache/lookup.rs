//! Table lookups over a [`CacheView`].
//!
//! Every function here reads offsets out of the file itself, so each one
//! returns a [`BinaryResult`] and stops at the first out-of-range read.
//! The provider turns an error into "no answer from this file".

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::file::CacheView;
use crate::common::binary::{BinaryError, BinaryResult};
use crate::glob::{GlobMatchResult, match_file_name, unpack_flags_and_weight};
use crate::magic::match_range;

/// Stride of alias, parent and icon entries.
const PAIR_ENTRY: u32 = 8;
/// Stride of literal and glob entries.
const GLOB_ENTRY: u32 = 12;
/// Stride of reverse suffix tree nodes.
const TREE_NODE: u32 = 12;
/// Stride of magic match records.
const MAGIC_MATCH: u32 = 16;
/// Stride of magic matchlets.
const MATCHLET: u32 = 32;
/// Nesting bound for matchlet trees; deeper trees are treated as a mismatch.
const MAX_MATCHLET_DEPTH: usize = 64;

#[inline]
fn entry_offset(first: u32, index: u32, stride: u32) -> BinaryResult<u32> {
    index
        .checked_mul(stride)
        .and_then(|rel| first.checked_add(rel))
        .ok_or(BinaryError::OutOfBounds {
            offset: first as usize,
            len: stride as usize,
            available: 0,
        })
}

impl<'a> CacheView<'a> {
    /// Binary-search a list of `(key, value)` entries sorted by key bytes.
    fn find_pair(&self, list: u32, key: &str) -> BinaryResult<Option<u32>> {
        let count = self.u32_at(list)?;
        let first = list.saturating_add(4);
        let (mut lo, mut hi) = (0u32, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = entry_offset(first, mid, PAIR_ENTRY)?;
            let candidate = self.cstr_at(self.u32_at(entry)?)?;
            match candidate.cmp(key.as_bytes()) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(self.u32_at(entry.saturating_add(4))?)),
            }
        }
        Ok(None)
    }

    /// Canonical name for `alias`, if it is one.
    pub fn resolve_alias(&self, alias: &str) -> BinaryResult<Option<&'a str>> {
        match self.find_pair(self.header().alias_list, alias)? {
            Some(offset) => self.str_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Explicitly recorded parents of `name`.
    pub fn parents(&self, name: &str) -> BinaryResult<Vec<&'a str>> {
        let Some(table) = self.find_pair(self.header().parent_list, name)? else {
            return Ok(Vec::new());
        };
        let count = self.u32_at(table)?;
        let mut parents = Vec::new();
        for i in 0..count {
            let at = entry_offset(table.saturating_add(4), i, 4)?;
            parents.push(self.str_at(self.u32_at(at)?)?);
        }
        Ok(parents)
    }

    /// Every alias whose target is `name`.
    pub fn aliases_of(&self, name: &str) -> BinaryResult<Vec<&'a str>> {
        let list = self.header().alias_list;
        let count = self.u32_at(list)?;
        let mut aliases = Vec::new();
        for i in 0..count {
            let entry = entry_offset(list.saturating_add(4), i, PAIR_ENTRY)?;
            if self.cstr_at(self.u32_at(entry.saturating_add(4))?)? == name.as_bytes() {
                aliases.push(self.str_at(self.u32_at(entry)?)?);
            }
        }
        Ok(aliases)
    }

    pub fn icon(&self, name: &str) -> BinaryResult<Option<&'a str>> {
        match self.find_pair(self.header().icons_list, name)? {
            Some(offset) => self.str_at(offset).map(Some),
            None => Ok(None),
        }
    }

    pub fn generic_icon(&self, name: &str) -> BinaryResult<Option<&'a str>> {
        match self.find_pair(self.header().generic_icons_list, name)? {
            Some(offset) => self.str_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Feed every filename match in this file into `result`.
    ///
    /// The literal list, the reverse suffix tree and the complex glob list
    /// are all consulted; the accumulator's weight/length rule picks the
    /// winners, exactly as for in-memory globs.
    pub fn add_file_name_matches(
        &self,
        file_name: &str,
        result: &mut GlobMatchResult,
    ) -> BinaryResult<()> {
        if file_name.is_empty() {
            return Ok(());
        }
        self.match_glob_list(self.header().literal_list, file_name, result)?;

        let lower = file_name.to_lowercase();
        self.match_suffix_tree(file_name, true, result)?;
        self.match_suffix_tree(&lower, false, result)?;

        self.match_glob_list(self.header().glob_list, file_name, result)
    }

    fn match_glob_list(
        &self,
        list: u32,
        file_name: &str,
        result: &mut GlobMatchResult,
    ) -> BinaryResult<()> {
        let count = self.u32_at(list)?;
        let mut lower: Option<String> = None;
        for i in 0..count {
            let entry = entry_offset(list.saturating_add(4), i, GLOB_ENTRY)?;
            let pattern = self.str_at(self.u32_at(entry)?)?;
            let (weight, case_sensitive) = unpack_flags_and_weight(self.u32_at(entry.saturating_add(8))?);
            let candidate = if case_sensitive {
                file_name
            } else {
                lower.get_or_insert_with(|| file_name.to_lowercase()).as_str()
            };
            if match_file_name(pattern, candidate) {
                let mime_type = self.str_at(self.u32_at(entry.saturating_add(4))?)?;
                result.add_match(mime_type, weight, pattern);
            }
        }
        Ok(())
    }

    /// Walk the reverse suffix tree from the last character of `name`
    /// backwards, adding the leaves of every node on the path.
    ///
    /// With `case_sensitive` set only case-sensitive leaves count, otherwise
    /// only case-insensitive ones; the caller passes the original and the
    /// lower-cased name respectively.
    fn match_suffix_tree(
        &self,
        name: &str,
        case_sensitive: bool,
        result: &mut GlobMatchResult,
    ) -> BinaryResult<()> {
        let tree = self.header().reverse_suffix_tree;
        let mut count = self.u32_at(tree)?;
        let mut first = self.u32_at(tree.saturating_add(4))?;

        for (index, ch) in name.char_indices().rev() {
            let Some(node) = self.find_tree_child(first, count, ch as u32)? else {
                break;
            };
            count = self.u32_at(node.saturating_add(4))?;
            first = self.u32_at(node.saturating_add(8))?;

            for i in 0..count {
                let leaf = entry_offset(first, i, TREE_NODE)?;
                if self.u32_at(leaf)? != 0 {
                    break;
                }
                let (weight, leaf_case_sensitive) = unpack_flags_and_weight(self.u32_at(leaf.saturating_add(8))?);
                if leaf_case_sensitive == case_sensitive {
                    let mime_type = self.str_at(self.u32_at(leaf.saturating_add(4))?)?;
                    let pattern = format!("*{}", &name[index..]);
                    result.add_match(mime_type, weight, &pattern);
                }
            }
        }
        Ok(())
    }

    /// Binary-search `count` sibling nodes at `first` for character `ch`.
    fn find_tree_child(&self, first: u32, count: u32, ch: u32) -> BinaryResult<Option<u32>> {
        let (mut lo, mut hi) = (0u32, count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let node = entry_offset(first, mid, TREE_NODE)?;
            match self.u32_at(node)?.cmp(&ch) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(node)),
            }
        }
        Ok(None)
    }

    /// Largest number of content bytes any magic rule in this file reads.
    pub fn magic_max_extent(&self) -> BinaryResult<u32> {
        self.u32_at(self.header().magic_list.saturating_add(4))
    }

    /// Highest-priority magic match in this file, as (type, priority).
    pub fn find_magic(&self, data: &[u8]) -> BinaryResult<Option<(&'a str, u32)>> {
        let list = self.header().magic_list;
        let count = self.u32_at(list)?;
        let first = self.u32_at(list.saturating_add(8))?;

        let mut best: Option<(&'a str, u32)> = None;
        for i in 0..count {
            let record = entry_offset(first, i, MAGIC_MATCH)?;
            let priority = self.u32_at(record)?;
            if best.is_some_and(|(_, p)| priority <= p) {
                continue;
            }
            let n_matchlets = self.u32_at(record.saturating_add(8))?;
            let first_matchlet = self.u32_at(record.saturating_add(12))?;
            if self.any_matchlet(data, first_matchlet, n_matchlets, 0)? {
                best = Some((self.str_at(self.u32_at(record.saturating_add(4))?)?, priority));
            }
        }
        Ok(best)
    }

    fn any_matchlet(&self, data: &[u8], first: u32, count: u32, depth: usize) -> BinaryResult<bool> {
        if depth > MAX_MATCHLET_DEPTH {
            return Ok(false);
        }
        for i in 0..count {
            let matchlet = entry_offset(first, i, MATCHLET)?;
            if self.matchlet_matches(data, matchlet, depth)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn matchlet_matches(&self, data: &[u8], matchlet: u32, depth: usize) -> BinaryResult<bool> {
        let range_start = self.u32_at(matchlet)?;
        let range_len = self.u32_at(matchlet.saturating_add(4))?;
        let value_len = self.u32_at(matchlet.saturating_add(12))?;
        let value = self.bytes_at(self.u32_at(matchlet.saturating_add(16))?, value_len)?;
        let mask = match self.u32_at(matchlet.saturating_add(20))? {
            0 => None,
            offset => Some(self.bytes_at(offset, value_len)?),
        };

        if !match_range(data, range_start as usize, range_len as usize, value, mask) {
            return Ok(false);
        }
        let n_children = self.u32_at(matchlet.saturating_add(24))?;
        if n_children == 0 {
            return Ok(true);
        }
        let first_child = self.u32_at(matchlet.saturating_add(28))?;
        self.any_matchlet(data, first_child, n_children, depth + 1)
    }

    /// Every type name the tables of this file mention.
    pub fn harvest_names(&self) -> BinaryResult<BTreeSet<&'a str>> {
        let header = *self.header();
        let mut names = BTreeSet::new();

        for list in [header.alias_list, header.icons_list, header.generic_icons_list] {
            let count = self.u32_at(list)?;
            for i in 0..count {
                let entry = entry_offset(list.saturating_add(4), i, PAIR_ENTRY)?;
                let key = self.str_at(self.u32_at(entry)?)?;
                if list == header.alias_list {
                    names.insert(self.str_at(self.u32_at(entry.saturating_add(4))?)?);
                } else {
                    names.insert(key);
                }
            }
        }

        let count = self.u32_at(header.parent_list)?;
        for i in 0..count {
            let entry = entry_offset(header.parent_list.saturating_add(4), i, PAIR_ENTRY)?;
            let child = self.str_at(self.u32_at(entry)?)?;
            names.insert(child);
            names.extend(self.parents(child)?);
        }

        for list in [header.literal_list, header.glob_list] {
            let count = self.u32_at(list)?;
            for i in 0..count {
                let entry = entry_offset(list.saturating_add(4), i, GLOB_ENTRY)?;
                names.insert(self.str_at(self.u32_at(entry.saturating_add(4))?)?);
            }
        }

        let magic = header.magic_list;
        let count = self.u32_at(magic)?;
        let first = self.u32_at(magic.saturating_add(8))?;
        for i in 0..count {
            let record = entry_offset(first, i, MAGIC_MATCH)?;
            names.insert(self.str_at(self.u32_at(record.saturating_add(4))?)?);
        }

        self.harvest_tree_leaves(&mut names)?;
        Ok(names)
    }

    fn harvest_tree_leaves(&self, names: &mut BTreeSet<&'a str>) -> BinaryResult<()> {
        let tree = self.header().reverse_suffix_tree;
        let mut pending = vec![(self.u32_at(tree.saturating_add(4))?, self.u32_at(tree)?)];
        // Each node occupies its own 12 bytes, so a tree visiting more nodes
        // than fit in the file is cyclic.
        let mut budget = self.data().len() / TREE_NODE as usize;
        while let Some((first, count)) = pending.pop() {
            for i in 0..count {
                if budget == 0 {
                    return Ok(());
                }
                budget -= 1;
                let node = entry_offset(first, i, TREE_NODE)?;
                if self.u32_at(node)? == 0 {
                    names.insert(self.str_at(self.u32_at(node.saturating_add(4))?)?);
                } else {
                    pending.push((self.u32_at(node.saturating_add(8))?, self.u32_at(node.saturating_add(4))?));
                }
            }
        }
        Ok(())
    }
}
