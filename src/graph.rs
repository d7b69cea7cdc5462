//! Type inheritance and alias relations.
//!
//! Both providers answer "what are the direct parents of X"; the traversals
//! here ([`inherits`], [`all_ancestors`]) are written once against that
//! question so the two backends walk the graph identically.

use std::collections::{HashMap, HashSet, VecDeque};

/// Groups whose types are not regular file content and therefore do not
/// derive from `application/octet-stream`.
const NON_FILE_GROUPS: [&str; 5] = ["inode", "all", "fonts", "print", "uri"];

/// Implicit parent of a type with no recorded `sub-class-of`.
///
/// ```
/// use mimekit::graph::fallback_parent;
/// assert_eq!(fallback_parent("text/x-csrc"), Some("text/plain"));
/// assert_eq!(fallback_parent("text/plain"), Some("application/octet-stream"));
/// assert_eq!(fallback_parent("image/png"), Some("application/octet-stream"));
/// assert_eq!(fallback_parent("inode/directory"), None);
/// assert_eq!(fallback_parent("application/octet-stream"), None);
/// ```
pub fn fallback_parent(name: &str) -> Option<&'static str> {
    let group = name.split_once('/').map_or(name, |(group, _)| group);
    if group == "text" && name != "text/plain" {
        return Some("text/plain");
    }
    if !NON_FILE_GROUPS.contains(&group) && name != "application/octet-stream" {
        return Some("application/octet-stream");
    }
    None
}

/// Explicit child → parents edges, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParentGraph {
    edges: HashMap<String, Vec<String>>,
}

impl ParentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parent(&mut self, child: &str, parent: &str) {
        let parents = self.edges.entry(child.to_string()).or_default();
        if !parents.iter().any(|p| p == parent) {
            parents.push(parent.to_string());
        }
    }

    /// Recorded parents only, without the fallback rule.
    pub fn explicit_parents(&self, child: &str) -> &[String] {
        self.edges.get(child).map_or(&[], Vec::as_slice)
    }

    /// Direct parents, falling back to [`fallback_parent`] when none are
    /// recorded.
    pub fn parents(&self, child: &str) -> Vec<String> {
        match self.edges.get(child) {
            Some(parents) if !parents.is_empty() => parents.clone(),
            _ => fallback_parent(child).map(str::to_string).into_iter().collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.edges.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

/// Alias → canonical name, many-to-one.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    aliases: HashMap<String, String>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: &str, canonical: &str) {
        self.aliases.insert(alias.to_string(), canonical.to_string());
    }

    pub fn resolve(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// All aliases of `canonical`, sorted.
    pub fn aliases_of(&self, canonical: &str) -> Vec<String> {
        let mut found: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == canonical)
            .map(|(alias, _)| alias.clone())
            .collect();
        found.sort();
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.aliases.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Whether `name` equals or (transitively) derives from `ancestor`.
///
/// Breadth-first over `parents_of`; each type is expanded once.
pub fn inherits<F>(name: &str, ancestor: &str, mut parents_of: F) -> bool
where
    F: FnMut(&str) -> Vec<String>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue = VecDeque::from([name.to_string()]);

    while let Some(current) = queue.pop_front() {
        if current == ancestor {
            return true;
        }
        if !seen.insert(current.clone()) {
            continue;
        }
        queue.extend(parents_of(&current));
    }
    false
}

/// Every ancestor of `name`, without duplicates, each level's direct parents
/// listed before their own parents so the most general types come last.
pub fn all_ancestors<F>(name: &str, mut parents_of: F) -> Vec<String>
where
    F: FnMut(&str) -> Vec<String>,
{
    let mut collected = Vec::new();
    let mut expanded = HashSet::from([name.to_string()]);
    collect_ancestors(name, &mut parents_of, &mut collected, &mut expanded);
    collected.retain(|n| n != name);
    collected
}

fn collect_ancestors<F>(
    name: &str,
    parents_of: &mut F,
    collected: &mut Vec<String>,
    expanded: &mut HashSet<String>,
) where
    F: FnMut(&str) -> Vec<String>,
{
    let parents = parents_of(name);
    for parent in &parents {
        if !collected.contains(parent) {
            collected.push(parent.clone());
        }
    }
    for parent in &parents {
        if expanded.insert(parent.clone()) {
            collect_ancestors(parent, parents_of, collected, expanded);
        }
    }
}
