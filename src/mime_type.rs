//! The [`MimeType`] value type.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;

use crate::database::Shared;
use crate::glob::has_wildcards;

/// Display data of a MIME type, loaded from the provider on first use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MimeTypeDetails {
    /// Locale → comment; the untagged comment is stored under `""`.
    pub comments: BTreeMap<String, String>,
    pub icon_name: Option<String>,
    pub generic_icon_name: Option<String>,
    /// Glob patterns as declared, for display.
    pub glob_patterns: Vec<String>,
}

struct MimeTypeInner {
    name: String,
    valid: bool,
    database: Weak<Shared>,
    details: OnceCell<MimeTypeDetails>,
}

/// A MIME type known to a [`Database`](crate::Database).
///
/// Cheap to clone. Equality and hashing use the name only. Details
/// (comments, icons, patterns) are fetched from the database the first time
/// any of them is asked for; relation queries go to the database on every
/// call. A `MimeType` that outlives its database still answers with its name
/// and defaults.
#[derive(Clone)]
pub struct MimeType {
    inner: Arc<MimeTypeInner>,
}

impl MimeType {
    pub(crate) fn new(name: impl Into<String>, database: Weak<Shared>) -> Self {
        Self {
            inner: Arc::new(MimeTypeInner {
                name: name.into(),
                valid: true,
                database,
                details: OnceCell::new(),
            }),
        }
    }

    /// The result of looking up a name nobody defines.
    pub fn invalid() -> Self {
        Self {
            inner: Arc::new(MimeTypeInner {
                name: String::new(),
                valid: false,
                database: Weak::new(),
                details: OnceCell::new(),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.inner.valid
    }

    /// Whether this is `application/octet-stream`.
    pub fn is_default(&self) -> bool {
        self.name() == crate::database::DEFAULT_MIME_TYPE
    }

    fn database(&self) -> Option<Arc<Shared>> {
        if !self.is_valid() {
            return None;
        }
        self.inner.database.upgrade()
    }

    fn details(&self) -> &MimeTypeDetails {
        self.inner.details.get_or_init(|| {
            self.database()
                .map(|db| db.details(self.name()))
                .unwrap_or_default()
        })
    }

    /// Comment in the database's preferred locale.
    pub fn comment(&self) -> String {
        let locales = self.database().map(|db| db.locales().to_vec()).unwrap_or_default();
        self.comment_for(&locales)
    }

    /// Comment for the first locale in `locales` that has one.
    ///
    /// Each locale is tried as given and then as its bare language
    /// (`pt_BR` → `pt`); without a match the untagged comment is used, and
    /// without one of those the type name.
    pub fn comment_for<S: AsRef<str>>(&self, locales: &[S]) -> String {
        let comments = &self.details().comments;
        for locale in locales {
            let locale = locale.as_ref();
            if let Some(text) = comments.get(locale) {
                return text.clone();
            }
            let language = locale.split(['_', '-', '.', '@']).next().unwrap_or_default();
            if language != locale
                && let Some(text) = comments.get(language)
            {
                return text.clone();
            }
        }
        comments
            .get("")
            .cloned()
            .unwrap_or_else(|| self.name().to_string())
    }

    /// Icon name; defaults to the type name with `/` replaced by `-`.
    pub fn icon_name(&self) -> String {
        match &self.details().icon_name {
            Some(icon) => icon.clone(),
            None => self.name().replace('/', "-"),
        }
    }

    /// Generic icon name; defaults to `<media>-x-generic`.
    pub fn generic_icon_name(&self) -> String {
        match &self.details().generic_icon_name {
            Some(icon) => icon.clone(),
            None => {
                let media = self.name().split('/').next().unwrap_or_default();
                format!("{media}-x-generic")
            },
        }
    }

    pub fn glob_patterns(&self) -> &[String] {
        &self.details().glob_patterns
    }

    /// Extensions from `*.ext` patterns, in declaration order.
    pub fn suffixes(&self) -> Vec<String> {
        self.glob_patterns()
            .iter()
            .filter_map(|p| p.strip_prefix("*."))
            .filter(|suffix| !has_wildcards(suffix))
            .map(str::to_string)
            .collect()
    }

    pub fn preferred_suffix(&self) -> Option<String> {
        self.suffixes().into_iter().next()
    }

    /// `"<comment> (<patterns>)"` for file dialogs, empty without patterns.
    pub fn filter_string(&self) -> String {
        let patterns = self.glob_patterns();
        if patterns.is_empty() {
            return String::new();
        }
        format!("{} ({})", self.comment(), patterns.join(" "))
    }

    /// Direct parents, including the implicit fallback parent.
    pub fn parent_mime_types(&self) -> Vec<String> {
        self.database()
            .map(|db| db.parents(self.name()))
            .unwrap_or_default()
    }

    /// All ancestors, nearest first.
    pub fn all_ancestors(&self) -> Vec<String> {
        self.database()
            .map(|db| db.all_ancestors(self.name()))
            .unwrap_or_default()
    }

    pub fn aliases(&self) -> Vec<String> {
        self.database()
            .map(|db| db.aliases(self.name()))
            .unwrap_or_default()
    }

    /// Whether this type is, or derives from, `ancestor` (an alias is
    /// resolved first).
    pub fn inherits(&self, ancestor: &str) -> bool {
        match self.database() {
            Some(db) => db.inherits(self.name(), ancestor),
            None => self.is_valid() && self.name() == ancestor,
        }
    }
}

impl PartialEq for MimeType {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for MimeType {}

impl Hash for MimeType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Debug for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MimeType")
            .field("name", &self.name())
            .field("valid", &self.is_valid())
            .finish()
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached(name: &str) -> MimeType {
        MimeType::new(name, Weak::new())
    }

    #[test]
    fn test_invalid() {
        let mime = MimeType::invalid();
        assert!(!mime.is_valid());
        assert_eq!(mime.name(), "");
        assert!(mime.aliases().is_empty());
        assert!(!mime.inherits(""));
    }

    #[test]
    fn test_defaults_without_database() {
        let mime = detached("image/x-foo");
        assert_eq!(mime.icon_name(), "image-x-foo");
        assert_eq!(mime.generic_icon_name(), "image-x-generic");
        assert_eq!(mime.comment_for(&["de"]), "image/x-foo");
        assert!(mime.suffixes().is_empty());
        assert_eq!(mime.filter_string(), "");
        assert!(mime.inherits("image/x-foo"));
        assert_eq!(mime.to_string(), "image/x-foo");
    }

    #[test]
    fn test_comment_fallback_chain() {
        let mime = detached("text/x-foo");
        let mut details = MimeTypeDetails::default();
        details.comments.insert(String::new(), "Foo".into());
        details.comments.insert("pt".into(), "Fu".into());
        details.comments.insert("pt_BR".into(), "Fú".into());
        details.glob_patterns = vec!["*.foo".into(), "*.f[o0]".into(), "FOO*".into()];
        mime.inner.details.set(details).unwrap();

        assert_eq!(mime.comment_for(&["pt_BR"]), "Fú");
        assert_eq!(mime.comment_for(&["pt_PT.UTF-8"]), "Fu");
        assert_eq!(mime.comment_for(&["de", "pt"]), "Fu");
        assert_eq!(mime.comment_for::<&str>(&[]), "Foo");
        assert_eq!(mime.suffixes(), ["foo"]);
        assert_eq!(mime.preferred_suffix().as_deref(), Some("foo"));
        assert_eq!(mime.filter_string(), "Foo (*.foo *.f[o0] FOO*)");
    }

    #[test]
    fn test_equality_by_name() {
        assert_eq!(detached("a/b"), detached("a/b"));
        assert_ne!(detached("a/b"), detached("a/c"));
    }
}
