//! Database configuration.
//!
//! [`DatabaseOptions`] says where to look for MIME data and how often to
//! re-validate it. [`DatabaseOptions::from_env`] follows the XDG base
//! directory rules the shared MIME-info database is installed under.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Re-validation interval used unless configured otherwise.
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_secs(5);

const DEFAULT_DATA_DIRS: &str = "/usr/local/share:/usr/share";

/// Options for constructing a [`Database`](crate::Database).
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use mimekit::DatabaseOptions;
///
/// let options = DatabaseOptions::new()
///     .with_directories(["/opt/app/share/mime"])
///     .with_recheck_interval(Duration::from_secs(30))
///     .with_binary_cache(false);
/// assert_eq!(options.directories.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Mime directories (each holding `mime.cache`, `types`, `packages/`),
    /// highest precedence first.
    pub directories: Vec<PathBuf>,
    /// Minimum time between two checks of the backing files.
    pub recheck_interval: Duration,
    /// Whether `mime.cache` files may be used at all.
    pub binary_cache: bool,
    /// Whether to fall back to the built-in minimal definitions when no
    /// definition file is found.
    pub builtin_fallback: bool,
    /// Preferred locales for comments, most preferred first.
    pub locales: Vec<String>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            recheck_interval: DEFAULT_RECHECK_INTERVAL,
            binary_cache: true,
            builtin_fallback: true,
            locales: Vec::new(),
        }
    }
}

impl DatabaseOptions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Options describing the current user's environment: XDG data
    /// directories and locale variables.
    pub fn from_env() -> Self {
        let data_home = env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .or_else(dirs::data_dir);
        let data_dirs = env::var("XDG_DATA_DIRS").ok();
        let var = |name: &str| env::var(name).ok();

        Self {
            directories: mime_directories(data_home, data_dirs.as_deref()),
            locales: locale_preferences(
                var("LANGUAGE").as_deref(),
                var("LC_ALL").as_deref(),
                var("LC_MESSAGES").as_deref(),
                var("LANG").as_deref(),
            ),
            ..Self::default()
        }
    }

    /// Set the mime directories, highest precedence first.
    pub fn with_directories<I, P>(mut self, directories: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.directories = directories.into_iter().map(Into::into).collect();
        self
    }

    /// Set how often backing files are re-validated. `Duration::ZERO`
    /// checks on every query.
    #[inline]
    pub fn with_recheck_interval(mut self, interval: Duration) -> Self {
        self.recheck_interval = interval;
        self
    }

    #[inline]
    pub fn with_binary_cache(mut self, enabled: bool) -> Self {
        self.binary_cache = enabled;
        self
    }

    #[inline]
    pub fn with_builtin_fallback(mut self, enabled: bool) -> Self {
        self.builtin_fallback = enabled;
        self
    }

    /// Set the locale preference list used by [`MimeType::comment`](crate::MimeType::comment).
    pub fn with_locales<I, S>(mut self, locales: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locales = locales.into_iter().map(Into::into).collect();
        self
    }
}

/// `<data_home>/mime` followed by `<dir>/mime` for each entry of the
/// colon-separated `data_dirs` (default `/usr/local/share:/usr/share`).
///
/// Relative entries are ignored, as are duplicates.
///
/// ```
/// use std::path::PathBuf;
/// use mimekit::config::mime_directories;
///
/// let dirs = mime_directories(Some("/home/u/.local/share".into()), Some("/usr/share:rel:/usr/share"));
/// assert_eq!(dirs, [PathBuf::from("/home/u/.local/share/mime"), PathBuf::from("/usr/share/mime")]);
/// ```
pub fn mime_directories(data_home: Option<PathBuf>, data_dirs: Option<&str>) -> Vec<PathBuf> {
    let data_dirs = data_dirs.filter(|d| !d.is_empty()).unwrap_or(DEFAULT_DATA_DIRS);
    let mut directories: Vec<PathBuf> = Vec::new();
    let candidates = data_home
        .into_iter()
        .chain(data_dirs.split(':').map(PathBuf::from))
        .filter(|p| p.is_absolute())
        .map(|p| p.join("mime"));
    for dir in candidates {
        if !directories.contains(&dir) {
            directories.push(dir);
        }
    }
    directories
}

/// Locale preferences from the POSIX locale variables.
///
/// `LANGUAGE` is a colon-separated list and comes first; then the first of
/// `LC_ALL`, `LC_MESSAGES`, `LANG` that is set. Encodings and modifiers are
/// stripped and the `C`/`POSIX` locales are dropped.
///
/// ```
/// use mimekit::config::locale_preferences;
///
/// assert_eq!(
///     locale_preferences(Some("fr_CA:fr"), None, None, Some("de_DE.UTF-8")),
///     ["fr_CA", "fr", "de_DE"]
/// );
/// assert!(locale_preferences(None, Some("C"), None, None).is_empty());
/// ```
pub fn locale_preferences(
    language: Option<&str>,
    lc_all: Option<&str>,
    lc_messages: Option<&str>,
    lang: Option<&str>,
) -> Vec<String> {
    let primary = [lc_all, lc_messages, lang]
        .into_iter()
        .flatten()
        .find(|v| !v.is_empty());
    let mut locales: Vec<String> = Vec::new();
    for raw in language
        .into_iter()
        .flat_map(|l| l.split(':'))
        .chain(primary)
    {
        let locale = raw.split(['.', '@']).next().unwrap_or_default();
        if locale.is_empty() || locale == "C" || locale == "POSIX" {
            continue;
        }
        if !locales.iter().any(|l| l == locale) {
            locales.push(locale.to_string());
        }
    }
    locales
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = DatabaseOptions::default();
        assert!(options.directories.is_empty());
        assert_eq!(options.recheck_interval, Duration::from_secs(5));
        assert!(options.binary_cache);
        assert!(options.builtin_fallback);
    }

    #[test]
    fn test_builder() {
        let options = DatabaseOptions::new()
            .with_directories(["/a/mime", "/b/mime"])
            .with_recheck_interval(Duration::ZERO)
            .with_builtin_fallback(false)
            .with_locales(["de_AT"]);
        assert_eq!(options.directories[1], PathBuf::from("/b/mime"));
        assert_eq!(options.recheck_interval, Duration::ZERO);
        assert!(!options.builtin_fallback);
        assert_eq!(options.locales, ["de_AT"]);
    }

    #[test]
    fn test_default_data_dirs() {
        let dirs = mime_directories(None, None);
        assert_eq!(
            dirs,
            [PathBuf::from("/usr/local/share/mime"), PathBuf::from("/usr/share/mime")]
        );
        assert_eq!(mime_directories(None, Some("")), dirs);
    }

    #[test]
    fn test_locale_fallbacks() {
        assert_eq!(
            locale_preferences(None, None, Some("pt_BR@euro"), Some("en_US.UTF-8")),
            ["pt_BR"]
        );
        assert_eq!(
            locale_preferences(Some("sv::sv"), Some(""), None, Some("POSIX")),
            ["sv"]
        );
    }
}
