//! Compile a mime directory's package files into the files the binary cache
//! provider reads.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use crate::cache::CacheWriter;
use crate::common::error::{Error, Result};
use crate::common::xml::escape_xml;
use crate::definitions::{Definitions, TypeDefinition, load_files, package_files};
use crate::glob::DEFAULT_WEIGHT;
use crate::provider::detail_file;

const NAMESPACE: &str = "http://www.freedesktop.org/standards/shared-mime-info";

/// What [`compile_directory`] wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileReport {
    pub types: usize,
    pub globs: usize,
    pub magic: usize,
}

/// Parse `mime_dir/packages/*.xml` and write the per-type
/// `<media>/<subtype>.xml` detail files, `types` and `mime.cache` into
/// `mime_dir`. The cache is replaced last.
///
/// Types whose name is not a plain `media/subtype` pair get no detail file.
///
/// Package files that fail to parse are skipped with a warning, as they are
/// when loaded directly.
pub fn compile_directory(mime_dir: impl AsRef<Path>) -> Result<CompileReport> {
    let mime_dir = mime_dir.as_ref();
    let files = package_files(mime_dir);
    if files.is_empty() {
        return Err(Error::InvalidDefinition(format!(
            "no package files under {}",
            mime_dir.join("packages").display()
        )));
    }
    let definitions = load_files(files.iter().map(|p| p.as_path()));

    for definition in definitions.types() {
        let Some(path) = detail_file(mime_dir, definition.name()) else {
            warn!(name = definition.name(), "type name is not a media/subtype pair, no detail file written");
            continue;
        };
        if let Some(media_dir) = path.parent() {
            fs::create_dir_all(media_dir)?;
        }
        fs::write(&path, detail_document(&definitions, definition))?;
    }

    let mut types = String::new();
    for name in definitions.names() {
        types.push_str(name);
        types.push('\n');
    }
    fs::write(mime_dir.join("types"), types)?;

    CacheWriter::new(&definitions).write_to(mime_dir.join("mime.cache"))?;

    let report = CompileReport {
        types: definitions.len(),
        globs: definitions.types().map(|t| t.globs().len()).sum(),
        magic: definitions.types().map(|t| t.magic().len()).sum(),
    };
    debug!(dir = %mime_dir.display(), ?report, "compiled mime directory");
    Ok(report)
}

/// A standalone definition document for one type, without its magic.
fn detail_document(definitions: &Definitions, definition: &TypeDefinition) -> String {
    let name = definition.name();
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(xml, "<mime-info xmlns=\"{NAMESPACE}\">");
    let _ = writeln!(xml, "  <mime-type type=\"{}\">", escape_xml(name));

    for (locale, text) in definition.comments() {
        if locale.is_empty() {
            let _ = writeln!(xml, "    <comment>{}</comment>", escape_xml(text));
        } else {
            let _ = writeln!(
                xml,
                "    <comment xml:lang=\"{}\">{}</comment>",
                escape_xml(locale),
                escape_xml(text)
            );
        }
    }
    if let Some(icon) = definition.icon() {
        let _ = writeln!(xml, "    <icon name=\"{}\"/>", escape_xml(icon));
    }
    if let Some(icon) = definition.generic_icon() {
        let _ = writeln!(xml, "    <generic-icon name=\"{}\"/>", escape_xml(icon));
    }
    for (pattern, glob) in definition.patterns().iter().zip(definition.globs()) {
        let _ = write!(xml, "    <glob pattern=\"{}\"", escape_xml(pattern));
        if glob.weight() != DEFAULT_WEIGHT {
            let _ = write!(xml, " weight=\"{}\"", glob.weight());
        }
        if glob.is_case_sensitive() {
            xml.push_str(" case-sensitive=\"true\"");
        }
        xml.push_str("/>\n");
    }
    for parent in definitions.parents().explicit_parents(name) {
        let _ = writeln!(xml, "    <sub-class-of type=\"{}\"/>", escape_xml(parent));
    }
    for alias in definitions.aliases().aliases_of(name) {
        let _ = writeln!(xml, "    <alias type=\"{}\"/>", escape_xml(&alias));
    }

    xml.push_str("  </mime-type>\n</mime-info>\n");
    xml
}
