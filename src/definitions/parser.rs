//! `<mime-info>` document parser.

use std::fs;
use std::path::Path;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::warn;

use super::{Definitions, TypeDefinition};
use crate::common::xml::{resolve_entity, unescape_text};
use crate::common::{Error, Result};
use crate::glob::DEFAULT_WEIGHT;
use crate::magic::{DEFAULT_PRIORITY, MagicRule, MagicRuleMatcher};

/// Read and parse one definition file.
pub fn load_definition_file(path: &Path) -> Result<Definitions> {
    let text = fs::read_to_string(path)?;
    parse_definitions(&text)
}

/// Parse a `<mime-info>` document.
///
/// Unsupported or malformed `<match>` rules are skipped together with their
/// sub-rules; everything else in the document still applies. A document that
/// is not well-formed XML, or whose root is not `<mime-info>`, is an error.
pub fn parse_definitions(xml: &str) -> Result<Definitions> {
    let mut reader = Reader::from_str(xml);
    let mut state = ParseState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(ref e) => state.open(e)?,
            Event::Empty(ref e) => {
                state.open(e)?;
                state.close(e.local_name().as_ref());
            },
            Event::End(ref e) => state.close(e.local_name().as_ref()),
            Event::Text(ref t) => {
                if let Some((_, text)) = state.comment.as_mut() {
                    text.push_str(&unescape_text(&String::from_utf8_lossy(t)));
                }
            },
            Event::GeneralRef(ref r) => {
                if let Some((_, text)) = state.comment.as_mut() {
                    let name = String::from_utf8_lossy(r);
                    match resolve_entity(&name) {
                        Some(c) => text.push(c),
                        None => {
                            text.push('&');
                            text.push_str(&name);
                            text.push(';');
                        },
                    }
                }
            },
            Event::CData(ref c) => {
                if let Some((_, text)) = state.comment.as_mut() {
                    text.push_str(&String::from_utf8_lossy(c));
                }
            },
            Event::Eof => break,
            _ => {},
        }
        buf.clear();
    }

    state.finish()
}

#[derive(Default)]
struct ParseState {
    definitions: Definitions,
    seen_root: bool,
    depth: usize,
    current: Option<TypeDefinition>,
    /// Open `<comment>`: (locale, text so far).
    comment: Option<(String, String)>,
    magic: Option<MagicRuleMatcher>,
    /// Open `<match>` elements; `None` marks a rejected rule whose subtree
    /// is dropped.
    matches: Vec<Option<MagicRule>>,
}

impl ParseState {
    fn open(&mut self, e: &BytesStart) -> Result<()> {
        let name = e.local_name();
        let name = name.as_ref();
        self.depth += 1;

        if !self.seen_root {
            if name != b"mime-info" {
                return Err(Error::InvalidDefinition(format!(
                    "root element is <{}>, expected <mime-info>",
                    String::from_utf8_lossy(name)
                )));
            }
            self.seen_root = true;
            return Ok(());
        }

        match name {
            b"mime-type" => match attribute(e, b"type")? {
                Some(type_name) => self.current = Some(TypeDefinition::new(type_name)),
                None => {
                    warn!("<mime-type> without a type attribute");
                    self.current = None;
                },
            },
            b"match" => self.open_match(e)?,
            b"magic" => {
                let priority = attribute(e, b"priority")?
                    .and_then(|p| p.trim().parse().ok())
                    .unwrap_or(DEFAULT_PRIORITY);
                self.magic = self
                    .current
                    .as_ref()
                    .map(|t| MagicRuleMatcher::new(t.name(), priority));
            },
            _ => self.open_type_child(name, e)?,
        }
        Ok(())
    }

    /// Children of `<mime-type>` that carry all their data in attributes
    /// (plus `<comment>`, whose text is collected until its end tag).
    fn open_type_child(&mut self, name: &[u8], e: &BytesStart) -> Result<()> {
        let Some(current) = self.current.as_mut() else {
            return Ok(());
        };
        match name {
            b"comment" => {
                let lang = attribute(e, b"xml:lang")?.unwrap_or_default();
                self.comment = Some((lang, String::new()));
            },
            b"icon" => {
                if let Some(icon) = attribute(e, b"name")? {
                    current.set_icon(icon);
                }
            },
            b"generic-icon" => {
                if let Some(icon) = attribute(e, b"name")? {
                    current.set_generic_icon(icon);
                }
            },
            b"glob" => {
                let Some(pattern) = attribute(e, b"pattern")? else {
                    warn!(mime_type = current.name(), "<glob> without a pattern");
                    return Ok(());
                };
                let weight = attribute(e, b"weight")?
                    .and_then(|w| w.trim().parse().ok())
                    .unwrap_or(DEFAULT_WEIGHT);
                let case_sensitive = attribute(e, b"case-sensitive")?.is_some_and(|v| v == "true");
                current.add_glob(&pattern, weight, case_sensitive);
            },
            b"glob-deleteall" => current.delete_all_globs(),
            b"magic-deleteall" => current.delete_all_magic(),
            b"sub-class-of" => {
                if let Some(parent) = attribute(e, b"type")? {
                    let child = current.name().to_string();
                    self.definitions.add_parent(&child, &parent);
                }
            },
            b"alias" => {
                if let Some(alias) = attribute(e, b"type")? {
                    let canonical = current.name().to_string();
                    self.definitions.add_alias(&alias, &canonical);
                }
            },
            // treemagic, root-XML, acronyms and anything unknown
            _ => {},
        }
        Ok(())
    }

    fn open_match(&mut self, e: &BytesStart) -> Result<()> {
        let parent_rejected = matches!(self.matches.last(), Some(None));
        if self.magic.is_none() || parent_rejected {
            self.matches.push(None);
            return Ok(());
        }

        let kind = attribute(e, b"type")?.unwrap_or_default();
        let value = attribute(e, b"value")?.unwrap_or_default();
        let offset = attribute(e, b"offset")?.unwrap_or_default();
        let mask = attribute(e, b"mask")?;
        match MagicRule::parse(&kind, &value, &offset, mask.as_deref()) {
            Ok(rule) => self.matches.push(Some(rule)),
            Err(err) => {
                warn!(
                    mime_type = self.magic.as_ref().map(|m| m.mime_type()),
                    error = %err,
                    "skipping magic rule"
                );
                self.matches.push(None);
            },
        }
        Ok(())
    }

    fn close(&mut self, name: &[u8]) {
        self.depth = self.depth.saturating_sub(1);
        match name {
            b"match" => {
                let Some(Some(rule)) = self.matches.pop() else {
                    return;
                };
                match self.matches.last_mut() {
                    Some(Some(parent)) => parent.push_child(rule),
                    Some(None) => {},
                    None => {
                        if let Some(magic) = self.magic.as_mut() {
                            magic.add_rule(rule);
                        }
                    },
                }
            },
            b"magic" => {
                self.matches.clear();
                if let Some(magic) = self.magic.take()
                    && !magic.is_empty()
                    && let Some(current) = self.current.as_mut()
                {
                    current.add_magic(magic);
                }
            },
            b"comment" => {
                if let Some((lang, text)) = self.comment.take()
                    && let Some(current) = self.current.as_mut()
                {
                    current.set_comment(&lang, text.trim());
                }
            },
            b"mime-type" => {
                if let Some(current) = self.current.take() {
                    self.definitions.insert(current);
                }
            },
            _ => {},
        }
    }

    fn finish(self) -> Result<Definitions> {
        if !self.seen_root {
            return Err(Error::InvalidDefinition("missing <mime-info> root".to_string()));
        }
        if self.depth != 0 {
            return Err(Error::InvalidDefinition("unexpected end of document".to_string()));
        }
        Ok(self.definitions)
    }
}

/// Fetch and unescape an attribute by its qualified name.
fn attribute(e: &BytesStart, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mime-info xmlns="http://www.freedesktop.org/standards/shared-mime-info">
  <mime-type type="application/pdf">
    <comment>PDF document</comment>
    <comment xml:lang="de">PDF-Dokument</comment>
    <comment xml:lang="fr">document PDF &amp; co</comment>
    <generic-icon name="x-office-document"/>
    <alias type="application/x-pdf"/>
    <glob pattern="*.pdf"/>
    <glob pattern="*.PDF" case-sensitive="true" weight="40"/>
    <magic priority="50">
      <match type="string" value="%PDF-" offset="0:1024"/>
    </magic>
  </mime-type>
  <mime-type type="application/vnd.oasis.opendocument.text">
    <sub-class-of type="application/zip"/>
    <magic priority="70">
      <match type="string" value="PK\003\004" offset="0">
        <match type="regex" value="mimetype.*" offset="30">
          <match type="string" value="never" offset="38"/>
        </match>
        <match type="string" value="mimetypeapplication/vnd.oasis.opendocument.text" offset="30"/>
      </match>
    </magic>
    <treemagic>
      <treematch path="content.xml" type="file"/>
    </treemagic>
  </mime-type>
</mime-info>
"#;

    #[test]
    fn test_parse_sample() {
        let defs = parse_definitions(SAMPLE).unwrap();
        assert_eq!(defs.len(), 2);

        let pdf = defs.get("application/pdf").unwrap();
        assert_eq!(pdf.comments().get(""), Some(&"PDF document".to_string()));
        assert_eq!(pdf.comments().get("de"), Some(&"PDF-Dokument".to_string()));
        assert_eq!(pdf.comments().get("fr"), Some(&"document PDF & co".to_string()));
        assert_eq!(pdf.generic_icon(), Some("x-office-document"));
        assert_eq!(pdf.icon(), None);
        assert_eq!(pdf.patterns(), ["*.pdf", "*.PDF"]);
        assert!(pdf.globs()[1].is_case_sensitive());
        assert_eq!(pdf.globs()[1].weight(), 40);
        assert_eq!(pdf.magic().len(), 1);
        assert!(pdf.magic()[0].matches(b"garbage%PDF-1.7"));

        assert_eq!(defs.aliases().resolve("application/x-pdf"), Some("application/pdf"));
    }

    #[test]
    fn test_rejected_rule_keeps_siblings() {
        let defs = parse_definitions(SAMPLE).unwrap();
        let odt = defs.get("application/vnd.oasis.opendocument.text").unwrap();
        assert_eq!(
            defs.parents().explicit_parents(odt.name()),
            ["application/zip"]
        );
        let matcher = &odt.magic()[0];
        assert_eq!(matcher.priority(), 70);
        assert_eq!(matcher.rules().len(), 1);
        // The regex child (and its own child) are gone; the sibling stays.
        assert_eq!(matcher.rules()[0].children().len(), 1);

        let mut data = b"PK\x03\x04".to_vec();
        data.resize(30, 0);
        data.extend_from_slice(b"mimetypeapplication/vnd.oasis.opendocument.text");
        assert!(matcher.matches(&data));
    }

    #[test]
    fn test_rejects_foreign_root() {
        assert!(matches!(
            parse_definitions("<html><body/></html>"),
            Err(Error::InvalidDefinition(_))
        ));
        assert!(matches!(parse_definitions(""), Err(Error::InvalidDefinition(_))));
    }

    #[test]
    fn test_malformed_document() {
        assert!(parse_definitions("<mime-info><mime-type type=\"a/b\"></mime-info>").is_err());
    }

    #[test]
    fn test_deleteall_flags() {
        let defs = parse_definitions(
            r#"<mime-info>
                 <mime-type type="text/x-c">
                   <glob-deleteall/>
                   <magic-deleteall/>
                   <glob pattern="*.c"/>
                 </mime-type>
               </mime-info>"#,
        )
        .unwrap();
        let mut base = Definitions::new();
        let mut old = TypeDefinition::new("text/x-c");
        old.add_glob("*.h", 50, false);
        base.insert(old);
        base.merge(defs);
        assert_eq!(base.get("text/x-c").unwrap().patterns(), ["*.c"]);
    }

    #[test]
    fn test_type_without_name_is_skipped() {
        let defs = parse_definitions(
            r#"<mime-info><mime-type><glob pattern="*.x"/></mime-type></mime-info>"#,
        )
        .unwrap();
        assert!(defs.is_empty());
    }
}
