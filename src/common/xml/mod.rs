//! XML helpers shared by the definition parser and writer.

pub mod escape;

pub use escape::{escape_xml, resolve_entity, unescape_text};
