//! Minimal definitions compiled into the library.
//!
//! Used only when no definition file or cache can be found anywhere, so
//! that the core result types always exist.

use tracing::warn;

use super::{Definitions, parse_definitions};

pub const BUILTIN_DEFINITIONS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<mime-info xmlns="http://www.freedesktop.org/standards/shared-mime-info">
  <mime-type type="application/octet-stream">
    <comment>unknown</comment>
    <generic-icon name="application-x-executable"/>
  </mime-type>
  <mime-type type="text/plain">
    <comment>plain text document</comment>
    <glob pattern="*.txt"/>
    <glob pattern="*.asc"/>
    <glob pattern="*,v"/>
  </mime-type>
  <mime-type type="application/x-zerosize">
    <comment>empty document</comment>
  </mime-type>
  <mime-type type="inode/directory">
    <comment>folder</comment>
    <generic-icon name="folder"/>
  </mime-type>
  <mime-type type="inode/chardevice">
    <comment>character special file</comment>
  </mime-type>
  <mime-type type="inode/blockdevice">
    <comment>block special file</comment>
  </mime-type>
  <mime-type type="inode/fifo">
    <comment>pipe</comment>
  </mime-type>
  <mime-type type="inode/socket">
    <comment>socket</comment>
  </mime-type>
</mime-info>
"#;

/// Parse [`BUILTIN_DEFINITIONS_XML`].
pub fn builtin_definitions() -> Definitions {
    parse_definitions(BUILTIN_DEFINITIONS_XML).unwrap_or_else(|err| {
        warn!(error = %err, "built-in definitions failed to parse");
        Definitions::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_core_types() {
        let defs = builtin_definitions();
        for name in [
            "application/octet-stream",
            "text/plain",
            "application/x-zerosize",
            "inode/directory",
        ] {
            assert!(defs.contains(name), "{name}");
        }
        assert_eq!(defs.get("text/plain").unwrap().patterns()[0], "*.txt");
    }
}
