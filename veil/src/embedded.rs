//! Embedded copies of the standard function definitions.
//!
//! Every file in the crate's `functions/` directory, manifest included, is
//! baked into the binary at compile time via `include_str!()`.  The binary
//! therefore runs scripts without any installed definition directory.
//!
//! # Resolution order (see `config::Config::functions`)
//! 1. `--functions <dir>` CLI flag   → load from that directory on disk
//! 2. `$VEIL_FUNCTIONS` env var      → load from that directory on disk
//! 3. **These embedded files**       → load from the binary (no disk access)

/// Name of the manifest inside a definition directory.
pub const MANIFEST_NAME: &str = "manifest.json";

/// A single embedded definition file.
pub struct EmbeddedFile {
    pub name: &'static str,
    pub content: &'static str,
}

/// The embedded manifest.
pub static EMBEDDED_MANIFEST: &str = include_str!("../functions/manifest.json");

/// All embedded definition files from `functions/`.
pub static EMBEDDED_FUNCTIONS: &[EmbeddedFile] = &[
    EmbeddedFile { name: "let.fn",          content: include_str!("../functions/let.fn") },
    EmbeddedFile { name: "const.fn",        content: include_str!("../functions/const.fn") },
    EmbeddedFile { name: "print.fn",        content: include_str!("../functions/print.fn") },
    EmbeddedFile { name: "printS.fn",       content: include_str!("../functions/printS.fn") },
    EmbeddedFile { name: "dump.fn",         content: include_str!("../functions/dump.fn") },
    EmbeddedFile { name: "appendToBody.fn", content: include_str!("../functions/appendToBody.fn") },
    EmbeddedFile { name: "if.fn",           content: include_str!("../functions/if.fn") },
    EmbeddedFile { name: "elseif.fn",       content: include_str!("../functions/elseif.fn") },
    EmbeddedFile { name: "else.fn",         content: include_str!("../functions/else.fn") },
    EmbeddedFile { name: "closebrace.fn",   content: include_str!("../functions/closebrace.fn") },
];

/// Look up an embedded file by name.
///
/// `name` should be a bare filename (e.g. `"print.fn"`), not a path.
pub fn get_embedded(name: &str) -> Option<&'static str> {
    EMBEDDED_FUNCTIONS
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.content)
}
