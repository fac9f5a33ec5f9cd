//! Reversible escaping of path components for the manifest text format.
//!
//! The manifest is a pipe-delimited, line-oriented UTF-8 file, so a path
//! component must never contain `|`, `\n` or `\r` once written. Names that
//! are not valid UTF-8 are preserved byte for byte.
//!
//! | input                    | written as |
//! |--------------------------|------------|
//! | `\`                      | `\\`       |
//! | `|`                      | `\x7c`     |
//! | line feed                | `\x0a`     |
//! | carriage return          | `\x0d`     |
//! | byte of invalid UTF-8    | `\xNN`     |
//!
//! Any other backslash sequence is kept literally on decode, which lets
//! manifests written by older releases load unchanged.

use std::ffi::{OsStr, OsString};
use std::fmt::Write as _;
use std::path::{Component, Path};

/// Escape one raw path component.
#[must_use]
pub fn encode_component(raw: &OsStr) -> String {
    encode_bytes(raw.as_encoded_bytes())
}

/// Escape an arbitrary byte string.
#[must_use]
pub fn encode_bytes(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                '|' => out.push_str("\\x7c"),
                '\n' => out.push_str("\\x0a"),
                '\r' => out.push_str("\\x0d"),
                other => out.push(other),
            }
        }
        for byte in chunk.invalid() {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    out
}

/// Reverse [`encode_bytes`].
#[must_use]
pub fn decode_bytes(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            match bytes.get(i + 1) {
                Some(b'\\') => {
                    out.push(b'\\');
                    i += 2;
                    continue;
                }
                Some(b'x') => {
                    if let Some(byte) = bytes.get(i + 2..i + 4).and_then(parse_hex_pair) {
                        out.push(byte);
                        i += 4;
                        continue;
                    }
                }
                _ => {}
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

fn parse_hex_pair(pair: &[u8]) -> Option<u8> {
    let text = std::str::from_utf8(pair).ok()?;
    u8::from_str_radix(text, 16).ok()
}

/// Reverse [`encode_component`] into an OS string.
#[must_use]
pub fn decode_component(text: &str) -> OsString {
    let bytes = decode_bytes(text);
    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStringExt;
        OsString::from_vec(bytes)
    }
    #[cfg(not(unix))]
    {
        OsString::from(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Manifest form of a directory relative to the walk root.
///
/// Components are escaped individually and joined with `/`. The root
/// itself is written as `"."`.
#[must_use]
pub fn encode_relative_dir(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(encode_component(name)),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

/// Rebuild a filesystem path under `root` from manifest `directory`/`filename`.
#[must_use]
pub fn decode_path(root: &Path, directory: &str, filename: &str) -> std::path::PathBuf {
    let mut path = root.to_path_buf();
    if directory != "." {
        for part in directory.split('/') {
            path.push(decode_component(part));
        }
    }
    path.push(decode_component(filename));
    path
}
