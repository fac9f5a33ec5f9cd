//! Manifest line codec.
//!
//! A record line has seven pipe-separated fields:
//!
//! ```text
//! identity_key|digest|directory|filename|size|inode|mtime
//! ```
//!
//! Six-field lines from older releases (no mtime) still decode, with the
//! mtime set to `0` so they are never trusted by the skip check.

use std::fmt;

use serde::Serialize;

/// Prefix of the optional first line naming the digest algorithm.
pub const HEADER_PREFIX: &str = "# Algorithm:";

/// Which line layout a record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum RecordFormat {
    /// Seven fields, including mtime.
    #[default]
    Current,
    /// Six fields, written before mtime was tracked.
    Legacy,
}

/// One manifest entry describing a single file.
///
/// `directory` and `filename` are held in escaped form, exactly as they
/// appear in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    /// Digest of `path|size|mtime`, used only as a cache lookup key
    pub identity_key: String,
    /// Hex digest of the file content
    pub digest: String,
    /// Escaped directory relative to the root, `"."` for the root
    pub directory: String,
    /// Escaped file name
    pub filename: String,
    /// Size in bytes
    pub size: u64,
    /// Inode number, `0` where the platform has none
    pub inode: u64,
    /// Modification time in fractional seconds since the Unix epoch
    pub mtime: f64,
    /// Line layout the record was decoded from
    pub format: RecordFormat,
}

impl FileRecord {
    /// Full display path, `directory/filename`.
    #[must_use]
    pub fn path(&self) -> String {
        format!("{}/{}", self.directory, self.filename)
    }

    /// Encode as a manifest line without the trailing newline.
    ///
    /// Legacy records keep their six-field layout so a decoded line encodes
    /// back to the same text.
    #[must_use]
    pub fn encode(&self) -> String {
        match self.format {
            RecordFormat::Current => format!(
                "{}|{}|{}|{}|{}|{}|{}",
                self.identity_key,
                self.digest,
                self.directory,
                self.filename,
                self.size,
                self.inode,
                self.mtime
            ),
            RecordFormat::Legacy => format!(
                "{}|{}|{}|{}|{}|{}",
                self.identity_key,
                self.digest,
                self.directory,
                self.filename,
                self.size,
                self.inode
            ),
        }
    }
}

impl fmt::Display for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A decoded manifest line.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    /// `# Algorithm: <name>` header.
    Header(String),
    /// A file record.
    Record(FileRecord),
    /// Blank line.
    Blank,
}

/// Reasons a line is skipped while loading.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The line does not split into six or seven fields.
    #[error("expected 6 or 7 fields, found {0}")]
    FieldCount(usize),

    /// A numeric field failed to parse.
    #[error("invalid {field} value '{value}'")]
    InvalidNumber {
        /// Field name
        field: &'static str,
        /// Raw text
        value: String,
    },
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T, DecodeError> {
    value.parse().map_err(|_| DecodeError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Decode one line (a trailing `\n` or `\r\n` is ignored).
///
/// # Errors
///
/// Returns [`DecodeError`] for lines that are neither blank, a header, nor
/// a well-formed six- or seven-field record. Callers skip such lines.
pub fn decode_line(line: &str) -> Result<Line, DecodeError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);

    if line.trim().is_empty() {
        return Ok(Line::Blank);
    }
    if let Some(name) = line.strip_prefix(HEADER_PREFIX) {
        return Ok(Line::Header(name.trim().to_string()));
    }

    let fields: Vec<&str> = line.split('|').collect();
    let format = match fields.len() {
        7 => RecordFormat::Current,
        6 => RecordFormat::Legacy,
        n => return Err(DecodeError::FieldCount(n)),
    };

    let size = parse_field("size", fields[4])?;
    let inode = parse_field("inode", fields[5])?;
    let mtime = match format {
        RecordFormat::Current => parse_field("mtime", fields[6])?,
        RecordFormat::Legacy => 0.0,
    };

    Ok(Line::Record(FileRecord {
        identity_key: fields[0].to_string(),
        digest: fields[1].to_string(),
        directory: fields[2].to_string(),
        filename: fields[3].to_string(),
        size,
        inode,
        mtime,
        format,
    }))
}

/// Encode the header line for `algorithm`, without the trailing newline.
#[must_use]
pub fn encode_header(algorithm: &str) -> String {
    format!("{HEADER_PREFIX} {algorithm}")
}
