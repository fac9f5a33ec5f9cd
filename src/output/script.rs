//! Shell script generation for comparison results.
//!
//! The script replays the moves found between two manifests and lists
//! duplicate files as commented-out `rm` lines for manual review. Every
//! emitted line is also echoed to the console through [`Tee`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use treesum::output::script::{ScriptOutput, Tee};
//!
//! let mut tee = Tee::new("treesum_script.sh", std::io::stdout());
//! ScriptOutput::new(&comparison).write_to(&mut tee)?;
//! tee.finish()?;
//! ```

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::compare::Comparison;
use crate::manifest::escape::decode_bytes;

/// Default script file name, created in the current directory.
pub const DEFAULT_SCRIPT_NAME: &str = "treesum_script.sh";

/// Writes each line to the console and to a script file created on first use.
pub struct Tee<W: Write> {
    script_path: PathBuf,
    script: Option<BufWriter<File>>,
    console: W,
    lines: usize,
}

impl<W: Write> Tee<W> {
    /// Create a tee; nothing touches the filesystem until the first line.
    pub fn new(script_path: impl Into<PathBuf>, console: W) -> Self {
        Self {
            script_path: script_path.into(),
            script: None,
            console,
            lines: 0,
        }
    }

    /// Path of the script file.
    #[must_use]
    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    /// Lines emitted so far.
    #[must_use]
    pub fn lines(&self) -> usize {
        self.lines
    }

    fn script(&mut self) -> std::io::Result<&mut BufWriter<File>> {
        if self.script.is_none() {
            let file = File::create(&self.script_path).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!("cannot create {}: {}", self.script_path.display(), e),
                )
            })?;
            let mut writer = BufWriter::new(file);
            writeln!(writer, "#!/bin/sh")?;
            writeln!(
                writer,
                "# Generated by treesum on {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            )?;
            log::debug!("Created script {}", self.script_path.display());
            self.script = Some(writer);
        }
        self.script
            .as_mut()
            .ok_or_else(|| std::io::Error::other("script writer unavailable"))
    }

    /// Emit one line to both destinations.
    ///
    /// # Errors
    ///
    /// Returns an error if the script cannot be created or either write fails.
    pub fn emit(&mut self, line: &str) -> std::io::Result<()> {
        writeln!(self.script()?, "{line}")?;
        writeln!(self.console, "{line}")?;
        self.lines += 1;
        Ok(())
    }

    /// Flush both destinations and return the script path if one was written.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> std::io::Result<Option<PathBuf>> {
        self.console.flush()?;
        match self.script.take() {
            Some(mut script) => {
                script.flush()?;
                Ok(Some(self.script_path))
            }
            None => Ok(None),
        }
    }
}

/// Formatter for the move script and duplicate report.
pub struct ScriptOutput<'a> {
    comparison: &'a Comparison,
}

impl<'a> ScriptOutput<'a> {
    /// Create a new script output formatter.
    #[must_use]
    pub fn new(comparison: &'a Comparison) -> Self {
        Self { comparison }
    }

    /// Write the "only in" listings. These go to the console only.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_listing<W: Write>(
        &self,
        writer: &mut W,
        left_name: &str,
        right_name: &str,
    ) -> std::io::Result<()> {
        if !self.comparison.has_right {
            return Ok(());
        }
        for (name, paths) in [
            (left_name, &self.comparison.only_in_left),
            (right_name, &self.comparison.only_in_right),
        ] {
            if paths.is_empty() {
                continue;
            }
            writeln!(writer)?;
            writeln!(writer, "# Those files only exist in {name}")?;
            for path in paths {
                writeln!(writer, "{path}")?;
            }
        }
        Ok(())
    }

    /// Write move commands and the duplicate report through `tee`.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, tee: &mut Tee<W>) -> std::io::Result<()> {
        self.write_commands(tee)?;
        self.write_duplicates(tee)
    }

    /// Write the move commands, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_commands<W: Write>(&self, tee: &mut Tee<W>) -> std::io::Result<()> {
        let commands = &self.comparison.commands;
        if commands.is_empty() {
            return Ok(());
        }

        tee.emit("")?;
        tee.emit("# Commands to execute in console:")?;
        if !commands.mkdirs.is_empty() {
            tee.emit("")?;
            tee.emit("# mkdir statements.")?;
            for line in &commands.mkdirs {
                tee.emit(line)?;
            }
        }
        tee.emit("")?;
        tee.emit("# mv statements.")?;
        for line in &commands.moves {
            tee.emit(line)?;
        }
        if !commands.rmdirs.is_empty() {
            tee.emit("")?;
            tee.emit("# Directories possibly empty from now. Please check.")?;
            for line in commands.rmdirs.iter().rev() {
                tee.emit(&format!("#{line}"))?;
            }
        }
        Ok(())
    }

    /// Write the duplicate report, if any digest repeats.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_duplicates<W: Write>(&self, tee: &mut Tee<W>) -> std::io::Result<()> {
        let groups = &self.comparison.duplicates;
        if groups.is_empty() {
            return Ok(());
        }

        tee.emit("")?;
        tee.emit("# Those files are repeated. You can remove one or many of them if you wish:")?;
        tee.emit("# (Note: if the inode is the same, there is no space wasted)")?;
        for group in groups {
            tee.emit("")?;
            tee.emit(&format!("# Key: {} - Size: {}", group.digest, group.size))?;
            let removals: std::collections::BTreeSet<String> = group
                .members
                .iter()
                .map(|r| format!("# rm {} # inode: {}", shell_quote(&r.path()), r.inode))
                .collect();
            for line in &removals {
                tee.emit(line)?;
            }
        }
        Ok(())
    }
}

/// Quote an escaped manifest path for a POSIX shell.
///
/// Plain text is single-quoted. Names holding control characters or bytes
/// that are not UTF-8 use `$'...'` quoting so the exact bytes survive.
#[must_use]
pub fn shell_quote(escaped: &str) -> String {
    let bytes = decode_bytes(escaped);
    match std::str::from_utf8(&bytes) {
        Ok(text) if !text.chars().any(char::is_control) => escape_posix(text),
        _ => escape_ansi_c(&bytes),
    }
}

fn escape_posix(s: &str) -> String {
    // Wrap in single quotes, escape single quotes as '\''
    format!("'{}'", s.replace('\'', "'\\''"))
}

fn escape_ansi_c(bytes: &[u8]) -> String {
    let mut out = String::from("$'");
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '\'' => out.push_str("\\'"),
                '\\' => out.push_str("\\\\"),
                c if c.is_control() && (c as u32) < 0x80 => {
                    let _ = write!(out, "\\x{:02x}", c as u32);
                }
                c => out.push(c),
            }
        }
        for byte in chunk.invalid() {
            let _ = write!(out, "\\x{byte:02x}");
        }
    }
    out.push('\'');
    out
}
