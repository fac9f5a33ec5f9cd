//! Command-line interface definitions.
//!
//! ```bash
//! # Build a manifest of the current directory into .hashes
//! treesum generate
//!
//! # Refresh it, re-hashing only files whose size or mtime changed
//! treesum update
//!
//! # Replay moves from one snapshot to another and list duplicates
//! treesum compare before.hashes after.hashes
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::manifest::DEFAULT_MANIFEST_NAME;
use crate::scanner::Algorithm;

/// Content-addressed manifests of file trees.
///
/// treesum records a digest for every file under a directory, reuses digests
/// of unchanged files on later runs, and compares manifests to produce a
/// shell script replaying moves and a report of duplicate files.
#[derive(Debug, Parser)]
#[command(name = "treesum")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Do not draw progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true, value_name = "PATH", env = "TREESUM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Hash every file and write a fresh manifest
    Generate(HashArgs),
    /// Add records for new or changed files to an existing manifest
    Append(HashArgs),
    /// Rewrite the manifest, reusing digests of unchanged files
    Update(HashArgs),
    /// Compare two manifests, or report duplicates within one
    Compare(CompareArgs),
}

/// Arguments shared by generate, append and update.
#[derive(Debug, Args)]
pub struct HashArgs {
    /// Manifest file
    #[arg(value_name = "HASHFILE", default_value = DEFAULT_MANIFEST_NAME)]
    pub hashfile: PathBuf,

    /// Directory to hash
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub root: PathBuf,

    /// Digest algorithm (md5, sha1, sha256, sha512, blake2b, blake2s, blake3)
    #[arg(short, long, value_name = "NAME", value_parser = parse_algorithm)]
    pub algorithm: Option<Algorithm>,

    /// Number of hashing workers (default: one per CPU)
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Records written between flushes
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub write_frequency: Option<u64>,

    /// Accept an algorithm switch without asking
    #[arg(short = 'y', long)]
    pub yes: bool,
}

/// Arguments for the compare subcommand.
#[derive(Debug, Args)]
pub struct CompareArgs {
    /// Manifest to compare from
    #[arg(value_name = "HASHFILE", default_value = DEFAULT_MANIFEST_NAME)]
    pub hashfile: PathBuf,

    /// Manifest to compare to; without it only duplicates are reported
    #[arg(value_name = "OTHER")]
    pub other: Option<PathBuf>,

    /// Script file for move commands and the duplicate report
    #[arg(long, value_name = "PATH")]
    pub script: Option<PathBuf>,
}

/// Parse an algorithm name for clap.
///
/// # Errors
///
/// Returns the parse error message for unknown names.
pub fn parse_algorithm(s: &str) -> Result<Algorithm, String> {
    s.parse().map_err(|e: crate::scanner::hasher::UnknownAlgorithm| e.to_string())
}
