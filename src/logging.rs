//! `env_logger` setup.
//!
//! `RUST_LOG`, when set, decides the filter. Otherwise `-q` shows errors
//! only, `-v` debug, `-vv` trace, and the default is info.
//!
//! Lines logged from a hashing worker carry the worker's thread name
//! (`treesum-worker-N`), so interleaved output can be told apart. Debug
//! builds add a timestamp and, with `-v`, the module path.
//!
//! ```rust,no_run
//! use treesum::logging::init_logging;
//!
//! init_logging(1, false); // -v
//! log::debug!("visible");
//! ```

use std::io::Write;

use env_logger::fmt::Formatter;
use env_logger::Builder;
use log::{LevelFilter, Record};

/// Set up the global logger.
///
/// Later calls are ignored, so running the app several times in one
/// process is fine.
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = std::env::var_os("RUST_LOG").is_some();

    let mut builder = Builder::new();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level_for(verbose, quiet));
    }
    let with_module = verbose > 0;
    builder.format(move |buf, record| write_line(buf, record, with_module));

    if builder.try_init().is_ok() {
        log::debug!(
            "Log level {} (from {})",
            log::max_level(),
            if from_env { "RUST_LOG" } else { "flags" }
        );
    }
}

fn level_for(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

/// Name shown for worker threads; `None` on the main and unnamed threads.
fn worker_tag() -> Option<String> {
    std::thread::current()
        .name()
        .filter(|name| name.starts_with("treesum-"))
        .map(str::to_string)
}

fn write_line(buf: &mut Formatter, record: &Record<'_>, with_module: bool) -> std::io::Result<()> {
    let level = record.level();
    let style = buf.default_level_style(level);

    if cfg!(debug_assertions) {
        write!(buf, "{} ", buf.timestamp_seconds())?;
    }
    write!(buf, "{style}{level:<5}{style:#} ")?;

    if cfg!(debug_assertions) && with_module {
        write!(buf, "[{}] ", record.module_path().unwrap_or("?"))?;
    }
    if let Some(tag) = worker_tag() {
        write!(buf, "({tag}) ")?;
    }
    writeln!(buf, "{}", record.args())
}
