//! Output formatters for comparison results.
//!
//! - [`script`]: move commands and duplicate report as a POSIX shell script,
//!   echoed to the console through [`Tee`]

pub mod script;

pub use script::{shell_quote, ScriptOutput, Tee, DEFAULT_SCRIPT_NAME};
