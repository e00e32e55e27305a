//! The aqc-facing engine: locate the executable, scrape its command
//! catalog out of `--help` output, and run invocations as child processes.
//!
//! Layout:
//!   locator.rs  - search-path + fallback lookup with a --help probe
//!   catalog.rs  - help-text parsing into a command/subcommand catalog
//!   invoke.rs   - argument marshalling, timed child runs, result text

pub mod catalog;
pub mod invoke;
pub mod locator;

pub use locator::AqcBinary;

/// Help flag understood by aqc at every command level.
pub const HELP_FLAG: &str = "--help";
