//! Locating the aqc executable.
//!
//! Lookup is two-tier: the process search path first, then the user-local
//! install dir (`~/.local/bin/aqc`), which pip/pipx favor and which is often
//! missing from the PATH a desktop MCP client inherits. Every candidate must
//! pass a short `--help` probe before it is accepted.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use super::{HELP_FLAG, invoke};

/// Program name looked up on the search path.
pub const AQC_PROGRAM: &str = "aqc";

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A resolved, probe-validated path to the aqc executable.
///
/// Established once at startup and never re-validated afterwards.
#[derive(Debug, Clone)]
pub struct AqcBinary {
    path: PathBuf,
}

impl AqcBinary {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Display for AqcBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[derive(Debug, Error)]
pub enum LocateError {
    /// An explicitly configured binary exists but failed its probe.
    #[error("`{}` at {} is not usable (--help probe failed)", AQC_PROGRAM, .path.display())]
    Unusable { path: PathBuf },

    /// Neither the search path nor the fallback produced a usable binary.
    #[error(
        "cannot find a usable `{}` executable; tried the search path and {}",
        AQC_PROGRAM,
        .fallback.display()
    )]
    NotFound { fallback: PathBuf },
}

/// Resolve the aqc binary.
///
/// An explicit path (from `--aqc-bin` or the `AQC_BIN` env) is probed as-is,
/// with no fallback: the operator asked for that binary specifically.
/// Otherwise the search path is consulted first, then `~/.local/bin/aqc`.
pub async fn locate(explicit: Option<PathBuf>) -> Result<AqcBinary, LocateError> {
    if let Some(path) = explicit {
        return if probe(&path).await {
            Ok(AqcBinary { path })
        } else {
            Err(LocateError::Unusable { path })
        };
    }

    match which::which(AQC_PROGRAM) {
        Ok(path) => {
            if probe(&path).await {
                return Ok(AqcBinary { path });
            }
            log::debug!("{} from the search path failed its probe", path.display());
        }
        Err(e) => log::debug!("search-path lookup for `{AQC_PROGRAM}` failed: {e}"),
    }

    let fallback = fallback_path();
    if probe(&fallback).await {
        return Ok(AqcBinary { path: fallback });
    }

    Err(LocateError::NotFound { fallback })
}

fn fallback_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".local/bin")
        .join(AQC_PROGRAM)
}

/// Run `<path> --help` and require a clean exit within the probe timeout.
async fn probe(path: &Path) -> bool {
    let argv = vec![
        path.to_string_lossy().into_owned(),
        HELP_FLAG.to_string(),
    ];
    match invoke::run(&argv, PROBE_TIMEOUT).await {
        Ok(outcome) => !outcome.timed_out && outcome.exit_code == Some(0),
        Err(e) => {
            log::debug!("probe of {} failed: {e:#}", path.display());
            false
        }
    }
}
