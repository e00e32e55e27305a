/*!
Child-process invocation: argument marshalling, a timed runner, and the
composite text rendering handed back to the caller.

Focus:
  - command_argv / raw_argv: the two marshalling paths
  - run: spawn, capture both streams, enforce a timeout
  - InvocationOutcome::render: the payload format agents see

Two paths build an argument vector. The catalog-derived path assembles
`[bin, command, subcommand?, ...option flags, ...positionals]`; the
generic path splits a raw command line with shell rules and performs no
flag synthesis at all.
*/

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::process::Command;

/// Timeout applied to catalog-derived invocations; the generic path takes
/// a caller-supplied value defaulting to this.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const OPTION_PREFIX: &str = "--";

/// Captured result of one child-process run.
///
/// Exactly one of the two shapes holds: normal completion with an exit
/// status, or `timed_out` with no exit code.
#[derive(Debug, Clone)]
pub struct InvocationOutcome {
    /// The exact argument vector that was invoked, executable first.
    pub command_line: Vec<String>,
    pub stdout: String,
    pub stderr: String,
    /// None when the child was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    timeout: Duration,
}

impl InvocationOutcome {
    /// Render the composite text payload: the invoked command line, an
    /// `Output:` block when stdout is non-empty, an `Errors:` block when
    /// stderr is non-empty, and the return code.
    pub fn render(&self) -> String {
        let command = self.command_line.join(" ");

        if self.timed_out {
            return format!(
                "Command: {command}\n\nCommand timed out after {} seconds",
                format_seconds(self.timeout)
            );
        }

        let mut text = format!("Command: {command}\n\n");
        if !self.stdout.is_empty() {
            text.push_str(&format!("Output:\n{}\n\n", self.stdout));
        }
        if !self.stderr.is_empty() {
            text.push_str(&format!("Errors:\n{}\n\n", self.stderr));
        }
        let code = match self.exit_code {
            Some(code) => code.to_string(),
            None => "terminated by signal".to_string(),
        };
        text.push_str(&format!("Return code: {code}"));
        text
    }
}

fn format_seconds(timeout: Duration) -> String {
    let secs = timeout.as_secs_f64();
    if secs.fract() == 0.0 {
        format!("{}", secs as u64)
    } else {
        format!("{secs}")
    }
}

/// Build the argument vector for a catalog-derived invocation.
///
/// Option keys already carrying the `--` prefix pass through unchanged,
/// anything else gets the prefix synthesized. Positional arguments land
/// last, in caller order, each coerced to its string form.
pub fn command_argv(
    bin: &Path,
    command: &str,
    subcommand: Option<&str>,
    options: &Map<String, Value>,
    arguments: &[Value],
) -> Vec<String> {
    let mut argv = vec![bin.to_string_lossy().into_owned(), command.to_string()];

    if let Some(subcommand) = subcommand {
        argv.push(subcommand.to_string());
    }

    for (key, value) in options {
        if key.starts_with(OPTION_PREFIX) {
            argv.push(key.clone());
        } else {
            argv.push(format!("{OPTION_PREFIX}{key}"));
        }
        argv.push(value_to_string(value));
    }

    argv.extend(arguments.iter().map(value_to_string));
    argv
}

/// Build the argument vector for the generic path: shell-split the raw
/// command line and append the tokens after the executable, verbatim.
pub fn raw_argv(bin: &Path, command_line: &str) -> Result<Vec<String>> {
    let tokens = shell_words::split(command_line)
        .with_context(|| format!("failed to split command line: '{command_line}'"))?;

    let mut argv = Vec::with_capacity(tokens.len() + 1);
    argv.push(bin.to_string_lossy().into_owned());
    argv.extend(tokens);
    Ok(argv)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Run an argument vector as a child process under a timeout.
///
/// Both output streams are captured independently; the environment is
/// inherited unchanged so aqc can resolve its own dependent executables
/// and config through it. On timeout the in-flight wait is dropped, which
/// kills the child (`kill_on_drop`) and leaves reaping to the runtime; no
/// orphan outlives the call.
pub async fn run(argv: &[String], timeout: Duration) -> Result<InvocationOutcome> {
    let (program, args) = argv.split_first().context("empty argument vector")?;

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command
        .spawn()
        .with_context(|| format!("failed to spawn {program}"))?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => {
            let output =
                output.with_context(|| format!("failed to collect output from {program}"))?;
            Ok(InvocationOutcome {
                command_line: argv.to_vec(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                timed_out: false,
                timeout,
            })
        }
        Err(_) => Ok(InvocationOutcome {
            command_line: argv.to_vec(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            timed_out: true,
            timeout,
        }),
    }
}
