/*!
Help-text scraping: turn `aqc --help` output into a structured catalog.

Focus:
  - parse_help_commands: section-header + indentation heuristic
  - discover: best-effort driver (top-level help, then one help call
    per discovered command)

Discovery never fails. Parse failures, subprocess failures, and timeouts
degrade to a partial or empty catalog and are reported on the log only;
the tool listing downstream must stay available regardless.

The parsing heuristic is the load-bearing assumption of the whole engine:
commands are indented exactly one level under a recognized section header,
their option/usage details further. If aqc changes its help layout,
discovery degrades to an empty catalog. No alternate layouts are guessed.
*/

use std::time::Duration;

use anyhow::{Result, bail};

use super::locator::AqcBinary;
use super::{HELP_FLAG, invoke};

/// Placeholder used when a help line carries no description segment.
pub const NO_DESCRIPTION: &str = "No description available";

/// Literal phrases that open a commands section in help output.
const SECTION_HEADERS: [&str; 2] = ["Commands:", "Available commands:"];

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// One discovered subcommand of a top-level command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subcommand {
    pub name: String,
    pub description: String,
}

/// One discovered top-level command.
#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub name: String,
    pub description: String,
    /// Empty when the command has no discoverable subcommands.
    pub subcommands: Vec<Subcommand>,
}

/// Ordered set of discovered commands. Names are unique; order is the
/// order the tool's help text reported them.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    entries: Vec<CommandEntry>,
}

impl CommandCatalog {
    /// Insert an entry. A duplicate name replaces the existing entry in
    /// place, keeping its original position.
    pub fn insert(&mut self, entry: CommandEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Extract `(name, description)` pairs from one help screen.
///
/// A line containing either section-header phrase opens the commands
/// section (it is never closed). Inside it, a non-blank line indented by
/// exactly one level (two spaces, not four) is a command entry: split on
/// the first whitespace run, remainder is the description.
pub fn parse_help_commands(help: &str) -> Vec<(String, String)> {
    let mut commands = Vec::new();
    let mut in_commands_section = false;

    for line in help.lines() {
        if SECTION_HEADERS.iter().any(|h| line.contains(h)) {
            in_commands_section = true;
            continue;
        }
        if !in_commands_section || line.trim().is_empty() {
            continue;
        }
        // One level of indentation marks a command name; anything deeper
        // is option/usage detail under it.
        if line.starts_with("  ") && !line.starts_with("    ") {
            let trimmed = line.trim();
            let (name, description) = match trimmed.split_once(char::is_whitespace) {
                Some((name, rest)) => (name.to_string(), rest.trim_start().to_string()),
                None => (trimmed.to_string(), NO_DESCRIPTION.to_string()),
            };
            commands.push((name, description));
        }
    }

    commands
}

/// Build the catalog by scraping `aqc --help` and, per command,
/// `aqc <command> --help`.
pub async fn discover(bin: &AqcBinary) -> CommandCatalog {
    let mut catalog = CommandCatalog::default();

    let help = match help_output(bin, None).await {
        Ok(text) => text,
        Err(e) => {
            log::warn!("command discovery failed: {e:#}");
            return catalog;
        }
    };

    for (name, description) in parse_help_commands(&help) {
        // A failure here affects this command only; siblings still get
        // their subcommands discovered.
        let subcommands = match help_output(bin, Some(name.as_str())).await {
            Ok(text) => parse_help_commands(&text)
                .into_iter()
                .map(|(name, description)| Subcommand { name, description })
                .collect(),
            Err(e) => {
                log::debug!("subcommand discovery for `{name}` failed: {e:#}");
                Vec::new()
            }
        };

        for sub in &subcommands {
            log::trace!("discovered {name} {}: {}", sub.name, sub.description);
        }

        catalog.insert(CommandEntry {
            name,
            description,
            subcommands,
        });
    }

    if catalog.is_empty() {
        log::warn!("no commands discovered; aqc help output may have changed layout");
    }

    catalog
}

/// Capture the help screen for the tool itself or one of its commands.
///
/// The exit status is deliberately ignored: some CLIs exit non-zero on
/// `--help`, and the text is what matters here.
async fn help_output(bin: &AqcBinary, command: Option<&str>) -> Result<String> {
    let mut argv = vec![bin.path().to_string_lossy().into_owned()];
    if let Some(command) = command {
        argv.push(command.to_string());
    }
    argv.push(HELP_FLAG.to_string());

    let outcome = invoke::run(&argv, DISCOVERY_TIMEOUT).await?;
    if outcome.timed_out {
        bail!(
            "`{}` did not finish within {}s",
            argv.join(" "),
            DISCOVERY_TIMEOUT.as_secs()
        );
    }
    Ok(outcome.stdout)
}
