use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use rmcp::ServiceExt;
use rmcp::transport::stdio;

mod aqc;
mod mcp;

use mcp::AstroqueryService;

/// astroquery-mcp - MCP server for the aqc astronomy CLI.
///
/// Discovers aqc's commands from its --help output on every tools/list
/// request, so the exposed tool set follows the installed CLI without any
/// hard-coded command surface.
///
/// Global flags / env:
///   -v / -vv        Increase verbosity
///   -q / --quiet    Errors only
///   --aqc-bin PATH  Explicit aqc binary (or AQC_BIN env)
///
/// Example client configuration (.mcp.json):
///   { "mcpServers": { "astroquery": { "command": "astroquery-mcp" } } }
#[derive(Parser, Debug)]
#[command(
    name = "astroquery-mcp",
    version,
    author,
    about = "MCP server exposing the aqc (astroquery-cli) command set"
)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Silence all non-error output
    #[arg(short, long)]
    quiet: bool,

    /// Explicit path to the aqc binary (skips search-path lookup)
    #[arg(long = "aqc-bin", value_name = "PATH")]
    aqc_bin: Option<PathBuf>,
}

fn derive_filter(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // stdout carries the MCP protocol; logs go to stderr only.
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(derive_filter(cli.verbose, cli.quiet)),
    )
    .target(env_logger::Target::Stderr)
    .init();

    // Determine the effective binary override (CLI flag > AQC_BIN env).
    let explicit = cli.aqc_bin.or_else(|| {
        std::env::var_os("AQC_BIN")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    });

    // Location failure is the one fatal error; everything downstream is
    // contained per call.
    let bin = aqc::locator::locate(explicit).await?;
    log::info!("using aqc at {bin}");

    let service = AstroqueryService::new(bin);
    let server = service.serve(stdio()).await?;
    server.waiting().await?;

    log::info!("astroquery-mcp stopped");
    Ok(())
}
