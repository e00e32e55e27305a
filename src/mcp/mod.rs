/*!
The MCP surface: tool descriptors derived from the live catalog, plus the
call router.

Tools exposed:
  astroquery_<command>  one per cataloged command, catalog order
  astroquery_execute    fixed generic escape hatch, always last

The tool list is recomputed from `aqc --help` on every tools/list request
rather than cached, so it reflects whatever is installed right now.
Everything downstream of listing is contained: a bad call yields an error
text payload, never a handler failure.
*/

use std::time::Duration;

use anyhow::{Context, Result, ensure};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::aqc::AqcBinary;
use crate::aqc::catalog::{self, CommandCatalog, CommandEntry};
use crate::aqc::invoke::{self, DEFAULT_TIMEOUT};

/// Prefix shared by every exposed tool name.
pub const TOOL_PREFIX: &str = "astroquery";

/// Suffix of the fixed generic tool (`astroquery_execute`).
const GENERIC_SUFFIX: &str = "execute";

fn tool_name(command: &str) -> String {
    format!("{TOOL_PREFIX}_{command}")
}

/// MCP service wrapping one resolved aqc binary.
#[derive(Debug, Clone)]
pub struct AstroqueryService {
    bin: AqcBinary,
}

impl AstroqueryService {
    pub fn new(bin: AqcBinary) -> Self {
        Self { bin }
    }
}

/* ---- Tool Descriptors ---- */

fn command_tool(entry: &CommandEntry) -> Value {
    let subcommands: Vec<&str> = entry.subcommands.iter().map(|s| s.name.as_str()).collect();
    json!({
        "name": tool_name(&entry.name),
        "description": format!("Execute aqc {} command: {}", entry.name, entry.description),
        "inputSchema": {
            "type": "object",
            "properties": {
                "subcommand": {
                    "type": "string",
                    "description": format!("Subcommand for {}", entry.name),
                    "enum": subcommands,
                },
                "arguments": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Additional arguments for the command",
                },
                "options": {
                    "type": "object",
                    "description": "Command options as key-value pairs",
                    "additionalProperties": { "type": "string" },
                },
            },
            "required": [],
        },
    })
}

fn execute_tool() -> Value {
    json!({
        "name": tool_name(GENERIC_SUFFIX),
        "description": "Execute any aqc command with full control",
        "inputSchema": {
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Full command to execute (without 'aqc' prefix)",
                },
                "timeout": {
                    "type": "number",
                    "description": "Command timeout in seconds (default: 30)",
                    "default": 30,
                },
            },
            "required": ["command"],
        },
    })
}

/// One tool object per cataloged command, catalog order, generic tool
/// appended last. Names are unique across the whole set.
fn tool_descriptors(catalog: &CommandCatalog) -> Vec<Value> {
    let mut tools = Vec::with_capacity(catalog.len() + 1);
    for entry in catalog.iter() {
        if entry.name == GENERIC_SUFFIX {
            // The derived name would collide with the generic tool.
            log::warn!(
                "skipping cataloged command `{}`: name collides with {}",
                entry.name,
                tool_name(GENERIC_SUFFIX)
            );
            continue;
        }
        tools.push(command_tool(entry));
    }
    tools.push(execute_tool());
    tools
}

/* ---- Request Payloads ---- */

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct CommandRequest {
    #[serde(default)]
    subcommand: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    options: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExecuteRequest {
    #[serde(default)]
    command: String,
    #[serde(default = "default_timeout_secs")]
    timeout: f64,
}

fn default_timeout_secs() -> f64 {
    DEFAULT_TIMEOUT.as_secs_f64()
}

/* ---- Invocation Paths ---- */

impl AstroqueryService {
    /// Catalog-derived path: `aqc <command> [subcommand] [--opt value]...
    /// [positionals]...` under the fixed timeout.
    async fn execute_command(&self, command: &str, args: Map<String, Value>) -> Result<String> {
        let request: CommandRequest =
            serde_json::from_value(Value::Object(args)).context("invalid arguments")?;

        // An empty subcommand string means "not selected", same as absent.
        let subcommand = request.subcommand.as_deref().filter(|s| !s.is_empty());

        let argv = invoke::command_argv(
            self.bin.path(),
            command,
            subcommand,
            &request.options,
            &request.arguments,
        );
        let outcome = invoke::run(&argv, DEFAULT_TIMEOUT).await?;
        Ok(outcome.render())
    }

    /// Generic path: shell-split raw command line, caller-chosen timeout.
    async fn execute_generic(&self, args: Map<String, Value>) -> Result<String> {
        let request: ExecuteRequest =
            serde_json::from_value(Value::Object(args)).context("invalid arguments")?;

        if request.command.trim().is_empty() {
            return Ok("No command provided".to_string());
        }
        ensure!(
            request.timeout > 0.0,
            "timeout must be a positive number of seconds"
        );
        let timeout =
            Duration::try_from_secs_f64(request.timeout).context("timeout is out of range")?;

        let argv = invoke::raw_argv(self.bin.path(), &request.command)?;
        let outcome = invoke::run(&argv, timeout).await?;
        Ok(outcome.render())
    }
}

/* ---- ServerHandler ---- */

impl ServerHandler for AstroqueryService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Exposes the aqc (astroquery-cli) command set as tools. Each \
                 astroquery_<command> tool runs one aqc command with an optional \
                 subcommand, positional arguments, and --option values; \
                 astroquery_execute runs a raw aqc command line with a \
                 configurable timeout. The tool list is rediscovered from the \
                 installed CLI on every listing."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let catalog = catalog::discover(&self.bin).await;
        log::debug!("listing {} discovered commands", catalog.len());

        serde_json::from_value(json!({ "tools": tool_descriptors(&catalog) }))
            .map_err(|e| McpError::internal_error(format!("tool list assembly failed: {e}"), None))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name = request.name.to_string();
        let args = request.arguments.unwrap_or_default();

        let command = match name
            .strip_prefix(TOOL_PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            Some(command) if !command.is_empty() => command.to_string(),
            _ => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Unknown tool: {name}"
                ))]));
            }
        };

        let outcome = if command == GENERIC_SUFFIX {
            self.execute_generic(args).await
        } else {
            self.execute_command(&command, args).await
        };

        // Downstream failures become payloads; one bad call must never
        // take the handler down.
        Ok(match outcome {
            Ok(payload) => CallToolResult::success(vec![Content::text(payload)]),
            Err(e) => CallToolResult::error(vec![Content::text(format!(
                "Error executing {name}: {e:#}"
            ))]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqc::catalog::Subcommand;
    use crate::aqc::locator;
    use crate::aqc::testutil::write_fake_cli;
    use std::collections::HashSet;

    fn sample_catalog() -> CommandCatalog {
        let mut catalog = CommandCatalog::default();
        catalog.insert(CommandEntry {
            name: "simbad".into(),
            description: "Query SIMBAD astronomical database".into(),
            subcommands: vec![
                Subcommand {
                    name: "query".into(),
                    description: "Query by object name".into(),
                },
                Subcommand {
                    name: "coords".into(),
                    description: "Query by coordinates".into(),
                },
            ],
        });
        catalog.insert(CommandEntry {
            name: "gaia".into(),
            description: "Query Gaia Data Release".into(),
            subcommands: Vec::new(),
        });
        catalog
    }

    async fn echo_service() -> AstroqueryService {
        // Echoes its arguments back so the marshalled argv is observable.
        let path = write_fake_cli("echo", r#"echo "$@""#);
        let bin = locator::locate(Some(path)).await.expect("fake cli probes ok");
        AstroqueryService::new(bin)
    }

    #[test]
    fn descriptors_follow_catalog_order_with_generic_last() {
        let tools = tool_descriptors(&sample_catalog());
        let names: Vec<&str> = tools
            .iter()
            .map(|t| t.get("name").and_then(Value::as_str).unwrap())
            .collect();
        assert_eq!(
            names,
            vec!["astroquery_simbad", "astroquery_gaia", "astroquery_execute"]
        );
        let unique: HashSet<&&str> = names.iter().collect();
        assert_eq!(unique.len(), names.len(), "descriptor names must be unique");
    }

    #[test]
    fn command_schema_enumerates_known_subcommands() {
        let tools = tool_descriptors(&sample_catalog());
        let schema = &tools[0]["inputSchema"];

        let subs = schema["properties"]["subcommand"]["enum"].as_array().unwrap();
        let subs: Vec<&str> = subs.iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(subs, vec!["query", "coords"]);

        assert!(schema["required"].as_array().unwrap().is_empty());

        // No known subcommands -> empty enumeration, not a missing field.
        let gaia_schema = &tools[1]["inputSchema"];
        assert!(
            gaia_schema["properties"]["subcommand"]["enum"]
                .as_array()
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn execute_schema_requires_command() {
        let tools = tool_descriptors(&CommandCatalog::default());
        assert_eq!(tools.len(), 1);
        let execute = &tools[0];
        assert_eq!(execute["name"], "astroquery_execute");
        assert_eq!(execute["inputSchema"]["required"], json!(["command"]));
        assert_eq!(
            execute["inputSchema"]["properties"]["timeout"]["default"],
            json!(30)
        );
    }

    #[test]
    fn cataloged_execute_command_is_skipped() {
        let mut catalog = CommandCatalog::default();
        catalog.insert(CommandEntry {
            name: "execute".into(),
            description: "A command unfortunately named execute".into(),
            subcommands: Vec::new(),
        });
        let tools = tool_descriptors(&catalog);
        assert_eq!(tools.len(), 1, "only the generic tool survives");
        assert_eq!(tools[0]["name"], "astroquery_execute");
    }

    #[test]
    fn command_request_rejects_unknown_fields() {
        let value = json!({ "subcommand": "query", "bogus": true });
        assert!(serde_json::from_value::<CommandRequest>(value).is_err());
    }

    #[tokio::test]
    async fn command_path_marshals_in_order() {
        let service = echo_service().await;
        let args = json!({
            "subcommand": "query",
            "arguments": ["M31"],
            "options": { "output-format": "votable" },
        });
        let payload = service
            .execute_command("simbad", args.as_object().unwrap().clone())
            .await
            .unwrap();

        assert!(
            payload.contains("Output:\nsimbad query --output-format votable M31"),
            "unexpected payload: {payload}"
        );
        assert!(payload.contains("Return code: 0"));
    }

    #[tokio::test]
    async fn command_path_treats_empty_subcommand_as_absent() {
        let service = echo_service().await;
        let args = json!({ "subcommand": "", "arguments": ["M31"] });
        let payload = service
            .execute_command("simbad", args.as_object().unwrap().clone())
            .await
            .unwrap();
        assert!(
            payload.contains("Output:\nsimbad M31"),
            "unexpected payload: {payload}"
        );
    }

    #[tokio::test]
    async fn generic_path_runs_raw_command_line() {
        let service = echo_service().await;
        let args = json!({ "command": "simbad query M31" });
        let payload = service
            .execute_generic(args.as_object().unwrap().clone())
            .await
            .unwrap();
        assert!(payload.contains("Output:\nsimbad query M31"));
    }

    #[tokio::test]
    async fn generic_path_requires_a_command() {
        let service = echo_service().await;
        let payload = service.execute_generic(Map::new()).await.unwrap();
        assert_eq!(payload, "No command provided");
    }

    #[tokio::test]
    async fn generic_path_rejects_non_positive_timeout() {
        let service = echo_service().await;
        let args = json!({ "command": "simbad", "timeout": 0 });
        let err = service
            .execute_generic(args.as_object().unwrap().clone())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }
}
