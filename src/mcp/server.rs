//! MCP Server implementation
//!
//! Implements the Model Context Protocol server over newline-delimited JSON-RPC.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::calendar::client::CalendarClient;
use crate::error::Result;
use crate::mcp::prompts::PromptHandler;
use crate::mcp::resources::ResourceHandler;
use crate::mcp::tools::ToolHandler;
use crate::mcp::types::*;

/// MCP Server info
const SERVER_NAME: &str = "calendar";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const INSTRUCTIONS: &str = "Google Calendar access. Use list_events to read a range of days, \
     create_event and update_event to change the calendar, or read calendar://events/{date}.";

/// MCP Server for Google Calendar
pub struct McpServer {
    /// Tool handler
    tool_handler: ToolHandler,

    resource_handler: ResourceHandler,
    prompt_handler: PromptHandler,

    /// Whether the client has sent `notifications/initialized`
    initialized: bool,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(calendar_client: Arc<CalendarClient>) -> Self {
        Self {
            tool_handler: ToolHandler::new(calendar_client.clone()),
            resource_handler: ResourceHandler::new(calendar_client),
            prompt_handler: PromptHandler::new(),
            initialized: false,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run the server on stdio
    pub async fn run_stdio(&mut self) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let stdout = tokio::io::stdout();
        self.run(stdin, stdout).await
    }

    /// Serve requests from `reader` until end of input
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        info!("MCP server ready");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = self.handle_message(&line).await {
                let mut response_str = serde_json::to_string(&response)?;
                response_str.push('\n');
                writer.write_all(response_str.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        info!("Input closed, shutting down");
        Ok(())
    }

    /// Handle an incoming JSON-RPC message; notifications yield no response
    pub async fn handle_message(&mut self, message: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(message) {
            Ok(req) => req,
            Err(e) => {
                warn!("Unparsable message: {}", e);
                return Some(JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(e.to_string()),
                ));
            }
        };

        if request.jsonrpc != JSONRPC_VERSION {
            return request.id.map(|id| {
                JsonRpcResponse::error(
                    Some(id),
                    JsonRpcError::invalid_request("jsonrpc must be \"2.0\""),
                )
            });
        }

        debug!("Received {}", request.method);

        if request.is_notification() {
            self.handle_notification(&request);
            return None;
        }

        let id = request.id.clone();
        let outcome = match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(),
            methods::PING => Ok(serde_json::json!({})),
            methods::LIST_TOOLS => self.handle_list_tools(),
            methods::CALL_TOOL => self.handle_call_tool(&request).await,
            methods::LIST_RESOURCES => to_value(ListResourcesResult {
                resources: self.resource_handler.list_resources(),
            }),
            methods::LIST_RESOURCE_TEMPLATES => to_value(ListResourceTemplatesResult {
                resource_templates: self.resource_handler.list_templates(),
            }),
            methods::READ_RESOURCE => self.handle_read_resource(&request).await,
            methods::LIST_PROMPTS => to_value(ListPromptsResult {
                prompts: self.prompt_handler.list_prompts(),
            }),
            methods::GET_PROMPT => self.handle_get_prompt(&request),
            _ => Err(JsonRpcError::method_not_found(&request.method)),
        };

        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => JsonRpcResponse::error(id, err),
        })
    }

    fn handle_notification(&mut self, request: &JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZED => {
                self.initialized = true;
                info!("Client initialized");
            }
            methods::CANCELLED => debug!("Client cancelled a request"),
            other => debug!("Ignoring notification {}", other),
        }
    }

    /// Handle initialize request
    fn handle_initialize(&self) -> std::result::Result<Value, JsonRpcError> {
        to_value(InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability::default()),
                resources: Some(ResourcesCapability::default()),
                prompts: Some(PromptsCapability::default()),
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        })
    }

    /// Handle list tools request
    fn handle_list_tools(&self) -> std::result::Result<Value, JsonRpcError> {
        to_value(ListToolsResult {
            tools: self.tool_handler.list_tools(),
        })
    }

    /// Handle call tool request; tool failures are reported in the result, not as errors
    async fn handle_call_tool(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: CallToolParams = parse_params(request)?;
        let result = self
            .tool_handler
            .call_tool(&params.name, params.arguments)
            .await;
        to_value(result)
    }

    async fn handle_read_resource(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: ReadResourceParams = parse_params(request)?;
        match self.resource_handler.read(&params.uri).await {
            Ok(result) => to_value(result),
            Err(e) => {
                error!("Reading {} failed: {}", params.uri, e);
                Err(JsonRpcError::from_error(&e))
            }
        }
    }

    fn handle_get_prompt(&self, request: &JsonRpcRequest) -> std::result::Result<Value, JsonRpcError> {
        let params: GetPromptParams = parse_params(request)?;
        let arguments = params.arguments.unwrap_or_default();
        self.prompt_handler
            .get_prompt(&params.name, &arguments)
            .map_err(|e| JsonRpcError::from_error(&e))
            .and_then(to_value)
    }
}

fn parse_params<T: DeserializeOwned>(request: &JsonRpcRequest) -> std::result::Result<T, JsonRpcError> {
    let raw = request
        .params
        .clone()
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Missing params for {}", request.method)))?;
    serde_json::from_value(raw).map_err(|e| JsonRpcError::invalid_params(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: T) -> std::result::Result<Value, JsonRpcError> {
    serde_json::to_value(value).map_err(|e| JsonRpcError::internal_error(e.to_string()))
}
