//! Line-delimited JSON-RPC 2.0 over stdio — the serving side of the tool
//! protocol. One request per line in, one response per line out; requests
//! without an id are notifications and get no response.

use {
    anyhow::Result,
    serde::{Deserialize, Serialize},
    serde_json::{Value, json},
    tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    tracing::debug,
};

use crate::{
    gateway::{GatewayError, ToolGateway, ToolSessionContext},
    message::tool_error_result,
};

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
/// Distinct from `METHOD_NOT_FOUND`: the method was `tools/call`, the tool
/// name wasn't in the catalog.
pub const TOOL_NOT_FOUND: i64 = -32001;

#[derive(Debug, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn error(id: Option<Value>, code: i64, message: String) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError { code, message }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Handle one request. Returns `None` for notifications.
pub async fn handle_request(
    gateway: &ToolGateway,
    session: &ToolSessionContext,
    req: Request,
) -> Option<Response> {
    let Some(id) = req.id else {
        // Notifications (initialized, cancelled, ...) need no reply.
        debug!(method = %req.method, "notification");
        return None;
    };
    let id = Some(id);

    match req.method.as_str() {
        "initialize" => Some(Response::result(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {
                    "name": "botpod-toolbox",
                    "version": env!("CARGO_PKG_VERSION"),
                },
                "capabilities": { "tools": {} },
            }),
        )),
        "tools/list" => match serde_json::to_value(gateway.list_tools()) {
            Ok(tools) => Some(Response::result(id, json!({ "tools": tools }))),
            Err(e) => Some(Response::error(id, PARSE_ERROR, e.to_string())),
        },
        "tools/call" => {
            let params: ToolCallParams = match serde_json::from_value(req.params) {
                Ok(params) => params,
                Err(e) => {
                    return Some(Response::error(
                        id,
                        INVALID_PARAMS,
                        format!("invalid params: {e}"),
                    ));
                },
            };
            let arguments = if params.arguments.is_null() {
                json!({})
            } else {
                params.arguments
            };
            match gateway.call_tool(session, &params.name, arguments).await {
                Ok(result) => Some(Response::result(id, result)),
                Err(GatewayError::ToolNotFound(name)) => Some(Response::error(
                    id,
                    TOOL_NOT_FOUND,
                    format!("tool not found: {name}"),
                )),
                Err(err @ GatewayError::InvalidInput(_)) => {
                    Some(Response::error(id, INVALID_PARAMS, err.to_string()))
                },
                // Execution failures are tool errors the agent should see,
                // not transport failures.
                Err(err) => Some(Response::result(id, tool_error_result(&err.to_string()))),
            }
        },
        other => Some(Response::error(
            id,
            METHOD_NOT_FOUND,
            format!("method not found: {other}"),
        )),
    }
}

/// Serve the gateway over stdio until EOF.
pub async fn serve_stdio(gateway: &ToolGateway, session: &ToolSessionContext) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            debug!("stdin closed, shutting down");
            break;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(req) => handle_request(gateway, session, req).await,
            Err(e) => Some(Response::error(
                Some(Value::Null),
                PARSE_ERROR,
                format!("parse error: {e}"),
            )),
        };

        if let Some(response) = response {
            let mut payload = serde_json::to_string(&response)?;
            payload.push('\n');
            stdout.write_all(payload.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
