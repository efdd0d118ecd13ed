//! Tool catalog and dispatch.
//!
//! The catalog is a closed set: every tool is a typed input/output pair
//! dispatched by one exhaustive match on the tool name. Malformed input is
//! a deserialization failure at this boundary; an unknown name is the
//! distinguished [`GatewayError::ToolNotFound`].

use std::{path::PathBuf, sync::Arc};

use {
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::{Value, json},
    thiserror::Error,
};

use botpod_channels::{ChannelTypeResolver, Sender};

use crate::{
    fs, message,
    message::{MessageTool, TOOL_SEND_MESSAGE, tool_success_result},
    patch::PatchError,
    path::PathError,
    search,
};

/// Per-call identity threaded into tool calls for authorization.
#[derive(Debug, Clone, Default)]
pub struct ToolSessionContext {
    /// Bot the session is bound to; empty when unbound.
    pub bot_id: String,
    /// Default delivery target for `send_message`.
    pub reply_target: String,
    /// Platform the triggering message arrived on.
    pub current_platform: String,
}

/// Static description of one tool, advertised via `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("invalid tool input: {0}")]
    InvalidInput(#[source] serde_json::Error),
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Patch(#[from] PatchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Failed(String),
}

fn parse_input<T: DeserializeOwned>(arguments: Value) -> Result<T, GatewayError> {
    serde_json::from_value(arguments).map_err(GatewayError::InvalidInput)
}

fn wrap<T: Serialize>(output: T) -> Result<Value, GatewayError> {
    let value = serde_json::to_value(output).map_err(|e| GatewayError::Failed(e.to_string()))?;
    Ok(tool_success_result(value))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoInput {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EchoOutput {
    pub text: String,
}

/// The in-sandbox tool gateway: fs/search tools bound to one root, plus the
/// optional message-delivery bridge.
pub struct ToolGateway {
    root: PathBuf,
    message: Option<MessageTool>,
}

impl ToolGateway {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            message: None,
        }
    }

    /// Enable `send_message` by wiring in both channel capabilities.
    pub fn with_message_delivery(
        mut self,
        sender: Arc<dyn Sender>,
        resolver: Arc<dyn ChannelTypeResolver>,
    ) -> Self {
        self.message = Some(MessageTool::new(sender, resolver));
        self
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    /// The static tool catalog. `send_message` appears only when its
    /// capabilities are wired in.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        let path_input = |desc: &str| {
            json!({
                "type": "object",
                "properties": { "path": { "type": "string", "description": desc } },
                "required": ["path"]
            })
        };

        let mut tools = vec![
            ToolDescriptor {
                name: "echo".into(),
                description: "echo input text".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": { "text": { "type": "string", "description": "text to echo" } },
                    "required": ["text"]
                }),
            },
            ToolDescriptor {
                name: "fs.read".into(),
                description: "read file content".into(),
                input_schema: path_input("relative file path"),
            },
            ToolDescriptor {
                name: "fs.read_base64".into(),
                description: "read file bytes as base64".into(),
                input_schema: path_input("relative file path"),
            },
            ToolDescriptor {
                name: "fs.write".into(),
                description: "write file content".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "relative file path" },
                        "content": { "type": "string", "description": "file content" }
                    },
                    "required": ["path", "content"]
                }),
            },
            ToolDescriptor {
                name: "fs.list".into(),
                description: "list directory entries".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "relative directory path; empty for the root" },
                        "recursive": { "type": "boolean", "description": "recursive listing" }
                    },
                    "required": []
                }),
            },
            ToolDescriptor {
                name: "fs.stat".into(),
                description: "stat file or directory".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "relative path; empty for the root" }
                    },
                    "required": []
                }),
            },
            ToolDescriptor {
                name: "fs.delete".into(),
                description: "delete file or directory".into(),
                input_schema: path_input("relative path"),
            },
            ToolDescriptor {
                name: "fs.apply_patch".into(),
                description: "apply unified diff patch".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": { "type": "string", "description": "relative file path" },
                        "patch": { "type": "string", "description": "unified diff patch" }
                    },
                    "required": ["path", "patch"]
                }),
            },
            ToolDescriptor {
                name: "fs.mkdir".into(),
                description: "create directory (mkdir -p)".into(),
                input_schema: path_input("relative directory path"),
            },
            ToolDescriptor {
                name: "fs.rename".into(),
                description: "rename/move file or directory".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "source": { "type": "string", "description": "relative source path" },
                        "destination": { "type": "string", "description": "relative destination path" }
                    },
                    "required": ["source", "destination"]
                }),
            },
            ToolDescriptor {
                name: "grep".into(),
                description: "search the sandbox root with grep".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "description": "grep pattern" },
                        "args": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "grep options (flags only)"
                        }
                    },
                    "required": ["pattern"]
                }),
            },
        ];

        if self.message.is_some() {
            tools.push(MessageTool::descriptor());
        }
        tools
    }

    /// Dispatch one tool call. The returned value is the wrapped result
    /// document: `{"structuredContent": ...}` on success, or an
    /// `{"isError": true, ...}` payload for tool-level business failures.
    pub async fn call_tool(
        &self,
        session: &ToolSessionContext,
        name: &str,
        arguments: Value,
    ) -> Result<Value, GatewayError> {
        match name {
            "echo" => {
                let input: EchoInput = parse_input(arguments)?;
                wrap(EchoOutput { text: input.text })
            },
            "fs.read" => wrap(fs::read(&self.root, &parse_input(arguments)?)?),
            "fs.read_base64" => wrap(fs::read_base64(&self.root, &parse_input(arguments)?)?),
            "fs.write" => wrap(fs::write(&self.root, &parse_input(arguments)?)?),
            "fs.list" => wrap(fs::list(&self.root, &parse_input(arguments)?)?),
            "fs.stat" => wrap(fs::stat(&self.root, &parse_input(arguments)?)?),
            "fs.delete" => wrap(fs::delete(&self.root, &parse_input(arguments)?)?),
            "fs.apply_patch" => wrap(fs::apply_patch(&self.root, &parse_input(arguments)?)?),
            "fs.mkdir" => wrap(fs::mkdir(&self.root, &parse_input(arguments)?)?),
            "fs.rename" => wrap(fs::rename(&self.root, &parse_input(arguments)?)?),
            "grep" => wrap(search::run_grep(&self.root, &parse_input(arguments)?).await?),
            TOOL_SEND_MESSAGE => match &self.message {
                Some(tool) => Ok(tool.call(session, &arguments).await),
                None => Ok(message::tool_error_result("message service not available")),
            },
            _ => Err(GatewayError::ToolNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> (tempfile::TempDir, ToolGateway) {
        let dir = tempfile::tempdir().unwrap();
        let gateway = ToolGateway::new(dir.path());
        (dir, gateway)
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let (_dir, gateway) = gateway();
        let result = gateway
            .call_tool(
                &ToolSessionContext::default(),
                "echo",
                json!({"text": "ping"}),
            )
            .await
            .unwrap();
        assert_eq!(result["structuredContent"]["text"], "ping");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_distinguished() {
        let (_dir, gateway) = gateway();
        let err = gateway
            .call_tool(&ToolSessionContext::default(), "fs.telepathy", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::ToolNotFound(ref name) if name == "fs.telepathy"));
    }

    #[tokio::test]
    async fn test_malformed_input_is_invalid_input() {
        let (_dir, gateway) = gateway();
        let err = gateway
            .call_tool(
                &ToolSessionContext::default(),
                "fs.read",
                json!({"path": 42}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_write_read_through_dispatch() {
        let (_dir, gateway) = gateway();
        let session = ToolSessionContext::default();

        gateway
            .call_tool(
                &session,
                "fs.write",
                json!({"path": "notes/a.txt", "content": "hello"}),
            )
            .await
            .unwrap();

        let result = gateway
            .call_tool(&session, "fs.read", json!({"path": "notes/a.txt"}))
            .await
            .unwrap();
        assert_eq!(result["structuredContent"]["content"], "hello");
    }

    #[tokio::test]
    async fn test_send_message_without_capabilities() {
        let (_dir, gateway) = gateway();
        let result = gateway
            .call_tool(
                &ToolSessionContext::default(),
                "send_message",
                json!({"text": "hi"}),
            )
            .await
            .unwrap();
        assert_eq!(
            message::result_error(&result).unwrap(),
            "message service not available"
        );
    }

    #[test]
    fn test_catalog_omits_send_message_without_capabilities() {
        let (_dir, gateway) = gateway();
        let names: Vec<String> = gateway.list_tools().into_iter().map(|t| t.name).collect();
        assert!(names.contains(&"fs.apply_patch".to_string()));
        assert!(!names.contains(&"send_message".to_string()));
    }
}
