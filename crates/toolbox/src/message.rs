//! `send_message`: bridges the sandboxed agent to channel delivery.
//!
//! Validation, resolution, and delivery failures all come back as a
//! structured tool-error payload rather than a transport failure, so the
//! invoking agent can observe the problem and react. A successful delivery
//! is terminal for the turn — the payload says so explicitly.

use std::sync::Arc;

use {
    serde_json::{Value, json},
    tracing::warn,
};

use botpod_channels::{ChannelTypeResolver, Message, SendRequest, Sender};

use crate::gateway::{ToolDescriptor, ToolSessionContext};

pub const TOOL_SEND_MESSAGE: &str = "send_message";

/// Build the `{"isError": true, ...}` payload for a tool-level failure.
pub fn tool_error_result(message: &str) -> Value {
    json!({
        "isError": true,
        "content": [{ "type": "text", "text": message }],
    })
}

/// Wrap a successful structured payload.
pub fn tool_success_result(payload: Value) -> Value {
    json!({ "structuredContent": payload })
}

/// Extract the error text from a tool result, if it is one.
pub fn result_error(result: &Value) -> Option<String> {
    if result.get("isError").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    let text = result
        .pointer("/content/0/text")
        .and_then(Value::as_str)
        .unwrap_or("tool call failed");
    Some(text.to_string())
}

fn first_string_arg(arguments: &Value, keys: &[&str]) -> String {
    for key in keys {
        if let Some(value) = arguments.get(key).and_then(Value::as_str) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    String::new()
}

fn parse_outbound_message(arguments: &Value, fallback_text: &str) -> Result<Message, String> {
    let mut msg = Message::default();
    match arguments.get("message") {
        None | Some(Value::Null) => {},
        Some(Value::String(text)) => msg.text = text.trim().to_string(),
        Some(object @ Value::Object(_)) => {
            msg = serde_json::from_value(object.clone()).map_err(|e| e.to_string())?;
        },
        Some(_) => return Err("message must be object or string".into()),
    }
    if msg.is_empty() && !fallback_text.trim().is_empty() {
        msg.text = fallback_text.trim().to_string();
    }
    if msg.is_empty() {
        return Err("message is required".into());
    }
    Ok(msg)
}

/// The message-delivery tool. Constructed only when both capabilities are
/// available; a gateway without one serves a catalog without this tool.
pub struct MessageTool {
    sender: Arc<dyn Sender>,
    resolver: Arc<dyn ChannelTypeResolver>,
}

impl MessageTool {
    pub fn new(sender: Arc<dyn Sender>, resolver: Arc<dyn ChannelTypeResolver>) -> Self {
        Self { sender, resolver }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor {
            name: TOOL_SEND_MESSAGE.into(),
            description: "Send a message to a channel or session".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "bot_id": {
                        "type": "string",
                        "description": "Bot ID, optional and defaults to the current bot"
                    },
                    "platform": {
                        "type": "string",
                        "description": "Channel platform name"
                    },
                    "target": {
                        "type": "string",
                        "description": "Channel target (chat/group/thread ID)"
                    },
                    "channel_identity_id": {
                        "type": "string",
                        "description": "Target identity ID when a direct target is absent"
                    },
                    "to_user_id": {
                        "type": "string",
                        "description": "Alias for channel_identity_id"
                    },
                    "text": {
                        "type": "string",
                        "description": "Message text shortcut when the message object is omitted"
                    },
                    "message": {
                        "type": "object",
                        "description": "Structured message payload with text/attachments"
                    }
                },
                "required": []
            }),
        }
    }

    /// Execute the tool. Always returns a result payload, never an error.
    pub async fn call(&self, session: &ToolSessionContext, arguments: &Value) -> Value {
        let session_bot = session.bot_id.trim();
        let mut bot_id = first_string_arg(arguments, &["bot_id"]);
        if bot_id.is_empty() {
            bot_id = session_bot.to_string();
        }
        if bot_id.is_empty() {
            return tool_error_result("bot_id is required");
        }
        if !session_bot.is_empty() && bot_id != session_bot {
            return tool_error_result("bot_id mismatch");
        }

        let mut platform = first_string_arg(arguments, &["platform"]);
        if platform.is_empty() {
            platform = session.current_platform.trim().to_string();
        }
        if platform.is_empty() {
            return tool_error_result("platform is required");
        }
        let channel_type = match self.resolver.parse_channel_type(&platform) {
            Ok(channel_type) => channel_type,
            Err(err) => return tool_error_result(&err.to_string()),
        };

        let text = first_string_arg(arguments, &["text"]);
        let message = match parse_outbound_message(arguments, &text) {
            Ok(message) => message,
            Err(err) => return tool_error_result(&err),
        };

        let mut target = first_string_arg(arguments, &["target"]);
        if target.is_empty() {
            target = session.reply_target.trim().to_string();
        }
        let channel_identity_id =
            first_string_arg(arguments, &["channel_identity_id", "to_user_id"]);
        if target.is_empty() && channel_identity_id.is_empty() {
            return tool_error_result("target or channel_identity_id is required");
        }

        let request = SendRequest {
            target: target.clone(),
            channel_identity_id: channel_identity_id.clone(),
            message,
        };
        if let Err(err) = self.sender.send(&bot_id, &channel_type, request).await {
            warn!(bot_id, platform, error = %err, "send message failed");
            return tool_error_result(&err.to_string());
        }

        tool_success_result(json!({
            "ok": true,
            "bot_id": bot_id,
            "platform": channel_type.as_str(),
            "target": target,
            "channel_identity_id": channel_identity_id,
            "instruction": "Message delivered successfully. You have completed your response. \
                            Please STOP now and do not call any more tools.",
        }))
    }
}
