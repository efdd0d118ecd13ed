use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Errors surfaced by the channel layer.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("unknown platform: {0}")]
    UnknownPlatform(String),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Normalized channel platform identifier (e.g. "telegram", "discord").
///
/// Values are produced by a [`crate::ChannelTypeResolver`], never built from
/// raw user input directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelType(String);

impl ChannelType {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A file carried alongside an outbound message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    /// Base64-encoded file bytes.
    pub data: String,
}

/// Outbound message payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

/// Delivery request handed to a [`crate::Sender`].
///
/// Exactly one of `target` / `channel_identity_id` may be empty; the sender
/// resolves identity ids through the platform's identity service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SendRequest {
    /// Direct channel target (chat/group/thread id).
    pub target: String,
    /// Opaque identity reference resolved by the identity service.
    pub channel_identity_id: String,
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_is_empty() {
        assert!(Message::default().is_empty());
        assert!(Message::text("   ").is_empty());
        assert!(!Message::text("hi").is_empty());

        let with_attachment = Message {
            text: String::new(),
            attachments: vec![Attachment::default()],
        };
        assert!(!with_attachment.is_empty());
    }

    #[test]
    fn test_message_from_json_object() {
        let msg: Message = serde_json::from_value(serde_json::json!({"text": "obj"})).unwrap();
        assert_eq!(msg.text, "obj");
        assert!(msg.attachments.is_empty());
    }
}
