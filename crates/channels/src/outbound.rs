use {async_trait::async_trait, std::collections::BTreeSet};

use crate::types::{ChannelError, ChannelType, SendRequest};

/// Outbound delivery capability. Implemented by the platform's channel
/// registry; the tool gateway only ever sees this trait.
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(
        &self,
        bot_id: &str,
        channel_type: &ChannelType,
        req: SendRequest,
    ) -> Result<(), ChannelError>;
}

/// Maps a raw platform string (e.g. from tool arguments) to a [`ChannelType`].
pub trait ChannelTypeResolver: Send + Sync {
    fn parse_channel_type(&self, raw: &str) -> Result<ChannelType, ChannelError>;
}

/// Resolver backed by a fixed set of platform names. The real platform wires
/// in a registry-backed resolver; this one covers embedding and tests.
pub struct StaticResolver {
    known: BTreeSet<String>,
}

impl StaticResolver {
    pub fn new<I, S>(platforms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: platforms
                .into_iter()
                .map(|p| p.into().trim().to_ascii_lowercase())
                .collect(),
        }
    }
}

impl ChannelTypeResolver for StaticResolver {
    fn parse_channel_type(&self, raw: &str) -> Result<ChannelType, ChannelError> {
        let normalized = raw.trim().to_ascii_lowercase();
        if self.known.contains(&normalized) {
            Ok(ChannelType::new(normalized))
        } else {
            Err(ChannelError::UnknownPlatform(raw.trim().to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_resolver_normalizes() {
        let resolver = StaticResolver::new(["telegram", "discord"]);
        let ct = resolver.parse_channel_type(" Telegram ").unwrap();
        assert_eq!(ct.as_str(), "telegram");
    }

    #[test]
    fn test_static_resolver_rejects_unknown() {
        let resolver = StaticResolver::new(["telegram"]);
        let err = resolver.parse_channel_type("carrier-pigeon").unwrap_err();
        assert!(matches!(err, ChannelError::UnknownPlatform(_)));
    }
}
