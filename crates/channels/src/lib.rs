//! Channel-layer seam consumed by the sandboxed tool gateway.
//!
//! The gateway never talks to a messaging platform directly — it is handed
//! a [`Sender`] and a [`ChannelTypeResolver`] by the host process. Concrete
//! channel adapters (Telegram, Discord, Slack, ...) live outside this crate.

pub mod outbound;
pub mod types;

pub use {
    outbound::{ChannelTypeResolver, Sender, StaticResolver},
    types::{Attachment, ChannelError, ChannelType, Message, SendRequest},
};
