//! In-sandbox tool gateway: a fixed catalog of filesystem/search tools bound
//! to a sandboxed root, a from-scratch unified-diff patch applier, and a
//! message-delivery bridge back to the platform's channel layer.
//!
//! Served over line-delimited JSON-RPC on stdio (see [`rpc`]); the host
//! process talks to it the same way it talks to any stdio tool server.

pub mod fs;
pub mod gateway;
pub mod message;
pub mod mime;
pub mod patch;
pub mod path;
pub mod rpc;
pub mod search;

pub use {
    gateway::{GatewayError, ToolDescriptor, ToolGateway, ToolSessionContext},
    message::MessageTool,
    patch::{PatchError, apply_unified_patch},
    path::{FsEntry, PathError},
};
