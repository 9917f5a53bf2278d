//! Server-side state: connected clients, their windows, and the manager
//! that owns both plus the screen bitmap.

pub mod client;
pub mod manager;
pub mod window;

pub use client::Client;
pub use manager::Manager;
pub use window::Window;

use canopy_ipc::protocol::{Message, ProtocolError};

/// Server-assigned connection identity
pub type ClientId = u64;

/// Client-assigned window identity, validated by the registry
pub type WindowId = u32;

/// What the per-connection reader tasks feed into the dispatch loop
#[derive(Debug)]
pub enum ServerEvent {
    Message(ClientId, Message),
    Disconnected(ClientId),
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unknown client {0}")]
    UnknownClient(ClientId),

    #[error("window {0} is not registered to the requesting client")]
    UnknownWindow(WindowId),

    #[error("window id {0} is already in use")]
    WindowExists(WindowId),

    #[error("client channel closed")]
    ChannelClosed,

    #[error("failed to map framebuffer: {0}")]
    Framebuffer(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
