//! # sync-client
//!
//! Client library for Code Sync collaborative editing.
//!
//! This is the library an editor front end uses to join a room, share
//! document edits and broadcast live previews.
//!
//! ## Features
//!
//! - **Session lifecycle**: validated joins, one-shot redirect guard,
//!   automatic reconnect with backoff
//! - **Document sync**: full-content updates with typing signals
//! - **Live preview**: debounced rendering, artifacts broadcast to the room
//! - **Channel abstraction**: pluggable event channel (mock, in-memory hub)
//! - **Pure state machines**: uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use codesync_client::{ClientConfig, CollabClient, Command, MemoryHub};
//!
//! let hub = MemoryHub::new();
//! let (mut client, events) = CollabClient::new(hub.channel(), ClientConfig::default());
//! let (commands, rx) = tokio::sync::mpsc::channel(32);
//!
//! tokio::spawn(async move { client.run(rx).await });
//! commands.send(Command::Join { username: "alice".into(), room_id: "room-42".into() }).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod client;
pub mod config;

pub use channel::{Channel, ChannelError, MemoryChannel, MemoryHub, MockChannel};
pub use client::{ClientError, ClientEvent, CollabClient, Command, Notice, NoticeLevel};
pub use config::{ClientConfig, ConfigError, PreviewConfig, ReconnectConfig};

// Re-exported so applications need only this crate.
pub use codesync_core::{
    Document, PreviewArtifact, PreviewMode, RenderError, SessionEvent, SessionStatus,
    ValidationErrors,
};
pub use codesync_types::{Participant, PeerId, RoomId};
