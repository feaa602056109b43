//! Event channel abstraction for Code Sync.
//!
//! The client talks to the coordination server over a bidirectional,
//! ordered, message-oriented channel. This module hides how that channel is
//! realised (a socket connection, an in-memory hub for tests and demos).
//!
//! # Design
//!
//! The channel trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits one encoded [`Message`](codesync_types::Message) frame
//! - `recv()` waits for the next frame
//! - `close()` terminates the connection
//!
//! Delivery order per direction is preserved; nothing more is assumed.
//!
//! # Example
//!
//! ```ignore
//! let channel = MockChannel::new();
//! channel.connect("memory://local").await?;
//! channel.send(&frame).await?;
//! let reply = channel.recv().await?;
//! ```

mod memory;
mod mock;

pub use memory::{MemoryChannel, MemoryHub};
pub use mock::MockChannel;

use async_trait::async_trait;
use thiserror::Error;

/// Channel errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed by the other side.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Bidirectional message channel to the coordination server.
///
/// Implementations handle the underlying connection mechanism.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Connect to the server at the given address.
    async fn connect(&self, address: &str) -> Result<(), ChannelError>;

    /// Send one encoded frame.
    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError>;

    /// Receive the next frame.
    ///
    /// Waits until a frame is available or the connection goes away.
    async fn recv(&self) -> Result<Vec<u8>, ChannelError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the connection.
    async fn close(&self) -> Result<(), ChannelError>;
}
