//! # sync-types
//!
//! Wire format types for the Code Sync collaborative editing protocol.
//!
//! This crate provides the foundational types used across all Code Sync crates:
//! - [`RoomId`], [`PeerId`] - Identity types
//! - [`Participant`] - A room member as described by the server
//! - [`Message`] - Channel messages (join, file updates, typing, previews)
//! - [`ProtocolError`] - Codec errors

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;
mod participant;

pub use error::ProtocolError;
pub use ids::{PeerId, RoomId};
pub use messages::{
    FileUpdated, JoinAccepted, JoinFailed, JoinFailureReason, JoinRequest, Message, PeerJoined,
    PeerLeft, PreviewUpdated, RequestDrawing, TypingPaused, TypingStarted,
};
pub use participant::Participant;
