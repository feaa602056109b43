//! Channel messages for Code Sync.
//!
//! Every frame on the event channel is one [`Message`], tagged by its
//! semantic event name (`join-request`, `file-updated`, ...). Frames are
//! MessagePack maps with named fields so that a server written in another
//! language can read them without knowing field order.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Participant, PeerId, ProtocolError, RoomId};

/// All messages exchanged over the event channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum Message {
    /// Ask the server to join a room
    JoinRequest(JoinRequest),
    /// Server accepted the join
    JoinAccepted(JoinAccepted),
    /// Server rejected the join
    JoinFailed(JoinFailed),
    /// Another participant entered the room
    PeerJoined(PeerJoined),
    /// A participant left the room or lost its connection
    PeerLeft(PeerLeft),
    /// Full content of a file after an edit
    FileUpdated(FileUpdated),
    /// Author is typing at a cursor offset
    TypingStarted(TypingStarted),
    /// Author stopped typing
    TypingPaused(TypingPaused),
    /// Rendered preview artifact of a file
    PreviewUpdated(PreviewUpdated),
    /// Switch the room to drawing mode (not part of document sync)
    RequestDrawing(RequestDrawing),
}

impl Message {
    /// Serialize to MessagePack bytes (named fields).
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        rmp_serde::to_vec_named(self).map_err(ProtocolError::Serialization)
    }

    /// Deserialize from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        rmp_serde::from_slice(bytes).map_err(ProtocolError::Deserialization)
    }

    /// The event name this message travels under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Message::JoinRequest(_) => "join-request",
            Message::JoinAccepted(_) => "join-accepted",
            Message::JoinFailed(_) => "join-failed",
            Message::PeerJoined(_) => "peer-joined",
            Message::PeerLeft(_) => "peer-left",
            Message::FileUpdated(_) => "file-updated",
            Message::TypingStarted(_) => "typing-started",
            Message::TypingPaused(_) => "typing-paused",
            Message::PreviewUpdated(_) => "preview-updated",
            Message::RequestDrawing(_) => "request-drawing",
        }
    }
}

/// Join request sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    /// Requested display name
    pub username: String,
    /// Room to join
    pub room_id: RoomId,
}

/// Server acknowledgement of a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAccepted {
    /// The joining participant as registered by the server
    pub user: Participant,
    /// Everyone in the room, the joining participant included
    pub participants: Vec<Participant>,
}

/// Server rejection of a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinFailed {
    /// Why the join was refused
    pub reason: JoinFailureReason,
}

/// Reasons a server refuses a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinFailureReason {
    /// Another connected participant already uses the username
    UsernameTaken,
    /// The room cannot be joined right now
    RoomUnavailable,
    /// Anything else, as reported by the server
    Other(String),
}

impl fmt::Display for JoinFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinFailureReason::UsernameTaken => {
                f.write_str("the username is already taken in this room")
            }
            JoinFailureReason::RoomUnavailable => f.write_str("the room is unavailable"),
            JoinFailureReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// A participant entered the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerJoined {
    /// The new participant
    pub participant: Participant,
}

/// A participant left the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerLeft {
    /// Connection id of the departed participant
    pub peer_id: PeerId,
}

/// Full-content replacement of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpdated {
    /// Name of the edited file
    pub file_name: String,
    /// Complete new content
    pub content: String,
}

/// Typing activity at a cursor offset.
///
/// `peer_id` is `None` on the way out; the server fills it in when it
/// rebroadcasts the signal to the rest of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingStarted {
    /// Author of the signal (set by the server)
    pub peer_id: Option<PeerId>,
    /// Cursor offset after the edit
    pub cursor_position: usize,
}

/// End of a typing burst.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingPaused {
    /// Author of the signal (set by the server)
    pub peer_id: Option<PeerId>,
}

/// A fully rendered preview artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewUpdated {
    /// File the artifact was rendered from
    pub file_name: String,
    /// Complete markup document, applied verbatim by receivers
    pub artifact: String,
    /// Render time, unix milliseconds
    pub rendered_at: u64,
}

/// Request to switch the room into drawing mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestDrawing {}
