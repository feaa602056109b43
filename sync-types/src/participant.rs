//! The participant record exchanged with the coordination server.

use serde::{Deserialize, Serialize};

use crate::{PeerId, RoomId};

/// One member of a room as the server describes it.
///
/// Created by the server on a successful join, removed when the
/// connection goes away, and updated by typing/cursor signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Server-assigned connection id
    pub peer_id: PeerId,
    /// Display name, unique within the room
    pub username: String,
    /// Room the participant belongs to
    pub room_id: RoomId,
    /// Last reported cursor offset in the participant's open file
    pub cursor_position: Option<usize>,
    /// Whether the participant is currently typing
    pub typing: bool,
    /// Name of the file the participant has open, if any
    pub current_file: Option<String>,
    /// Whether the participant's connection is live
    pub online: bool,
}

impl Participant {
    /// A freshly joined, idle participant.
    pub fn new(peer_id: PeerId, username: impl Into<String>, room_id: RoomId) -> Self {
        Self {
            peer_id,
            username: username.into(),
            room_id,
            cursor_position: None,
            typing: false,
            current_file: None,
            online: true,
        }
    }
}
