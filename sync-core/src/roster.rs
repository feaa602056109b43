//! Room roster for Code Sync.
//!
//! Tracks the other participants of the joined room and their typing
//! activity. The roster is seeded from the join acknowledgement and kept
//! current by `peer-joined`, `peer-left` and the typing signals.

use std::collections::BTreeMap;

use codesync_types::{Participant, PeerId, TypingPaused, TypingStarted};

/// The peers of one room, excluding the local participant.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    local: Option<PeerId>,
    peers: BTreeMap<PeerId, Participant>,
}

impl Roster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the roster from a join acknowledgement.
    pub fn seed(&mut self, local: &Participant, participants: &[Participant]) {
        self.local = Some(local.peer_id.clone());
        self.peers = participants
            .iter()
            .filter(|p| p.peer_id != local.peer_id)
            .map(|p| (p.peer_id.clone(), p.clone()))
            .collect();
    }

    /// Forget everything, e.g. after leaving the room.
    pub fn clear(&mut self) {
        self.local = None;
        self.peers.clear();
    }

    /// Add or refresh a peer. The local participant is ignored.
    pub fn peer_joined(&mut self, participant: Participant) -> bool {
        if self.is_local(&participant.peer_id) {
            return false;
        }
        self.peers.insert(participant.peer_id.clone(), participant);
        true
    }

    /// Remove a peer, returning its record.
    pub fn peer_left(&mut self, peer_id: &PeerId) -> Option<Participant> {
        self.peers.remove(peer_id)
    }

    /// Record a typing-started signal.
    ///
    /// Returns the updated peer, or `None` when the signal has no author or
    /// names an unknown peer.
    pub fn typing_started(&mut self, signal: &TypingStarted) -> Option<&Participant> {
        let peer = self.peers.get_mut(signal.peer_id.as_ref()?)?;
        peer.typing = true;
        peer.cursor_position = Some(signal.cursor_position);
        Some(peer)
    }

    /// Record a typing-paused signal. The cursor position is kept.
    pub fn typing_paused(&mut self, signal: &TypingPaused) -> Option<&Participant> {
        let peer = self.peers.get_mut(signal.peer_id.as_ref()?)?;
        peer.typing = false;
        Some(peer)
    }

    /// Look up a peer.
    pub fn get(&self, peer_id: &PeerId) -> Option<&Participant> {
        self.peers.get(peer_id)
    }

    /// Iterate over peers in id order.
    pub fn peers(&self) -> impl Iterator<Item = &Participant> {
        self.peers.values()
    }

    /// Peers that are currently typing.
    pub fn typing_peers(&self) -> impl Iterator<Item = &Participant> {
        self.peers.values().filter(|p| p.typing)
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if there are no peers.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn is_local(&self, peer_id: &PeerId) -> bool {
        self.local.as_ref() == Some(peer_id)
    }
}
