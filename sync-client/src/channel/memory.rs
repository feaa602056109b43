//! In-memory coordination hub.
//!
//! [`MemoryHub`] plays the server side of the protocol inside one process:
//! it accepts joins (rejecting duplicate usernames per room), tracks room
//! membership and relays edits, typing signals and preview artifacts to the
//! other members of the sender's room. Each [`MemoryChannel`] is one client
//! connection to the hub.
//!
//! Used by integration tests and by the CLI demo.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use codesync_types::{
    JoinAccepted, JoinFailed, JoinFailureReason, JoinRequest, Message, Participant, PeerId,
    PeerJoined, PeerLeft, RoomId,
};
use tokio::sync::mpsc;

use super::{Channel, ChannelError};

/// Shared in-memory server. Clones refer to the same hub.
#[derive(Debug, Clone, Default)]
pub struct MemoryHub {
    state: Arc<Mutex<HubState>>,
}

#[derive(Debug, Default)]
struct HubState {
    next_peer: u64,
    refuse_connections: bool,
    connections: HashMap<PeerId, Connection>,
}

#[derive(Debug)]
struct Connection {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    member: Option<Participant>,
}

impl MemoryHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create an unconnected channel to this hub.
    pub fn channel(&self) -> MemoryChannel {
        MemoryChannel {
            hub: self.clone(),
            peer: Mutex::new(None),
            rx: tokio::sync::Mutex::new(None),
        }
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Drop a connection as if the network failed.
    ///
    /// The peer's channel observes a closed connection and the rest of its
    /// room receives `peer-left`.
    pub fn drop_peer(&self, peer_id: &PeerId) -> bool {
        self.lock().remove(peer_id)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Members of a room, in no particular order.
    pub fn room_members(&self, room_id: &RoomId) -> Vec<Participant> {
        self.lock()
            .connections
            .values()
            .filter_map(|c| c.member.as_ref())
            .filter(|m| &m.room_id == room_id)
            .cloned()
            .collect()
    }

    fn register(&self) -> Result<(PeerId, mpsc::UnboundedReceiver<Vec<u8>>), ChannelError> {
        let mut state = self.lock();
        if state.refuse_connections {
            return Err(ChannelError::ConnectionFailed(
                "hub is refusing connections".into(),
            ));
        }

        state.next_peer += 1;
        let peer_id = PeerId::new(format!("peer-{}", state.next_peer));
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .connections
            .insert(peer_id.clone(), Connection { tx, member: None });

        tracing::debug!("Hub: registered connection {}", peer_id);
        Ok((peer_id, rx))
    }

    fn is_live(&self, peer_id: &PeerId) -> bool {
        self.lock().connections.contains_key(peer_id)
    }

    fn handle_frame(&self, from: &PeerId, frame: &[u8]) -> Result<(), ChannelError> {
        let message =
            Message::from_bytes(frame).map_err(|e| ChannelError::SendFailed(e.to_string()))?;

        let mut state = self.lock();
        if !state.connections.contains_key(from) {
            return Err(ChannelError::ConnectionClosed);
        }

        match message {
            Message::JoinRequest(request) => state.join(from, request),
            Message::TypingStarted(mut signal) => {
                signal.peer_id = Some(from.clone());
                if let Some(member) = state.member_mut(from) {
                    member.typing = true;
                    member.cursor_position = Some(signal.cursor_position);
                }
                state.relay(from, &Message::TypingStarted(signal));
            }
            Message::TypingPaused(mut signal) => {
                signal.peer_id = Some(from.clone());
                if let Some(member) = state.member_mut(from) {
                    member.typing = false;
                }
                state.relay(from, &Message::TypingPaused(signal));
            }
            Message::FileUpdated(update) => {
                if let Some(member) = state.member_mut(from) {
                    member.current_file = Some(update.file_name.clone());
                }
                state.relay(from, &Message::FileUpdated(update));
            }
            message @ (Message::PreviewUpdated(_) | Message::RequestDrawing(_)) => {
                state.relay(from, &message);
            }
            other => {
                tracing::debug!("Hub: ignoring {} from {}", other.event_name(), from);
            }
        }
        Ok(())
    }
}

impl HubState {
    fn member_mut(&mut self, peer_id: &PeerId) -> Option<&mut Participant> {
        self.connections
            .get_mut(peer_id)
            .and_then(|c| c.member.as_mut())
    }

    fn join(&mut self, from: &PeerId, request: JoinRequest) {
        let taken = self.connections.iter().any(|(id, c)| {
            id != from
                && c.member.as_ref().is_some_and(|m| {
                    m.room_id == request.room_id && m.username == request.username
                })
        });

        if taken {
            tracing::info!(
                "Hub: rejected {} in {} (username taken)",
                request.username,
                request.room_id
            );
            self.send_to(
                from,
                &Message::JoinFailed(JoinFailed {
                    reason: JoinFailureReason::UsernameTaken,
                }),
            );
            return;
        }

        let user = Participant::new(from.clone(), request.username, request.room_id);
        if let Some(conn) = self.connections.get_mut(from) {
            conn.member = Some(user.clone());
        }

        let participants: Vec<Participant> = self
            .connections
            .values()
            .filter_map(|c| c.member.as_ref())
            .filter(|m| m.room_id == user.room_id)
            .cloned()
            .collect();

        tracing::info!(
            "Hub: {} joined {} (members: {})",
            user.username,
            user.room_id,
            participants.len()
        );

        self.send_to(
            from,
            &Message::JoinAccepted(JoinAccepted {
                user: user.clone(),
                participants,
            }),
        );
        self.relay(
            from,
            &Message::PeerJoined(PeerJoined { participant: user }),
        );
    }

    /// Send to everyone in the sender's room except the sender.
    fn relay(&self, from: &PeerId, message: &Message) {
        let Some(room) = self
            .connections
            .get(from)
            .and_then(|c| c.member.as_ref())
            .map(|m| m.room_id.clone())
        else {
            tracing::debug!("Hub: {} from {} outside a room", message.event_name(), from);
            return;
        };

        let Some(frame) = encode(message) else {
            return;
        };

        let mut sent = 0;
        for (id, conn) in &self.connections {
            let in_room = conn.member.as_ref().is_some_and(|m| m.room_id == room);
            if id != from && in_room && conn.tx.send(frame.clone()).is_ok() {
                sent += 1;
            }
        }

        tracing::debug!(
            "Hub: relayed {} from {} to {} peers in {}",
            message.event_name(),
            from,
            sent,
            room
        );
    }

    fn send_to(&self, peer_id: &PeerId, message: &Message) {
        if let (Some(conn), Some(frame)) = (self.connections.get(peer_id), encode(message)) {
            let _ = conn.tx.send(frame);
        }
    }

    fn remove(&mut self, peer_id: &PeerId) -> bool {
        let Some(conn) = self.connections.remove(peer_id) else {
            return false;
        };

        if let Some(member) = conn.member {
            tracing::info!("Hub: {} left {}", member.username, member.room_id);
            let left = Message::PeerLeft(PeerLeft {
                peer_id: peer_id.clone(),
            });
            if let Some(frame) = encode(&left) {
                for other in self.connections.values() {
                    let in_room = other
                        .member
                        .as_ref()
                        .is_some_and(|m| m.room_id == member.room_id);
                    if in_room {
                        let _ = other.tx.send(frame.clone());
                    }
                }
            }
        }
        true
    }
}

fn encode(message: &Message) -> Option<Vec<u8>> {
    match message.to_bytes() {
        Ok(frame) => Some(frame),
        Err(e) => {
            tracing::error!("Hub: failed to encode {}: {}", message.event_name(), e);
            None
        }
    }
}

/// One client connection to a [`MemoryHub`].
#[derive(Debug)]
pub struct MemoryChannel {
    hub: MemoryHub,
    peer: Mutex<Option<PeerId>>,
    rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

impl MemoryChannel {
    fn peer(&self) -> MutexGuard<'_, Option<PeerId>> {
        self.peer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The hub-assigned id of the current connection.
    pub fn peer_id(&self) -> Option<PeerId> {
        self.peer().clone()
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn connect(&self, address: &str) -> Result<(), ChannelError> {
        if let Some(old) = self.peer().take() {
            self.hub.drop_peer(&old);
        }

        let (peer_id, rx) = self.hub.register()?;
        tracing::debug!("Memory channel connected to {} as {}", address, peer_id);
        *self.rx.lock().await = Some(rx);
        *self.peer() = Some(peer_id);
        Ok(())
    }

    async fn send(&self, frame: &[u8]) -> Result<(), ChannelError> {
        let peer_id = self.peer().clone().ok_or(ChannelError::NotConnected)?;
        self.hub.handle_frame(&peer_id, frame)
    }

    async fn recv(&self) -> Result<Vec<u8>, ChannelError> {
        let mut rx = self.rx.lock().await;
        let Some(receiver) = rx.as_mut() else {
            return Err(ChannelError::NotConnected);
        };

        match receiver.recv().await {
            Some(frame) => Ok(frame),
            None => {
                *rx = None;
                self.peer().take();
                Err(ChannelError::ConnectionClosed)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.peer()
            .as_ref()
            .is_some_and(|peer_id| self.hub.is_live(peer_id))
    }

    async fn close(&self) -> Result<(), ChannelError> {
        let peer = self.peer().take();
        if let Some(peer_id) = peer {
            self.hub.drop_peer(&peer_id);
        }
        *self.rx.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codesync_types::{FileUpdated, TypingStarted};

    fn frame(message: Message) -> Vec<u8> {
        message.to_bytes().unwrap()
    }

    fn join(username: &str, room: &str) -> Vec<u8> {
        frame(Message::JoinRequest(JoinRequest {
            username: username.into(),
            room_id: RoomId::new(room),
        }))
    }

    async fn next(channel: &MemoryChannel) -> Message {
        Message::from_bytes(&channel.recv().await.unwrap()).unwrap()
    }

    async fn joined(hub: &MemoryHub, username: &str, room: &str) -> MemoryChannel {
        let channel = hub.channel();
        channel.connect("memory").await.unwrap();
        channel.send(&join(username, room)).await.unwrap();
        assert!(matches!(next(&channel).await, Message::JoinAccepted(_)));
        channel
    }

    // ===========================================
    // Join Tests
    // ===========================================

    #[tokio::test]
    async fn join_is_acknowledged_with_roster() {
        let hub = MemoryHub::new();
        let alice = joined(&hub, "alice", "room-1").await;

        let bob = hub.channel();
        bob.connect("memory").await.unwrap();
        bob.send(&join("bob", "room-1")).await.unwrap();

        match next(&bob).await {
            Message::JoinAccepted(accepted) => {
                assert_eq!(accepted.user.username, "bob");
                assert_eq!(accepted.user.peer_id, bob.peer_id().unwrap());
                assert_eq!(accepted.participants.len(), 2);
            }
            other => panic!("Expected JoinAccepted, got {:?}", other),
        }

        match next(&alice).await {
            Message::PeerJoined(joined) => assert_eq!(joined.participant.username, "bob"),
            other => panic!("Expected PeerJoined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let hub = MemoryHub::new();
        let _alice = joined(&hub, "alice", "room-1").await;

        let impostor = hub.channel();
        impostor.connect("memory").await.unwrap();
        impostor.send(&join("alice", "room-1")).await.unwrap();

        assert_eq!(
            next(&impostor).await,
            Message::JoinFailed(JoinFailed {
                reason: JoinFailureReason::UsernameTaken
            })
        );
    }

    #[tokio::test]
    async fn same_username_in_other_room_is_fine() {
        let hub = MemoryHub::new();
        let _a = joined(&hub, "alice", "room-1").await;
        let _b = joined(&hub, "alice", "room-2").await;

        assert_eq!(hub.room_members(&RoomId::new("room-2")).len(), 1);
    }

    // ===========================================
    // Relay Tests
    // ===========================================

    #[tokio::test]
    async fn edits_reach_room_members_only() {
        let hub = MemoryHub::new();
        let alice = joined(&hub, "alice", "room-1").await;
        let bob = joined(&hub, "bob", "room-1").await;
        let carol = joined(&hub, "carol", "room-2").await;
        // Drain bob's arrival notice
        assert!(matches!(next(&alice).await, Message::PeerJoined(_)));

        let update = Message::FileUpdated(FileUpdated {
            file_name: "index.html".into(),
            content: "<p>hi</p>".into(),
        });
        alice.send(&frame(update.clone())).await.unwrap();

        assert_eq!(next(&bob).await, update);

        // Carol's next frames come from her own room only
        let dave = joined(&hub, "dave", "room-2").await;
        let other = Message::FileUpdated(FileUpdated {
            file_name: "main.css".into(),
            content: "p {}".into(),
        });
        dave.send(&frame(other.clone())).await.unwrap();

        assert!(matches!(next(&carol).await, Message::PeerJoined(_)));
        assert_eq!(next(&carol).await, other);
    }

    #[tokio::test]
    async fn typing_signal_is_attributed_by_hub() {
        let hub = MemoryHub::new();
        let alice = joined(&hub, "alice", "room-1").await;
        let bob = joined(&hub, "bob", "room-1").await;

        alice
            .send(&frame(Message::TypingStarted(TypingStarted {
                peer_id: None,
                cursor_position: 3,
            })))
            .await
            .unwrap();

        match next(&bob).await {
            Message::TypingStarted(signal) => {
                assert_eq!(signal.peer_id, alice.peer_id());
                assert_eq!(signal.cursor_position, 3);
            }
            other => panic!("Expected TypingStarted, got {:?}", other),
        }
    }

    // ===========================================
    // Connection Tests
    // ===========================================

    #[tokio::test]
    async fn dropped_peer_sees_closed_connection() {
        let hub = MemoryHub::new();
        let alice = joined(&hub, "alice", "room-1").await;
        let bob = joined(&hub, "bob", "room-1").await;
        assert!(matches!(next(&alice).await, Message::PeerJoined(_)));

        assert!(hub.drop_peer(&alice.peer_id().unwrap()));

        assert!(!alice.is_connected());
        assert!(matches!(alice.recv().await, Err(ChannelError::ConnectionClosed)));
        assert!(matches!(next(&bob).await, Message::PeerLeft(_)));
    }

    #[tokio::test]
    async fn refused_connection_fails() {
        let hub = MemoryHub::new();
        hub.refuse_connections(true);

        let channel = hub.channel();
        let result = channel.connect("memory").await;

        assert!(matches!(result, Err(ChannelError::ConnectionFailed(_))));
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn reconnect_gets_new_peer_id() {
        let hub = MemoryHub::new();
        let channel = hub.channel();
        channel.connect("memory").await.unwrap();
        let first = channel.peer_id().unwrap();

        channel.close().await.unwrap();
        channel.connect("memory").await.unwrap();

        assert_ne!(channel.peer_id().unwrap(), first);
        assert_eq!(hub.connection_count(), 1);
    }

    #[tokio::test]
    async fn garbage_frame_is_refused() {
        let hub = MemoryHub::new();
        let channel = hub.channel();
        channel.connect("memory").await.unwrap();

        let result = channel.send(&[0xc1]).await;
        assert!(matches!(result, Err(ChannelError::SendFailed(_))));
    }
}
