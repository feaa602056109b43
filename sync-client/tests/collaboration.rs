//! Multi-client collaboration scenarios.
//!
//! Two or more clients share one in-memory hub. Clients are driven by hand
//! (`receive_next` / `fire_due_timers`) so every frame is accounted for,
//! except in the run-loop scenario at the end.

use std::time::Duration;

use codesync_client::{
    Channel, ClientConfig, ClientEvent, CollabClient, Command, Document, MemoryChannel,
    MemoryHub, NoticeLevel, SessionEvent, SessionStatus,
};
use tokio::sync::mpsc;

type Client = CollabClient<MemoryChannel>;
type Events = mpsc::UnboundedReceiver<ClientEvent>;

fn config() -> ClientConfig {
    ClientConfig::new("memory://hub").with_backoff(
        Duration::from_millis(100),
        Duration::from_secs(1),
        Duration::ZERO,
    )
}

fn drain(events: &mut Events) -> Vec<ClientEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// Join a fresh client and consume its acknowledgement.
async fn join(hub: &MemoryHub, username: &str, room: &str) -> (Client, Events) {
    let (mut client, events) = CollabClient::new(hub.channel(), config());
    client.join(username, room).await.unwrap();
    client.receive_next().await.unwrap();
    (client, events)
}

/// Alice and Bob in one room, both with `index.html` open.
async fn pair(hub: &MemoryHub) -> (Client, Events, Client, Events) {
    let (mut alice, alice_events) = join(hub, "alice", "room-42").await;
    let (mut bob, bob_events) = join(hub, "bob", "room-42").await;
    // Bob's arrival
    alice.receive_next().await.unwrap();

    alice.open_document(Document::new("index.html", "")).await;
    bob.open_document(Document::new("index.html", "")).await;
    (alice, alice_events, bob, bob_events)
}

// ============================================================================
// Session
// ============================================================================

/// Both sides see each other in the roster, never themselves.
#[tokio::test]
async fn members_see_each_other() {
    let hub = MemoryHub::new();
    let (alice, _, bob, _) = pair(&hub).await;

    assert_eq!(alice.status(), SessionStatus::Joined);
    assert_eq!(bob.status(), SessionStatus::Joined);
    assert_eq!(alice.roster().peers().next().unwrap().username, "bob");
    assert_eq!(bob.roster().peers().next().unwrap().username, "alice");
}

/// A taken username fails the join and leaves the client retryable.
#[tokio::test]
async fn duplicate_username_is_rejected_then_retry_succeeds() {
    let hub = MemoryHub::new();
    let (_alice, _) = join(&hub, "alice", "room-42").await;

    let (mut impostor, mut events) = CollabClient::new(hub.channel(), config());
    impostor.join("alice", "room-42").await.unwrap();
    impostor.receive_next().await.unwrap();

    assert_eq!(impostor.status(), SessionStatus::Disconnected);
    assert!(drain(&mut events).iter().any(|e| matches!(
        e,
        ClientEvent::Notice(n) if n.level == NoticeLevel::Error
    )));

    impostor.join("alice-2", "room-42").await.unwrap();
    impostor.receive_next().await.unwrap();
    assert_eq!(impostor.status(), SessionStatus::Joined);
}

/// Leaving tells the rest of the room.
#[tokio::test]
async fn leaving_notifies_peers() {
    let hub = MemoryHub::new();
    let (mut alice, _, mut bob, mut bob_events) = pair(&hub).await;
    drain(&mut bob_events);

    alice.leave().await;
    bob.receive_next().await.unwrap();

    assert!(bob.roster().is_empty());
    assert!(drain(&mut bob_events)
        .iter()
        .any(|e| matches!(e, ClientEvent::PeerLeft(p) if p.username == "alice")));
}

// ============================================================================
// Document sync
// ============================================================================

/// An edit reaches the peer as full content plus a typing signal.
#[tokio::test]
async fn edit_replaces_peer_document() {
    let hub = MemoryHub::new();
    let (mut alice, _, mut bob, mut bob_events) = pair(&hub).await;

    alice.edit("<h1>Hello</h1>", 14).await.unwrap();
    bob.receive_next().await.unwrap(); // file-updated
    bob.receive_next().await.unwrap(); // typing-started

    assert_eq!(bob.document().unwrap().content, "<h1>Hello</h1>");
    let typing: Vec<_> = bob.roster().typing_peers().collect();
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0].cursor_position, Some(14));
    assert!(drain(&mut bob_events).iter().any(|e| matches!(
        e,
        ClientEvent::DocumentReplaced { content, .. } if content == "<h1>Hello</h1>"
    )));
}

/// Concurrent edits converge on whatever each side received last.
#[tokio::test]
async fn last_received_update_wins() {
    let hub = MemoryHub::new();
    let (mut alice, _, mut bob, _) = pair(&hub).await;

    alice.edit("from alice", 10).await.unwrap();
    bob.edit("from bob", 8).await.unwrap();

    // Each applies the other's edit over its own
    bob.receive_next().await.unwrap();
    alice.receive_next().await.unwrap();

    assert_eq!(alice.document().unwrap().content, "from bob");
    assert_eq!(bob.document().unwrap().content, "from alice");
}

/// The typing pause follows the last keystroke of a burst, once.
#[tokio::test(start_paused = true)]
async fn typing_pause_reaches_peer_once() {
    let hub = MemoryHub::new();
    let (mut alice, _, mut bob, _) = pair(&hub).await;

    for i in 0..3 {
        alice.edit(format!("v{i}"), 2).await.unwrap();
        tokio::time::advance(Duration::from_millis(300)).await;
        alice.fire_due_timers().await;
    }
    tokio::time::advance(Duration::from_millis(700)).await;
    alice.fire_due_timers().await;

    // 3 x (file-updated + typing-started) + one typing-paused
    for _ in 0..7 {
        bob.receive_next().await.unwrap();
    }

    assert_eq!(bob.document().unwrap().content, "v2");
    assert_eq!(bob.roster().typing_peers().count(), 0);
    assert!(alice.next_deadline().is_none());
}

// ============================================================================
// Preview broadcast
// ============================================================================

/// The peer displays exactly the artifact the author rendered.
#[tokio::test]
async fn preview_artifact_is_shared_verbatim() {
    let hub = MemoryHub::new();
    let (mut alice, _, mut bob, mut bob_events) = pair(&hub).await;

    alice.edit("<p>hi</p>", 9).await.unwrap();
    alice.open_preview().await;

    bob.receive_next().await.unwrap(); // file-updated
    bob.receive_next().await.unwrap(); // typing-started
    bob.receive_next().await.unwrap(); // preview-updated

    let ours = alice.preview().artifact().unwrap();
    let theirs = bob.preview().artifact().unwrap();
    assert_eq!(ours.markup, theirs.markup);
    assert_eq!(ours.rendered_at, theirs.rendered_at);
    assert!(drain(&mut bob_events)
        .iter()
        .any(|e| matches!(e, ClientEvent::PreviewUpdated(_))));
}

/// Preview regeneration is debounced by the configured mode.
#[tokio::test(start_paused = true)]
async fn inline_preview_regenerates_after_half_a_second() {
    let hub = MemoryHub::new();
    let (mut alice, _, mut bob, _) = pair(&hub).await;
    alice.set_preview_mode(codesync_client::PreviewMode::Inline);
    alice.open_preview().await;
    bob.receive_next().await.unwrap(); // initial preview-updated

    alice.edit("<b>x</b>", 8).await.unwrap();
    tokio::time::advance(Duration::from_millis(500)).await;
    alice.fire_due_timers().await;

    bob.receive_next().await.unwrap(); // file-updated
    bob.receive_next().await.unwrap(); // typing-started
    bob.receive_next().await.unwrap(); // preview-updated

    assert!(bob.preview().artifact().unwrap().markup.contains("<b>x</b>"));
}

// ============================================================================
// Connection loss
// ============================================================================

/// A network drop demotes the client; it reconnects after the backoff and
/// can join again.
#[tokio::test(start_paused = true)]
async fn dropped_client_reconnects_and_rejoins() {
    let hub = MemoryHub::new();
    let (mut alice, mut alice_events, mut bob, _) = pair(&hub).await;
    drain(&mut alice_events);

    let old_peer = alice.channel().peer_id().unwrap();
    assert!(hub.drop_peer(&old_peer));

    alice.receive_next().await.unwrap();
    bob.receive_next().await.unwrap();

    assert_eq!(alice.status(), SessionStatus::Disconnected);
    assert!(bob.roster().is_empty());
    assert!(drain(&mut alice_events).iter().any(|e| matches!(
        e,
        ClientEvent::Session(SessionEvent::Disconnected { .. })
    )));

    tokio::time::advance(Duration::from_millis(100)).await;
    alice.fire_due_timers().await;
    assert!(alice.channel().is_connected());
    assert_ne!(alice.channel().peer_id().unwrap(), old_peer);

    alice.join("alice", "room-42").await.unwrap();
    alice.receive_next().await.unwrap();
    bob.receive_next().await.unwrap();

    assert_eq!(alice.status(), SessionStatus::Joined);
    assert_eq!(bob.roster().len(), 1);
}

/// The redirect guard resets the channel once without rejoining.
#[tokio::test]
async fn duplicate_view_mount_leaves_room_once() {
    let hub = MemoryHub::new();
    let (mut alice, _, mut bob, _) = pair(&hub).await;

    alice.join_view_mounted().await;
    bob.receive_next().await.unwrap(); // peer-left

    assert_eq!(alice.status(), SessionStatus::Disconnected);
    assert!(alice.channel().is_connected());
    assert!(bob.roster().is_empty());
    assert!(hub
        .room_members(&codesync_client::RoomId::new("room-42"))
        .iter()
        .all(|m| m.username != "alice"));
}

// ============================================================================
// Run loop
// ============================================================================

async fn wait_for(events: &mut Events, mut wanted: impl FnMut(&ClientEvent) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = events.recv().await {
            if wanted(&event) {
                return;
            }
        }
        panic!("event stream ended");
    })
    .await
    .expect("timed out waiting for event");
}

/// A client driven by commands receives edits while idle.
#[tokio::test]
async fn run_loop_applies_remote_edits() {
    let hub = MemoryHub::new();
    let (mut bob, mut bob_events) = CollabClient::new(hub.channel(), config());
    let (commands, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move {
        bob.run(rx).await;
        bob
    });

    commands
        .send(Command::OpenDocument(Document::new("index.html", "")))
        .await
        .unwrap();
    commands
        .send(Command::Join {
            username: "bob".into(),
            room_id: "room-42".into(),
        })
        .await
        .unwrap();
    wait_for(&mut bob_events, |e| {
        matches!(e, ClientEvent::NavigateToEditor { .. })
    })
    .await;

    let (mut alice, _) = join(&hub, "alice", "room-42").await;
    alice.open_document(Document::new("index.html", "")).await;
    alice.edit("<p>from alice</p>", 17).await.unwrap();

    wait_for(&mut bob_events, |e| {
        matches!(e, ClientEvent::DocumentReplaced { content, .. } if content == "<p>from alice</p>")
    })
    .await;

    commands.send(Command::Shutdown).await.unwrap();
    let bob = handle.await.unwrap();

    assert_eq!(bob.document().unwrap().content, "<p>from alice</p>");
    assert!(!bob.channel().is_connected());
}

/// A drop that happens while the loop is idle still demotes the session:
/// frames already delivered are applied, then the close is reported and the
/// client reconnects and can join again.
#[tokio::test]
async fn run_loop_observes_drop_and_rejoins() {
    let hub = MemoryHub::new();
    let (mut alice, mut alice_events, mut bob, _) = pair(&hub).await;
    drain(&mut alice_events);

    bob.edit("<p>before the drop</p>", 22).await.unwrap();
    assert!(hub.drop_peer(&alice.channel().peer_id().unwrap()));
    bob.receive_next().await.unwrap(); // peer-left
    assert!(bob.roster().is_empty());

    let (commands, rx) = mpsc::channel(16);
    let handle = tokio::spawn(async move {
        alice.run(rx).await;
        alice
    });

    wait_for(&mut alice_events, |e| {
        matches!(e, ClientEvent::DocumentReplaced { content, .. } if content == "<p>before the drop</p>")
    })
    .await;
    wait_for(&mut alice_events, |e| {
        matches!(e, ClientEvent::Session(SessionEvent::Disconnected { .. }))
    })
    .await;

    commands
        .send(Command::Join {
            username: "alice".into(),
            room_id: "room-42".into(),
        })
        .await
        .unwrap();
    wait_for(&mut alice_events, |e| {
        matches!(e, ClientEvent::NavigateToEditor { .. })
    })
    .await;

    bob.receive_next().await.unwrap(); // peer-joined
    assert_eq!(bob.roster().peers().next().unwrap().username, "alice");

    commands.send(Command::Shutdown).await.unwrap();
    let alice = handle.await.unwrap();
    assert_eq!(alice.status(), SessionStatus::Joined);
}
