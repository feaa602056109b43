//! Two clients collaborating through an in-memory hub.
//!
//! "bob" runs the client loop on its own task, the way an editor would.
//! "alice" is driven step by step: she joins, types, opens the preview and
//! leaves. Everything bob observes is printed.

use anyhow::{anyhow, bail, Context, Result};
use codesync_client::{
    ClientConfig, ClientEvent, CollabClient, Command, Document, MemoryHub, NoticeLevel,
    SessionEvent, SessionStatus,
};
use codesync_core::{is_previewable_name, validate_join};
use std::time::Duration;
use tokio::sync::mpsc;

/// Longest wait for bob to observe one step.
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the demo command.
pub async fn run(room: &str, file: &str, config: ClientConfig) -> Result<()> {
    for line in session(room, file, config).await? {
        println!("{}", line);
    }
    Ok(())
}

/// Play the scripted session and return the transcript.
pub async fn session(room: &str, file: &str, config: ClientConfig) -> Result<Vec<String>> {
    validate_join("alice", room)?;

    let config = config.with_server_url("memory://demo");
    let hub = MemoryHub::new();
    let mut transcript = Vec::new();

    // bob: event loop on its own task
    let (mut bob, mut bob_events) = CollabClient::new(hub.channel(), config.clone());
    let (commands, rx) = mpsc::channel(16);
    let bob_task = tokio::spawn(async move {
        bob.run(rx).await;
    });

    send(&commands, Command::OpenDocument(Document::new(file, ""))).await?;
    send(
        &commands,
        Command::Join {
            username: "bob".into(),
            room_id: room.into(),
        },
    )
    .await?;
    observe(&mut bob_events, &mut transcript, |event| {
        matches!(event, ClientEvent::NavigateToEditor { .. })
    })
    .await?;

    // alice: driven by hand
    let (mut alice, _alice_events) = CollabClient::new(hub.channel(), config.clone());
    alice.join("alice", room).await?;
    alice.receive_next().await?;
    if alice.status() != SessionStatus::Joined {
        bail!("alice could not join {}", room);
    }
    transcript.push(format!("alice > joined {}", room));
    observe(&mut bob_events, &mut transcript, |event| {
        matches!(event, ClientEvent::PeerJoined(_))
    })
    .await?;

    alice.open_document(Document::new(file, "")).await;
    let snapshots = [
        "<h1>Hello</h1>".to_string(),
        "<h1>Hello from alice</h1>".to_string(),
        format!("<h1>Hello from alice</h1>\n<p>Editing {file} in {room}.</p>"),
    ];
    for content in &snapshots {
        alice.edit(content.as_str(), content.len()).await?;
        transcript.push(format!("alice > edit ({} bytes)", content.len()));
    }

    let previewable = is_previewable_name(file);
    if previewable {
        alice.open_preview().await;
        transcript.push("alice > opened preview".to_string());
    }

    // Let the typing burst settle so the pause goes out
    tokio::time::sleep(config.typing_pause() + Duration::from_millis(20)).await;
    alice.fire_due_timers().await;

    let mut saw_preview = !previewable;
    let mut saw_pause = false;
    observe(&mut bob_events, &mut transcript, |event| {
        match event {
            ClientEvent::PreviewUpdated(_) => saw_preview = true,
            ClientEvent::PeerTyping(peer) if !peer.typing => saw_pause = true,
            _ => {}
        }
        saw_preview && saw_pause
    })
    .await?;

    alice.leave().await;
    transcript.push("alice > left".to_string());
    observe(&mut bob_events, &mut transcript, |event| {
        matches!(event, ClientEvent::PeerLeft(_))
    })
    .await?;

    send(&commands, Command::Shutdown).await?;
    bob_task.await.context("bob's client task failed")?;

    tracing::info!("Demo finished ({} lines)", transcript.len());
    Ok(transcript)
}

async fn send(commands: &mpsc::Sender<Command>, command: Command) -> Result<()> {
    commands
        .send(command)
        .await
        .map_err(|_| anyhow!("bob's client loop has stopped"))
}

/// Record bob's events until `done` accepts one.
async fn observe(
    events: &mut mpsc::UnboundedReceiver<ClientEvent>,
    transcript: &mut Vec<String>,
    mut done: impl FnMut(&ClientEvent) -> bool,
) -> Result<()> {
    let wait = async {
        while let Some(event) = events.recv().await {
            if let Some(line) = describe(&event) {
                transcript.push(format!("bob   < {}", line));
            }
            if done(&event) {
                return Ok(());
            }
        }
        Err(anyhow!("bob's event stream ended"))
    };

    tokio::time::timeout(STEP_TIMEOUT, wait)
        .await
        .context("Timed out waiting for bob")?
}

/// One transcript line per event worth showing.
fn describe(event: &ClientEvent) -> Option<String> {
    let line = match event {
        ClientEvent::NavigateToEditor { room_id, username } => {
            format!("joined {} as {}", room_id, username)
        }
        ClientEvent::PeerJoined(peer) => format!("{} joined", peer.username),
        ClientEvent::PeerLeft(peer) => format!("{} left", peer.username),
        ClientEvent::PeerTyping(peer) if peer.typing => match peer.cursor_position {
            Some(cursor) => format!("{} is typing (cursor {})", peer.username, cursor),
            None => format!("{} is typing", peer.username),
        },
        ClientEvent::PeerTyping(peer) => format!("{} stopped typing", peer.username),
        ClientEvent::DocumentReplaced { file_name, content } => {
            format!("{} replaced: {:?}", file_name, content)
        }
        ClientEvent::PreviewUpdated(artifact) => format!(
            "preview of {} ({} bytes)",
            artifact.file_name,
            artifact.markup.len()
        ),
        ClientEvent::PreviewFailed(error) => format!("preview failed: {}", error),
        ClientEvent::DrawingRequested => "drawing mode requested".to_string(),
        ClientEvent::Notice(notice) => match notice.level {
            NoticeLevel::Success => format!("ok: {}", notice.message),
            NoticeLevel::Error => format!("error: {}", notice.message),
        },
        ClientEvent::Session(SessionEvent::Disconnected { reason }) => {
            format!("disconnected: {}", reason)
        }
        ClientEvent::Session(_) => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> ClientConfig {
        ClientConfig::default().with_typing_pause(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn bob_sees_alice_edit_and_preview() {
        let transcript = session("room-42", "index.html", fast_config())
            .await
            .unwrap();

        let bob: Vec<_> = transcript.iter().filter(|l| l.starts_with("bob")).collect();
        assert!(bob.iter().any(|l| l.contains("joined room-42 as bob")));
        assert!(bob.iter().any(|l| l.contains("alice joined")));
        assert!(bob
            .iter()
            .any(|l| l.contains("index.html replaced") && l.contains("Hello from alice")));
        assert!(bob.iter().any(|l| l.contains("preview of index.html")));
        assert!(bob.iter().any(|l| l.contains("alice stopped typing")));
        assert!(bob.last().unwrap().contains("alice left"));
    }

    #[tokio::test]
    async fn non_html_document_skips_preview() {
        let transcript = session("room-42", "notes.txt", fast_config())
            .await
            .unwrap();

        assert!(!transcript.iter().any(|l| l.contains("preview")));
        assert!(transcript.iter().any(|l| l.contains("notes.txt replaced")));
    }

    #[tokio::test]
    async fn invalid_room_fails() {
        let result = session("r1", "index.html", fast_config()).await;
        assert!(result.is_err());
    }

    #[test]
    fn session_events_are_mostly_silent() {
        let event = ClientEvent::Session(SessionEvent::Left);
        assert!(describe(&event).is_none());

        let event = ClientEvent::Session(SessionEvent::Disconnected {
            reason: "gone".into(),
        });
        assert_eq!(describe(&event).unwrap(), "disconnected: gone");
    }
}
