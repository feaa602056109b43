//! CollabClient - the main interface for Code Sync.
//!
//! This module provides [`CollabClient`], the primary API for an editor
//! front end to join a room, share document edits and broadcast previews.
//!
//! # Architecture
//!
//! CollabClient owns the pure state machines from sync-core and interprets
//! the actions they produce to perform actual I/O via the [`Channel`] trait.
//! Everything runs on one task: operations take `&mut self`, so no locks
//! are needed and a handler always runs to completion before the next one.
//!
//! ```text
//! Application ──Command──▶ CollabClient ──frames──▶ Channel ──▶ Server
//!      ▲                       │   ▲
//!      └──────ClientEvent──────┘   └── sync-core (session, documents, preview)
//! ```
//!
//! Timers (typing pause, preview regeneration, reconnect) are deadlines held
//! by the state machines. [`CollabClient::run`] sleeps until the earliest
//! one; callers driving the client by hand use
//! [`CollabClient::fire_due_timers`].
//!
//! # Example
//!
//! ```ignore
//! use codesync_client::{ClientConfig, CollabClient, Document, MemoryHub};
//!
//! let hub = MemoryHub::new();
//! let (mut client, mut events) = CollabClient::new(hub.channel(), ClientConfig::default());
//!
//! client.connect().await;
//! client.join("alice", "room-42").await?;
//! client.receive_next().await?; // join-accepted
//! client.open_document(Document::new("index.html", "")).await;
//! client.edit("<p>hi</p>", 9).await?;
//! ```

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use codesync_core::{
    Action, Document, DocumentSync, Event, PreviewArtifact, PreviewBroadcaster, PreviewMode,
    PreviewOutcome, RemoteUpdate, RenderError, Roster, SessionEvent, SessionMachine,
    SessionStatus, ValidationErrors,
};
use codesync_types::{Message, Participant, ProtocolError, RequestDrawing, RoomId};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::channel::{Channel, ChannelError};
use crate::config::ClientConfig;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Frame could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Join input was rejected locally.
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The operation needs a joined room.
    #[error("not joined to a room")]
    NotJoined,

    /// The operation needs an open document.
    #[error("no document is open")]
    NoDocument,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Something worked.
    Success,
    /// Something failed; the client is already back in a retryable state.
    Error,
}

/// A transient user-facing message, the equivalent of a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text to show.
    pub message: String,
}

impl Notice {
    fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Events delivered to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Session lifecycle event.
    Session(SessionEvent),
    /// Show the editor view for the joined room.
    NavigateToEditor {
        /// Joined room.
        room_id: RoomId,
        /// Joined as.
        username: String,
    },
    /// A participant entered the room.
    PeerJoined(Participant),
    /// A participant left the room.
    PeerLeft(Participant),
    /// A participant's typing state or cursor changed.
    PeerTyping(Participant),
    /// The current document was replaced by a remote update.
    DocumentReplaced {
        /// Document name.
        file_name: String,
        /// New content.
        content: String,
    },
    /// A new preview artifact is displayed.
    PreviewUpdated(PreviewArtifact),
    /// Local rendering failed; the previous artifact stays and a retry is
    /// possible.
    PreviewFailed(RenderError),
    /// A peer asked to switch the room into drawing mode.
    DrawingRequested,
    /// Transient message for the user.
    Notice(Notice),
}

/// Requests accepted by [`CollabClient::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Submit the join form.
    Join {
        /// Raw username input.
        username: String,
        /// Raw room id input.
        room_id: String,
    },
    /// Leave the room.
    Leave,
    /// The join view was mounted.
    JoinViewMounted,
    /// Open a document, replacing the current one.
    OpenDocument(Document),
    /// Close the current document.
    CloseDocument,
    /// Local edit of the current document.
    Edit {
        /// Full new content.
        content: String,
        /// Cursor offset after the edit.
        cursor_position: usize,
    },
    /// Show the preview.
    OpenPreview,
    /// Hide the preview.
    ClosePreview,
    /// Retry a failed preview render.
    RetryPreview,
    /// Change the preview presentation.
    SetPreviewMode(PreviewMode),
    /// Ask the room to switch to drawing mode.
    RequestDrawing,
    /// Stop the loop and close the channel.
    Shutdown,
}

/// The main collaboration client.
///
/// Manages the session, the open document and the preview for one user.
pub struct CollabClient<C: Channel> {
    config: ClientConfig,
    channel: C,
    session: SessionMachine,
    documents: DocumentSync,
    preview: PreviewBroadcaster,
    roster: Roster,
    reconnect_at: Option<Instant>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl<C: Channel> CollabClient<C> {
    /// Create a new client and the receiver of its events.
    pub fn new(channel: C, config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let client = Self {
            session: SessionMachine::with_backoff(config.backoff()),
            documents: DocumentSync::with_typing_pause(config.typing_pause()),
            preview: PreviewBroadcaster::with_timing(config.preview_mode, config.preview_timing()),
            roster: Roster::new(),
            reconnect_at: None,
            events,
            config,
            channel,
        };
        (client, rx)
    }

    // ===========================================
    // Accessors
    // ===========================================

    /// The configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The session state machine.
    pub fn session(&self) -> &SessionMachine {
        &self.session
    }

    /// Current session status.
    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    /// The open document.
    pub fn document(&self) -> Option<&Document> {
        self.documents.current()
    }

    /// Preview state.
    pub fn preview(&self) -> &PreviewBroadcaster {
        &self.preview
    }

    /// Other participants of the room.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    // ===========================================
    // Session Operations
    // ===========================================

    /// Connect the channel to the configured server.
    pub async fn connect(&mut self) {
        self.execute(vec![Action::Connect]).await;
    }

    /// Validate input and send a join request.
    ///
    /// Connects first if the channel is down. Returns the field errors when
    /// validation fails; nothing is sent in that case. Server acceptance or
    /// rejection arrives later as a frame.
    pub async fn join(&mut self, username: &str, room_id: &str) -> Result<(), ClientError> {
        let mut actions = self.transition(Event::JoinRequested {
            username: username.to_string(),
            room_id: room_id.to_string(),
        });
        let sends_request = actions
            .iter()
            .any(|action| matches!(action, Action::SendJoinRequest(_)));
        if sends_request && !self.channel.is_connected() {
            actions.insert(0, Action::Connect);
        }

        let rejected = actions.iter().find_map(|action| match action {
            Action::EmitEvent(SessionEvent::ValidationFailed(errors)) => Some(errors.clone()),
            _ => None,
        });
        self.execute(actions).await;

        match rejected {
            Some(errors) => Err(ClientError::Validation(errors)),
            None => Ok(()),
        }
    }

    /// Leave the room.
    pub async fn leave(&mut self) {
        self.dispatch(Event::LeaveRequested).await;
    }

    /// Report that the join view was mounted.
    pub async fn join_view_mounted(&mut self) {
        self.dispatch(Event::JoinViewMounted).await;
    }

    // ===========================================
    // Document Operations
    // ===========================================

    /// Open a document, replacing the current one.
    ///
    /// Renders the preview immediately when it is open.
    pub async fn open_document(&mut self, document: Document) {
        tracing::debug!("Opening {}", document.name);
        self.documents.open(document);
        self.preview.reset();
        if self.preview.is_open() {
            let outcome = self.preview.open(self.documents.current(), unix_millis());
            self.on_preview_outcome(outcome).await;
        }
    }

    /// Close the current document.
    pub fn close_document(&mut self) -> Option<Document> {
        self.preview.reset();
        self.documents.close()
    }

    /// Apply a local edit to the current document.
    ///
    /// While joined the full content and a typing signal are sent right
    /// away; otherwise the edit stays local.
    pub async fn edit(
        &mut self,
        content: impl Into<String>,
        cursor_position: usize,
    ) -> Result<(), ClientError> {
        if self.documents.current().is_none() {
            return Err(ClientError::NoDocument);
        }

        let now = Instant::now().into_std();
        let joined = self.session.is_joined();
        let frames = self
            .documents
            .local_edit(content, cursor_position, now, joined);
        if let Some(document) = self.documents.current() {
            self.preview.content_changed(document, now);
        }
        self.send_frames(frames).await;
        Ok(())
    }

    /// Ask the room to switch into drawing mode.
    pub async fn request_drawing(&mut self) -> Result<(), ClientError> {
        if !self.session.is_joined() {
            return Err(ClientError::NotJoined);
        }
        self.send_frames(vec![Message::RequestDrawing(RequestDrawing {})])
            .await;
        Ok(())
    }

    // ===========================================
    // Preview Operations
    // ===========================================

    /// Show the preview and render the current document.
    pub async fn open_preview(&mut self) {
        let outcome = self.preview.open(self.documents.current(), unix_millis());
        self.on_preview_outcome(outcome).await;
    }

    /// Hide the preview, dropping any pending regeneration.
    pub fn close_preview(&mut self) {
        self.preview.close();
    }

    /// Re-render the current content after a failure.
    pub async fn retry_preview(&mut self) {
        let outcome = self.preview.retry(self.documents.current(), unix_millis());
        self.on_preview_outcome(outcome).await;
    }

    /// Change the preview presentation.
    pub fn set_preview_mode(&mut self, mode: PreviewMode) {
        self.preview.set_mode(mode);
    }

    // ===========================================
    // Inbound Frames and Timers
    // ===========================================

    /// Wait for one frame from the channel and handle it.
    ///
    /// A failed receive is treated as a lost connection.
    pub async fn receive_next(&mut self) -> Result<(), ClientError> {
        match self.channel.recv().await {
            Ok(frame) => self.handle_frame(&frame).await,
            Err(e) => {
                self.on_channel_error(e).await;
                Ok(())
            }
        }
    }

    /// Handle one inbound frame.
    pub async fn handle_frame(&mut self, frame: &[u8]) -> Result<(), ClientError> {
        let message = Message::from_bytes(frame)?;
        tracing::debug!("Received {}", message.event_name());

        match message {
            Message::JoinAccepted(accepted) => {
                let attempting = self.status() == SessionStatus::AttemptingJoin;
                let user = accepted.user.clone();
                self.dispatch(Event::JoinAccepted {
                    user: accepted.user,
                })
                .await;
                if attempting && self.session.is_joined() {
                    self.roster.seed(&user, &accepted.participants);
                }
            }
            Message::JoinFailed(failed) => {
                self.dispatch(Event::JoinRejected {
                    reason: failed.reason,
                })
                .await;
            }
            Message::PeerJoined(joined) => {
                if self.session.is_joined() && self.roster.peer_joined(joined.participant.clone())
                {
                    self.emit(ClientEvent::PeerJoined(joined.participant));
                }
            }
            Message::PeerLeft(left) => {
                if let Some(peer) = self.roster.peer_left(&left.peer_id) {
                    self.emit(ClientEvent::PeerLeft(peer));
                }
            }
            Message::FileUpdated(update) => match self.documents.apply_remote(&update) {
                RemoteUpdate::Applied => {
                    self.emit(ClientEvent::DocumentReplaced {
                        file_name: update.file_name,
                        content: update.content,
                    });
                }
                RemoteUpdate::NotCurrent => {
                    tracing::debug!("Ignoring update for {} (not open)", update.file_name);
                }
            },
            Message::TypingStarted(signal) => {
                if let Some(peer) = self.roster.typing_started(&signal) {
                    let peer = peer.clone();
                    self.emit(ClientEvent::PeerTyping(peer));
                }
            }
            Message::TypingPaused(signal) => {
                if let Some(peer) = self.roster.typing_paused(&signal) {
                    let peer = peer.clone();
                    self.emit(ClientEvent::PeerTyping(peer));
                }
            }
            Message::PreviewUpdated(update) => {
                let file_name = update.file_name.clone();
                if self
                    .preview
                    .apply_remote(update, self.documents.current_name())
                {
                    if let Some(artifact) = self.preview.artifact() {
                        let artifact = artifact.clone();
                        self.emit(ClientEvent::PreviewUpdated(artifact));
                    }
                } else {
                    tracing::debug!("Ignoring preview for {} (not open)", file_name);
                }
            }
            Message::RequestDrawing(_) => self.emit(ClientEvent::DrawingRequested),
            Message::JoinRequest(_) => {
                tracing::debug!("Ignoring join-request sent to a client");
            }
        }
        Ok(())
    }

    /// The earliest pending timer deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        [
            self.documents.typing_deadline().map(Instant::from_std),
            self.preview.deadline().map(Instant::from_std),
            self.reconnect_at,
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Run every timer whose deadline has passed.
    pub async fn fire_due_timers(&mut self) {
        let now = Instant::now();

        if let Some(paused) = self.documents.poll_typing(now.into_std()) {
            self.send_frames(vec![paused]).await;
        }

        let outcome = self
            .preview
            .poll(now.into_std(), self.documents.current(), unix_millis());
        self.on_preview_outcome(outcome).await;

        if self.reconnect_at.is_some_and(|at| at <= now) {
            self.reconnect_at = None;
            tracing::info!("Reconnecting to {}", self.config.server_url);
            self.dispatch(Event::ReconnectTimer).await;
        }
    }

    /// Drive the client until `Shutdown` or until the command sender is
    /// dropped.
    ///
    /// Waits concurrently for commands, inbound frames and the next timer
    /// deadline, and handles whichever comes first.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        tracing::info!("Client loop started");

        loop {
            let deadline = self.next_deadline();
            // Keep receiving until the session has seen the channel go
            // down: buffered frames drain first, then the close is reported.
            let listening = self.channel.is_connected() || self.session.channel_connected();

            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.apply(command).await,
                },
                frame = self.channel.recv(), if listening => match frame {
                    Ok(frame) => {
                        if let Err(e) = self.handle_frame(&frame).await {
                            tracing::warn!("Dropping inbound frame: {}", e);
                        }
                    }
                    Err(e) => self.on_channel_error(e).await,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_due_timers().await;
                }
            }
        }

        if let Err(e) = self.channel.close().await {
            tracing::debug!("Close on shutdown failed: {}", e);
        }
        tracing::info!("Client loop stopped");
    }

    async fn apply(&mut self, command: Command) {
        match command {
            Command::Join { username, room_id } => {
                if let Err(e) = self.join(&username, &room_id).await {
                    tracing::debug!("Join not sent: {}", e);
                }
            }
            Command::Leave => self.leave().await,
            Command::JoinViewMounted => self.join_view_mounted().await,
            Command::OpenDocument(document) => self.open_document(document).await,
            Command::CloseDocument => {
                self.close_document();
            }
            Command::Edit {
                content,
                cursor_position,
            } => {
                if let Err(e) = self.edit(content, cursor_position).await {
                    tracing::debug!("Edit ignored: {}", e);
                }
            }
            Command::OpenPreview => self.open_preview().await,
            Command::ClosePreview => self.close_preview(),
            Command::RetryPreview => self.retry_preview().await,
            Command::SetPreviewMode(mode) => self.set_preview_mode(mode),
            Command::RequestDrawing => {
                if let Err(e) = self.request_drawing().await {
                    tracing::debug!("Drawing request ignored: {}", e);
                }
            }
            Command::Shutdown => {}
        }
    }

    // ===========================================
    // Action Interpretation
    // ===========================================

    fn transition(&mut self, event: Event) -> Vec<Action> {
        let (machine, actions) = std::mem::take(&mut self.session).on_event(event);
        self.session = machine;
        actions
    }

    async fn dispatch(&mut self, event: Event) {
        let actions = self.transition(event);
        self.execute(actions).await;
    }

    /// Perform actions in order. Actions can feed events back into the
    /// session machine; their actions are appended to the queue.
    async fn execute(&mut self, actions: Vec<Action>) {
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            let follow_up = match action {
                Action::Connect => match self.channel.connect(&self.config.server_url).await {
                    Ok(()) => {
                        tracing::info!("Connected to {}", self.config.server_url);
                        Some(Event::ChannelConnected)
                    }
                    Err(e) => {
                        tracing::warn!("Connect to {} failed: {}", self.config.server_url, e);
                        Some(Event::ConnectFailed {
                            error: e.to_string(),
                        })
                    }
                },
                Action::Disconnect => {
                    if let Err(e) = self.channel.close().await {
                        tracing::debug!("Close failed: {}", e);
                    }
                    None
                }
                Action::SendJoinRequest(_)
                    if self.status() != SessionStatus::AttemptingJoin =>
                {
                    // The attempt already failed while connecting
                    None
                }
                Action::SendJoinRequest(request) => {
                    tracing::info!("Joining {} as {}", request.room_id, request.username);
                    match self.transmit(&Message::JoinRequest(request)).await {
                        Ok(()) => None,
                        Err(e) => {
                            tracing::warn!("Join request not sent: {}", e);
                            Some(Event::ChannelDropped {
                                reason: e.to_string(),
                            })
                        }
                    }
                }
                Action::NavigateToEditor { room_id, username } => {
                    self.emit(ClientEvent::NavigateToEditor { room_id, username });
                    None
                }
                Action::StartReconnectTimer { delay } => {
                    tracing::debug!("Reconnect in {:?}", delay);
                    self.reconnect_at = Some(Instant::now() + delay);
                    None
                }
                Action::CancelReconnect => {
                    self.reconnect_at = None;
                    None
                }
                Action::EmitEvent(event) => self.on_session_event(event),
            };

            if let Some(event) = follow_up {
                queue.extend(self.transition(event));
            }
        }
    }

    fn on_session_event(&mut self, event: SessionEvent) -> Option<Event> {
        let mut follow_up = None;

        match &event {
            SessionEvent::Joined { user } => {
                tracing::info!("Joined {} as {}", user.room_id, user.username);
                self.emit(ClientEvent::Notice(Notice::success(format!(
                    "Joined room {}",
                    user.room_id
                ))));
            }
            SessionEvent::JoinFailed { reason } => {
                tracing::warn!("Join failed: {}", reason);
                self.emit(ClientEvent::Notice(Notice::error(format!(
                    "Failed to join: {reason}"
                ))));
                // The failure is surfaced, so the machine may reset
                follow_up = Some(Event::FailureReported);
            }
            SessionEvent::Left | SessionEvent::ChannelReset => {
                self.roster.clear();
            }
            SessionEvent::Disconnected { reason } => {
                tracing::warn!("Disconnected: {}", reason);
                self.roster.clear();
                self.emit(ClientEvent::Notice(Notice::error(format!(
                    "Connection lost: {reason}"
                ))));
            }
            SessionEvent::ReconnectFailed { attempt, error } => {
                tracing::warn!("Reconnect attempt {} failed: {}", attempt, error);
            }
            SessionEvent::ValidationFailed(errors) => {
                tracing::debug!("{}", errors);
            }
        }

        self.emit(ClientEvent::Session(event));
        follow_up
    }

    async fn on_preview_outcome(&mut self, outcome: Option<PreviewOutcome>) {
        match outcome {
            Some(PreviewOutcome::Rendered(update)) => {
                tracing::debug!("Rendered preview of {}", update.file_name);
                if let Some(artifact) = self.preview.artifact() {
                    let artifact = artifact.clone();
                    self.emit(ClientEvent::PreviewUpdated(artifact));
                }
                self.send_frames(vec![Message::PreviewUpdated(update)])
                    .await;
            }
            Some(PreviewOutcome::Failed(error)) => {
                tracing::warn!("Preview render failed: {}", error);
                self.emit(ClientEvent::PreviewFailed(error));
                self.emit(ClientEvent::Notice(Notice::error(format!(
                    "Failed to update preview: {error}"
                ))));
            }
            None => {}
        }
    }

    async fn on_channel_error(&mut self, error: ChannelError) {
        tracing::warn!("Channel lost: {}", error);
        self.dispatch(Event::ChannelDropped {
            reason: error.to_string(),
        })
        .await;
    }

    /// Send frames in order while joined. Stops at the first failure,
    /// which is handled as a lost connection.
    async fn send_frames(&mut self, frames: Vec<Message>) {
        for message in frames {
            if !self.session.is_joined() {
                tracing::debug!("Not joined, dropping {}", message.event_name());
                break;
            }
            if let Err(e) = self.transmit(&message).await {
                tracing::warn!("Failed to send {}: {}", message.event_name(), e);
                self.dispatch(Event::ChannelDropped {
                    reason: e.to_string(),
                })
                .await;
                break;
            }
        }
    }

    async fn transmit(&self, message: &Message) -> Result<(), ClientError> {
        let frame = message.to_bytes()?;
        self.channel.send(&frame).await?;
        tracing::debug!("Sent {} ({} bytes)", message.event_name(), frame.len());
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        // A dropped receiver only means nobody is listening
        let _ = self.events.send(event);
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
