//! Session lifecycle state machine for Code Sync.
//!
//! This module provides a pure, side-effect-free state machine for a
//! client's participation in a room. The machine takes events as input and
//! produces a new machine plus a list of actions to execute.
//!
//! The actual I/O (connecting the channel, sending the join request,
//! arming reconnect timers) is performed by sync-client, not by this module.
//!
//! ```text
//!                 join (valid)            join-accepted
//! Disconnected ────────────────▶ AttemptingJoin ────────────▶ Joined
//!      ▲                              │                          │
//!      │ failure reported             │ join-failed / drop       │ leave, drop,
//!      │                              ▼                          │ duplicate mount
//!      └──────────────────────── ConnectionFailed                │
//!      ▲                                                         │
//!      └─────────────────────────────────────────────────────────┘
//! ```

use std::fmt;
use std::time::Duration;

use codesync_types::{JoinFailureReason, JoinRequest, Participant, RoomId};

use crate::validation::{validate_join, Identity, ValidationErrors};

/// The coarse status of a session, one of four values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Not in a room.
    Disconnected,
    /// A join request is outstanding.
    AttemptingJoin,
    /// Member of a room.
    Joined,
    /// The last join failed; resets to `Disconnected` once reported.
    ConnectionFailed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::AttemptingJoin => "attempting join",
            SessionStatus::Joined => "joined",
            SessionStatus::ConnectionFailed => "connection failed",
        };
        f.write_str(name)
    }
}

/// Session state with the data each status carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Not in a room.
    Disconnected,
    /// Join request sent, waiting for the server.
    AttemptingJoin {
        /// What was sent in the join request.
        identity: Identity,
    },
    /// Member of a room.
    Joined {
        /// What was sent in the join request.
        identity: Identity,
        /// The local participant as registered by the server.
        local: Participant,
    },
    /// The join failed.
    ConnectionFailed {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl SessionState {
    /// The coarse status of this state.
    pub fn status(&self) -> SessionStatus {
        match self {
            SessionState::Disconnected => SessionStatus::Disconnected,
            SessionState::AttemptingJoin { .. } => SessionStatus::AttemptingJoin,
            SessionState::Joined { .. } => SessionStatus::Joined,
            SessionState::ConnectionFailed { .. } => SessionStatus::ConnectionFailed,
        }
    }
}

/// Reconnect backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay before the first reconnect attempt (before jitter).
    pub initial: Duration,
    /// Upper bound of the base delay.
    pub max: Duration,
    /// Upper bound of the random jitter added to the base delay.
    pub jitter: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            jitter: Duration::from_secs(1),
        }
    }
}

/// Session state machine - NO I/O, just state transitions.
#[derive(Debug, Clone)]
pub struct SessionMachine {
    state: SessionState,
    /// Armed on the first entry into `Joined`; consumed by the next mount
    /// of the join view while still joined.
    redirect_armed: bool,
    channel_connected: bool,
    reconnect_pending: bool,
    reconnect_attempt: u32,
    backoff: BackoffPolicy,
}

impl SessionMachine {
    /// Create a new machine in the Disconnected state.
    pub fn new() -> Self {
        Self::with_backoff(BackoffPolicy::default())
    }

    /// Create a new machine with a custom reconnect policy.
    pub fn with_backoff(backoff: BackoffPolicy) -> Self {
        Self {
            state: SessionState::Disconnected,
            redirect_armed: false,
            channel_connected: false,
            reconnect_pending: false,
            reconnect_attempt: 0,
            backoff,
        }
    }

    /// Process an event and return the new machine plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller (sync-client)
    /// is responsible for executing the returned actions. Events that make
    /// no sense in the current state leave the machine untouched.
    pub fn on_event(mut self, event: Event) -> (Self, Vec<Action>) {
        let state = std::mem::replace(&mut self.state, SessionState::Disconnected);

        let (state, actions) = match (state, event) {
            // Join requests are only accepted from Disconnected
            (SessionState::Disconnected, Event::JoinRequested { username, room_id }) => {
                match validate_join(&username, &room_id) {
                    Ok(identity) => {
                        let request = JoinRequest {
                            username: identity.username.clone(),
                            room_id: identity.room_id.clone(),
                        };
                        (
                            SessionState::AttemptingJoin { identity },
                            vec![Action::SendJoinRequest(request)],
                        )
                    }
                    Err(errors) => (
                        SessionState::Disconnected,
                        vec![Action::EmitEvent(SessionEvent::ValidationFailed(errors))],
                    ),
                }
            }

            // From AttemptingJoin
            (SessionState::AttemptingJoin { identity }, Event::JoinAccepted { user }) => {
                if user.username != identity.username || user.room_id != identity.room_id {
                    let reason = format!(
                        "server acknowledged {}@{} for a request as {}@{}",
                        user.username, user.room_id, identity.username, identity.room_id
                    );
                    (
                        SessionState::ConnectionFailed {
                            reason: reason.clone(),
                        },
                        vec![Action::EmitEvent(SessionEvent::JoinFailed { reason })],
                    )
                } else {
                    self.redirect_armed = true;
                    let actions = vec![
                        Action::EmitEvent(SessionEvent::Joined { user: user.clone() }),
                        Action::NavigateToEditor {
                            room_id: identity.room_id.clone(),
                            username: identity.username.clone(),
                        },
                    ];
                    (
                        SessionState::Joined {
                            identity,
                            local: user,
                        },
                        actions,
                    )
                }
            }
            (SessionState::AttemptingJoin { .. }, Event::JoinRejected { reason }) => {
                let reason = reason.to_string();
                (
                    SessionState::ConnectionFailed {
                        reason: reason.clone(),
                    },
                    vec![Action::EmitEvent(SessionEvent::JoinFailed { reason })],
                )
            }
            (SessionState::AttemptingJoin { .. }, Event::LeaveRequested) => {
                self.channel_connected = false;
                (
                    SessionState::Disconnected,
                    vec![
                        Action::Disconnect,
                        Action::Connect,
                        Action::EmitEvent(SessionEvent::Left),
                    ],
                )
            }

            // From ConnectionFailed
            (SessionState::ConnectionFailed { .. }, Event::FailureReported) => {
                (SessionState::Disconnected, vec![])
            }

            // From Joined
            (SessionState::Joined { .. }, Event::JoinViewMounted) if self.redirect_armed => {
                self.redirect_armed = false;
                self.channel_connected = false;
                (
                    SessionState::Disconnected,
                    vec![
                        Action::Disconnect,
                        Action::Connect,
                        Action::EmitEvent(SessionEvent::ChannelReset),
                    ],
                )
            }
            (SessionState::Joined { .. }, Event::LeaveRequested) => {
                self.redirect_armed = false;
                self.channel_connected = false;
                let mut actions = Vec::new();
                if self.reconnect_pending {
                    self.reconnect_pending = false;
                    actions.push(Action::CancelReconnect);
                }
                actions.extend([
                    Action::Disconnect,
                    Action::Connect,
                    Action::EmitEvent(SessionEvent::Left),
                ]);
                (SessionState::Disconnected, actions)
            }

            // Proactive reconnect when the join view finds the channel down
            (SessionState::Disconnected, Event::JoinViewMounted)
                if !self.channel_connected && !self.reconnect_pending =>
            {
                (SessionState::Disconnected, vec![Action::Connect])
            }

            // Channel lifecycle, any state
            (state, Event::ChannelConnected) => {
                self.channel_connected = true;
                self.reconnect_attempt = 0;
                let mut actions = Vec::new();
                if self.reconnect_pending {
                    self.reconnect_pending = false;
                    actions.push(Action::CancelReconnect);
                }
                (state, actions)
            }
            (state, Event::ConnectFailed { error }) => {
                self.channel_connected = false;
                self.on_channel_failure(state, error, false)
            }
            (state, Event::ChannelDropped { reason }) => {
                self.channel_connected = false;
                self.on_channel_failure(state, reason, true)
            }
            (state, Event::ReconnectTimer) => {
                let actions = if self.reconnect_pending && !self.channel_connected {
                    vec![Action::Connect]
                } else {
                    vec![]
                };
                self.reconnect_pending = false;
                (state, actions)
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        };

        self.state = state;
        (self, actions)
    }

    /// Shared handling for connect failures and unexpected drops.
    fn on_channel_failure(
        &mut self,
        state: SessionState,
        error: String,
        dropped: bool,
    ) -> (SessionState, Vec<Action>) {
        self.reconnect_attempt = self.reconnect_attempt.saturating_add(1);
        self.reconnect_pending = true;
        let delay = calculate_backoff(self.reconnect_attempt, &self.backoff);
        let timer = Action::StartReconnectTimer { delay };

        match state {
            SessionState::AttemptingJoin { .. } => (
                SessionState::ConnectionFailed {
                    reason: error.clone(),
                },
                vec![
                    Action::EmitEvent(SessionEvent::JoinFailed { reason: error }),
                    timer,
                ],
            ),
            SessionState::Joined { .. } => {
                self.redirect_armed = false;
                (
                    SessionState::Disconnected,
                    vec![
                        Action::EmitEvent(SessionEvent::Disconnected { reason: error }),
                        timer,
                    ],
                )
            }
            state => {
                let event = if dropped {
                    SessionEvent::Disconnected { reason: error }
                } else {
                    SessionEvent::ReconnectFailed {
                        attempt: self.reconnect_attempt,
                        error,
                    }
                };
                (state, vec![Action::EmitEvent(event), timer])
            }
        }
    }

    /// The current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The coarse status.
    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    /// Check if currently a member of a room.
    pub fn is_joined(&self) -> bool {
        matches!(self.state, SessionState::Joined { .. })
    }

    /// The identity of the outstanding or accepted join.
    pub fn identity(&self) -> Option<&Identity> {
        match &self.state {
            SessionState::AttemptingJoin { identity } | SessionState::Joined { identity, .. } => {
                Some(identity)
            }
            _ => None,
        }
    }

    /// The local participant, while joined.
    pub fn local_participant(&self) -> Option<&Participant> {
        match &self.state {
            SessionState::Joined { local, .. } => Some(local),
            _ => None,
        }
    }

    /// The room, while attempting or joined.
    pub fn room_id(&self) -> Option<&RoomId> {
        self.identity().map(|i| &i.room_id)
    }

    /// Check if the one-shot redirect guard is armed.
    pub fn redirect_armed(&self) -> bool {
        self.redirect_armed
    }

    /// Check if the machine believes the channel is connected.
    pub fn channel_connected(&self) -> bool {
        self.channel_connected
    }

    /// Number of consecutive channel failures since the last connect.
    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    /// Check if a reconnect timer is outstanding.
    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Events that can occur in the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// User submitted the join form.
    JoinRequested {
        /// Raw username input.
        username: String,
        /// Raw room id input.
        room_id: String,
    },
    /// Server accepted the join.
    JoinAccepted {
        /// The local participant as registered by the server.
        user: Participant,
    },
    /// Server rejected the join.
    JoinRejected {
        /// Server-provided reason.
        reason: JoinFailureReason,
    },
    /// The failure notice was shown to the user.
    FailureReported,
    /// The join view was (re)mounted.
    JoinViewMounted,
    /// User asked to leave the room.
    LeaveRequested,
    /// The channel finished connecting.
    ChannelConnected,
    /// A channel connect attempt failed.
    ConnectFailed {
        /// Error message describing the failure.
        error: String,
    },
    /// The channel was lost unexpectedly.
    ChannelDropped {
        /// Reason for the drop.
        reason: String,
    },
    /// Reconnect timer fired.
    ReconnectTimer,
}

/// Actions to be executed by the sync-client.
///
/// These are instructions, not side effects. The sync-client interprets
/// these and performs the actual I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Connect the channel.
    Connect,
    /// Disconnect the channel.
    Disconnect,
    /// Send the join request.
    SendJoinRequest(JoinRequest),
    /// Move the application to the editor view for the room.
    NavigateToEditor {
        /// Joined room.
        room_id: RoomId,
        /// Joined as.
        username: String,
    },
    /// Start a timer for reconnection.
    StartReconnectTimer {
        /// Delay before attempting reconnection.
        delay: Duration,
    },
    /// Cancel any pending reconnect timer.
    CancelReconnect,
    /// Emit an event to the application.
    EmitEvent(SessionEvent),
}

/// Events emitted to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Join input was rejected locally.
    ValidationFailed(ValidationErrors),
    /// Joined a room.
    Joined {
        /// The local participant.
        user: Participant,
    },
    /// The join attempt failed.
    JoinFailed {
        /// Why the join failed.
        reason: String,
    },
    /// Left the room on request.
    Left,
    /// The duplicate join-view mount was swallowed and the channel reset.
    ChannelReset,
    /// The channel went away.
    Disconnected {
        /// Reason for disconnection.
        reason: String,
    },
    /// A reconnection attempt failed.
    ReconnectFailed {
        /// Which reconnection attempt this was.
        attempt: u32,
        /// Error message describing the failure.
        error: String,
    },
}

/// Calculate reconnection backoff with jitter.
///
/// Formula: min(max, initial * 2^(attempt-1)) + random(0..=jitter)
pub fn calculate_backoff(attempt: u32, policy: &BackoffPolicy) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = policy
        .initial
        .checked_mul(1u32 << exponent)
        .unwrap_or(policy.max)
        .min(policy.max);

    base + random_jitter(policy.jitter)
}

/// Random jitter in `0..=max`, millisecond resolution.
///
/// Falls back to no jitter if the OS random source is unavailable.
fn random_jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    let mut bytes = [0u8; 8];
    if getrandom::getrandom(&mut bytes).is_err() {
        return Duration::ZERO;
    }
    Duration::from_millis(u64::from_le_bytes(bytes) % (max_ms + 1))
}
