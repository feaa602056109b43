//! # sync-core
//!
//! Pure logic for Code Sync (no I/O, instant tests).
//!
//! This crate implements the session state machine, document
//! synchronization and the preview transform without any network or timer
//! I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is passed in as an `Instant`, never read from
//! a clock. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (channel, timers) is performed by `sync-client`, which
//! interprets the actions produced by these state machines.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod debounce;
pub mod document;
pub mod preview;
pub mod roster;
pub mod session;
pub mod validation;

pub use debounce::{Debounce, PendingTimer};
pub use document::{is_previewable_name, Document, DocumentSync, RemoteUpdate, DEFAULT_TYPING_PAUSE};
pub use preview::{
    render_artifact, PreviewArtifact, PreviewBroadcaster, PreviewMode, PreviewOutcome,
    PreviewTiming, RenderError, BADGE_CLASS,
};
pub use roster::Roster;
pub use session::{
    calculate_backoff, Action, BackoffPolicy, Event, SessionEvent, SessionMachine, SessionState,
    SessionStatus,
};
pub use validation::{
    validate_join, FieldError, Identity, JoinField, ValidationErrors, ROOM_ID_MIN_CHARS,
    USERNAME_MAX_CHARS, USERNAME_MIN_CHARS,
};
