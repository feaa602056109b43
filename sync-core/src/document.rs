//! Document synchronization for Code Sync.
//!
//! Every local edit is broadcast immediately as a full-content
//! `file-updated` frame, followed by a `typing-started` signal carrying the
//! cursor offset. A single `typing-paused` signal follows once the author
//! has been quiet for the typing window.
//!
//! Inbound updates replace the local content wholesale. There are no
//! sequence numbers: the last update received wins.

use std::time::{Duration, Instant};

use codesync_types::{FileUpdated, Message, TypingPaused, TypingStarted};

use crate::debounce::Debounce;

/// Default quiet period before `typing-paused` is sent.
pub const DEFAULT_TYPING_PAUSE: Duration = Duration::from_millis(1000);

/// A named text document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name, the document's identity.
    pub name: String,
    /// Full text.
    pub content: String,
}

impl Document {
    /// Create a document.
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Check if the preview subsystem applies to this document.
    ///
    /// True for `.html` and `.htm` names, ignoring case.
    pub fn is_previewable(&self) -> bool {
        is_previewable_name(&self.name)
    }
}

/// Check if a file name has a previewable extension.
pub fn is_previewable_name(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"),
        None => false,
    }
}

/// Outcome of applying an inbound `file-updated` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteUpdate {
    /// The current document was replaced.
    Applied,
    /// The update targets a document that is not open.
    NotCurrent,
}

/// The current document plus the typing-pause timer.
///
/// At most one document is open at a time. Updates for any other name are
/// dropped, not buffered.
#[derive(Debug, Clone)]
pub struct DocumentSync {
    current: Option<Document>,
    typing: Debounce,
}

impl DocumentSync {
    /// Create with the default typing window.
    pub fn new() -> Self {
        Self::with_typing_pause(DEFAULT_TYPING_PAUSE)
    }

    /// Create with a custom typing window.
    pub fn with_typing_pause(window: Duration) -> Self {
        Self {
            current: None,
            typing: Debounce::new(window),
        }
    }

    /// Open a document, replacing the current one.
    ///
    /// A pending typing-pause for the previous document is dropped.
    pub fn open(&mut self, document: Document) {
        self.typing.cancel();
        self.current = Some(document);
    }

    /// Close the current document.
    pub fn close(&mut self) -> Option<Document> {
        self.typing.cancel();
        self.current.take()
    }

    /// The current document.
    pub fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    /// Name of the current document.
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_ref().map(|d| d.name.as_str())
    }

    /// Apply a local edit and return the frames to send.
    ///
    /// The local content always changes. Frames are produced only when
    /// `joined` is true: the full content first, then the typing signal.
    /// Each edit reschedules the typing-pause deadline.
    pub fn local_edit(
        &mut self,
        content: impl Into<String>,
        cursor_position: usize,
        now: Instant,
        joined: bool,
    ) -> Vec<Message> {
        let Some(doc) = self.current.as_mut() else {
            return Vec::new();
        };
        doc.content = content.into();

        if !joined {
            return Vec::new();
        }

        self.typing.schedule(now);
        vec![
            Message::FileUpdated(FileUpdated {
                file_name: doc.name.clone(),
                content: doc.content.clone(),
            }),
            Message::TypingStarted(TypingStarted {
                peer_id: None,
                cursor_position,
            }),
        ]
    }

    /// Deadline of the pending typing-pause, if any.
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing.deadline()
    }

    /// Return the `typing-paused` frame once the typing window has elapsed.
    pub fn poll_typing(&mut self, now: Instant) -> Option<Message> {
        if self.typing.fire(now) {
            Some(Message::TypingPaused(TypingPaused { peer_id: None }))
        } else {
            None
        }
    }

    /// Apply an inbound full-content update.
    pub fn apply_remote(&mut self, update: &FileUpdated) -> RemoteUpdate {
        match self.current.as_mut() {
            Some(doc) if doc.name == update.file_name => {
                doc.content.clone_from(&update.content);
                RemoteUpdate::Applied
            }
            _ => RemoteUpdate::NotCurrent,
        }
    }
}

impl Default for DocumentSync {
    fn default() -> Self {
        Self::new()
    }
}
