//! Live preview rendering and broadcast for Code Sync.
//!
//! A previewable document is turned into a self-contained markup artifact:
//! fragments are wrapped in a minimal document, complete documents get a
//! badge injected. The artifact, not the source, is what peers receive, and
//! they display it verbatim.
//!
//! Regeneration is debounced by a quiet period that depends on the
//! [`PreviewMode`].

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use codesync_types::PreviewUpdated;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::debounce::Debounce;
use crate::document::{is_previewable_name, Document};

/// CSS class of the live-preview badge. Every artifact carries exactly one.
pub const BADGE_CLASS: &str = "codesync-preview-badge";

/// Where the preview is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewMode {
    /// Side panel next to the editor.
    #[default]
    Panel,
    /// Inline below the editor.
    Inline,
}

impl PreviewMode {
    /// Quiet period before regenerating after an edit.
    pub fn debounce(self) -> Duration {
        match self {
            PreviewMode::Panel => Duration::from_millis(1000),
            PreviewMode::Inline => Duration::from_millis(500),
        }
    }
}

/// Quiet periods per presentation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewTiming {
    /// Quiet period of the side panel.
    pub panel: Duration,
    /// Quiet period of the inline preview.
    pub inline: Duration,
}

impl PreviewTiming {
    /// Quiet period for a mode.
    pub fn for_mode(&self, mode: PreviewMode) -> Duration {
        match mode {
            PreviewMode::Panel => self.panel,
            PreviewMode::Inline => self.inline,
        }
    }
}

impl Default for PreviewTiming {
    fn default() -> Self {
        Self {
            panel: PreviewMode::Panel.debounce(),
            inline: PreviewMode::Inline.debounce(),
        }
    }
}

impl std::str::FromStr for PreviewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "panel" => Ok(PreviewMode::Panel),
            "inline" => Ok(PreviewMode::Inline),
            other => Err(format!("unknown preview mode: {other}")),
        }
    }
}

/// Content the transform refuses to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderError {
    /// A tag opens but never closes.
    #[error("unterminated tag at byte {offset}")]
    UnterminatedTag {
        /// Byte offset of the `<` in the trimmed content.
        offset: usize,
    },
    /// The content contains a NUL character.
    #[error("NUL character at byte {offset}")]
    NulCharacter {
        /// Byte offset in the trimmed content.
        offset: usize,
    },
}

/// A fully rendered preview document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewArtifact {
    /// Document the artifact was rendered from.
    pub file_name: String,
    /// Complete markup.
    pub markup: String,
    /// Render time, unix milliseconds.
    pub rendered_at: u64,
}

impl PreviewArtifact {
    /// The wire form of this artifact.
    pub fn to_message(&self) -> PreviewUpdated {
        PreviewUpdated {
            file_name: self.file_name.clone(),
            artifact: self.markup.clone(),
            rendered_at: self.rendered_at,
        }
    }
}

impl From<PreviewUpdated> for PreviewArtifact {
    fn from(update: PreviewUpdated) -> Self {
        Self {
            file_name: update.file_name,
            markup: update.artifact,
            rendered_at: update.rendered_at,
        }
    }
}

/// Render a document's content into a preview artifact.
pub fn render_artifact(
    file_name: &str,
    content: &str,
    rendered_at: u64,
) -> Result<PreviewArtifact, RenderError> {
    let content = content.trim();
    check_markup(content)?;

    let badge = badge(rendered_at);
    let lower = content.to_ascii_lowercase();
    let markup = if !lower.contains("<!doctype") && !lower.contains("<html") {
        envelope(file_name, content, &badge)
    } else if let Some(at) = lower
        .find("</body>")
        .or_else(|| lower.rfind("</html>"))
    {
        let mut out = String::with_capacity(content.len() + badge.len());
        out.push_str(&content[..at]);
        out.push_str(&badge);
        out.push_str(&content[at..]);
        out
    } else {
        format!("{content}\n{badge}")
    };

    Ok(PreviewArtifact {
        file_name: file_name.to_string(),
        markup,
        rendered_at,
    })
}

fn check_markup(content: &str) -> Result<(), RenderError> {
    // A tag is terminated iff some '>' follows it, i.e. the last one does
    let last_close = content.rfind('>');
    let mut chars = content.char_indices().peekable();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\0' => return Err(RenderError::NulCharacter { offset }),
            '<' => {
                let opens_tag = matches!(
                    chars.peek(),
                    Some((_, next)) if next.is_ascii_alphabetic() || *next == '/' || *next == '!'
                );
                if opens_tag && last_close.map_or(true, |close| close < offset) {
                    return Err(RenderError::UnterminatedTag { offset });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn badge(rendered_at: u64) -> String {
    format!(
        "<div class=\"{BADGE_CLASS}\">Live Preview &bull; {}</div>\n",
        clock_time(rendered_at)
    )
}

fn envelope(file_name: &str, fragment: &str, badge: &str) -> String {
    let mut out = String::with_capacity(fragment.len() + 1024);
    out.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    out.push_str("<meta charset=\"UTF-8\">\n");
    out.push_str(
        "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
    );
    let _ = writeln!(out, "<title>Live Preview - {}</title>", escape(file_name));
    out.push_str("<style>\n");
    out.push_str("* { box-sizing: border-box; }\n");
    out.push_str(
        "body { margin: 0; padding: 20px; font-family: system-ui, sans-serif; \
         line-height: 1.6; color: #333; background: #fff; }\n",
    );
    let _ = writeln!(
        out,
        ".{BADGE_CLASS} {{ position: fixed; top: 10px; right: 10px; \
         background: linear-gradient(135deg, #667eea 0%, #764ba2 100%); color: white; \
         padding: 6px 12px; border-radius: 20px; font-size: 11px; font-weight: 600; \
         z-index: 10000; }}"
    );
    out.push_str("</style>\n</head>\n<body>\n");
    out.push_str(badge);
    out.push_str("<div class=\"preview-content\">\n");
    out.push_str(fragment);
    out.push_str("\n</div>\n</body>\n</html>\n");
    out
}

/// `HH:MM:SS` (UTC) of a unix-millisecond timestamp.
fn clock_time(unix_ms: u64) -> String {
    let secs = (unix_ms / 1000) % 86_400;
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Result of a regeneration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    /// Rendering succeeded; broadcast this to the room.
    Rendered(PreviewUpdated),
    /// Rendering failed; the previous artifact is still displayed.
    Failed(RenderError),
}

/// Preview state of one client: visibility, the debounce, the displayed
/// artifact and the last render error.
#[derive(Debug, Clone)]
pub struct PreviewBroadcaster {
    mode: PreviewMode,
    timing: PreviewTiming,
    open: bool,
    regenerate: Debounce,
    artifact: Option<PreviewArtifact>,
    error: Option<RenderError>,
}

impl PreviewBroadcaster {
    /// Create a closed preview in the given mode.
    pub fn new(mode: PreviewMode) -> Self {
        Self::with_timing(mode, PreviewTiming::default())
    }

    /// Create with custom quiet periods.
    pub fn with_timing(mode: PreviewMode, timing: PreviewTiming) -> Self {
        Self {
            mode,
            timing,
            open: false,
            regenerate: Debounce::new(timing.for_mode(mode)),
            artifact: None,
            error: None,
        }
    }

    /// The presentation mode.
    pub fn mode(&self) -> PreviewMode {
        self.mode
    }

    /// Switch presentation mode, adopting its quiet period.
    pub fn set_mode(&mut self, mode: PreviewMode) {
        self.mode = mode;
        self.regenerate.set_delay(self.timing.for_mode(mode));
    }

    /// Check if the preview is visible.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Show the preview and render the document once, immediately.
    ///
    /// Returns `None` when there is no previewable document.
    pub fn open(&mut self, document: Option<&Document>, rendered_at: u64) -> Option<PreviewOutcome> {
        self.open = true;
        self.regenerate.cancel();
        self.render(document, rendered_at)
    }

    /// Hide the preview and drop any pending regeneration.
    pub fn close(&mut self) {
        self.open = false;
        self.regenerate.cancel();
    }

    /// Note a content change of the current document.
    pub fn content_changed(&mut self, document: &Document, now: Instant) {
        if self.open && document.is_previewable() {
            self.regenerate.schedule(now);
        }
    }

    /// Deadline of the pending regeneration, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.regenerate.deadline()
    }

    /// Regenerate once the quiet period has elapsed.
    pub fn poll(
        &mut self,
        now: Instant,
        document: Option<&Document>,
        rendered_at: u64,
    ) -> Option<PreviewOutcome> {
        if self.regenerate.fire(now) && self.open {
            self.render(document, rendered_at)
        } else {
            None
        }
    }

    /// Re-run the transform on the current content after a failure.
    pub fn retry(&mut self, document: Option<&Document>, rendered_at: u64) -> Option<PreviewOutcome> {
        self.error?;
        self.render(document, rendered_at)
    }

    /// Display an artifact received from a peer.
    ///
    /// Applied verbatim when it is for the current document, even while the
    /// preview is hidden.
    pub fn apply_remote(&mut self, update: PreviewUpdated, current: Option<&str>) -> bool {
        if current != Some(update.file_name.as_str()) {
            return false;
        }
        self.artifact = Some(update.into());
        self.error = None;
        true
    }

    /// The displayed artifact.
    pub fn artifact(&self) -> Option<&PreviewArtifact> {
        self.artifact.as_ref()
    }

    /// The last render error, cleared by the next success.
    pub fn error(&self) -> Option<&RenderError> {
        self.error.as_ref()
    }

    /// Forget the displayed artifact, e.g. when another document is opened.
    pub fn reset(&mut self) {
        self.regenerate.cancel();
        self.artifact = None;
        self.error = None;
    }

    fn render(&mut self, document: Option<&Document>, rendered_at: u64) -> Option<PreviewOutcome> {
        let document = document.filter(|d| is_previewable_name(&d.name))?;
        match render_artifact(&document.name, &document.content, rendered_at) {
            Ok(artifact) => {
                let update = artifact.to_message();
                self.artifact = Some(artifact);
                self.error = None;
                Some(PreviewOutcome::Rendered(update))
            }
            Err(err) => {
                self.error = Some(err);
                Some(PreviewOutcome::Failed(err))
            }
        }
    }
}

impl Default for PreviewBroadcaster {
    fn default() -> Self {
        Self::new(PreviewMode::default())
    }
}
