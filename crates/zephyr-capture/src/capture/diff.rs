use super::Snapshot;
use tracing::{debug, warn};

/// The part of the current turn's text already handed to the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionCursor {
    printed: String,
}

impl EmissionCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything emitted so far for this turn.
    pub fn printed(&self) -> &str {
        &self.printed
    }

    pub fn reset(&mut self) {
        self.printed.clear();
    }
}

/// Computes the unseen suffix of each snapshot.
///
/// Snapshot text is trimmed and, when enabled, a leading echo of the question
/// is removed before it is compared with the cursor. If the page replaced the
/// text instead of appending to it, the cursor jumps to the new text and
/// nothing is emitted, so the caller's stream never backtracks.
#[derive(Debug, Clone)]
pub struct DiffEmitter {
    echo: Option<String>,
}

impl DiffEmitter {
    pub fn new(question: &str, strip_echo: bool) -> Self {
        let question = question.trim();
        let echo = (strip_echo && !question.is_empty()).then(|| question.to_string());
        Self { echo }
    }

    /// Text as the caller should see it: trimmed, echo removed. A frame that
    /// holds only the start of the echo normalizes to the empty string.
    pub fn normalize<'a>(&self, raw: &'a str) -> &'a str {
        let text = raw.trim();
        match self.echo {
            Some(ref echo) if echo.starts_with(text) => "",
            Some(ref echo) => text.strip_prefix(echo.as_str()).map_or(text, str::trim),
            None => text,
        }
    }

    /// Advance `cursor` to `snapshot` and return the newly visible text.
    pub fn emit(&self, cursor: &mut EmissionCursor, snapshot: &Snapshot) -> String {
        let text = self.normalize(&snapshot.text);

        if text.is_empty() && !cursor.printed.is_empty() {
            // Node is mid re-render; keep what we have.
            debug!("blank answer frame, keeping {} chars", cursor.printed.len());
            return String::new();
        }

        match text.strip_prefix(cursor.printed.as_str()) {
            Some("") => String::new(),
            Some(suffix) => {
                let new_text = suffix.to_string();
                cursor.printed.push_str(&new_text);
                new_text
            }
            None => {
                warn!(
                    "answer text was replaced ({} -> {} chars), resyncing without re-emitting",
                    cursor.printed.len(),
                    text.len()
                );
                cursor.printed = text.to_string();
                String::new()
            }
        }
    }
}
