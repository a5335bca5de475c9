//! Streaming suppression of echoed tool-result text.
//!
//! Agent runtimes sometimes re-emit a tool result verbatim inside the
//! assistant's free-text stream. The suppressor holds the expected text as a
//! target and withholds deltas while they remain a consistent prefix of it.
//! On a complete match the echo has been fully swallowed; on divergence every
//! withheld byte is released at once. The matcher never drops or duplicates
//! text.
//!
//! Targets are matched strictly in FIFO registration order, one at a time.

use std::collections::VecDeque;

/// Streaming FIFO text matcher for echoed tool results.
#[derive(Debug, Default)]
pub struct EchoSuppressor {
    /// Targets not yet activated, in registration order.
    queue: VecDeque<String>,
    /// Target currently being matched.
    active: Option<String>,
    /// Concatenation of all deltas withheld against the active target.
    matched: String,
}

impl EchoSuppressor {
    /// Create an empty suppressor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register text expected to be echoed back into the stream.
    ///
    /// Empty or whitespace-only targets are ignored: they could never
    /// complete a match and would stall the queue.
    pub fn expect_echo(&mut self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        self.queue.push_back(text.to_owned());
    }

    /// Filter one text delta through the matcher.
    ///
    /// Returns the text the UI should actually display: `""` while the
    /// accumulated deltas remain a consistent prefix of the active target,
    /// the full withheld accumulation on divergence, or the delta unchanged
    /// when no target is pending.
    pub fn filter_delta(&mut self, delta: &str) -> String {
        if self.active.is_none() {
            match self.queue.pop_front() {
                Some(next) => {
                    self.active = Some(next);
                    self.matched.clear();
                }
                None => return delta.to_owned(),
            }
        }

        self.matched.push_str(delta);

        let target_len = match self.active.as_deref() {
            Some(target) if target.starts_with(self.matched.as_str()) => target.len(),
            // Divergence: the echo assumption is falsified, so every
            // previously withheld delta must be released along with this one.
            _ => {
                self.active = None;
                return std::mem::take(&mut self.matched);
            }
        };

        if self.matched.len() == target_len {
            // Full echo swallowed.
            self.active = None;
            self.matched.clear();
        }
        String::new()
    }

    /// Whether any target is queued or actively being matched.
    #[must_use]
    pub fn has_pending_targets(&self) -> bool {
        self.active.is_some() || !self.queue.is_empty()
    }

    /// Number of targets queued or active.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.queue.len() + usize::from(self.active.is_some())
    }

    /// Drop all targets and withheld text (stream end, abort, error).
    pub fn reset(&mut self) {
        self.queue.clear();
        self.active = None;
        self.matched.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
