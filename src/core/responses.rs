//! In-flight turn accounting.
//!
//! One assistant turn runs from `response.created` to its matching
//! `response.done`; turns can nest when a forced response lands while another
//! is still streaming. The count never goes negative — a spurious extra done
//! clamps to zero and warns.

/// Counts in-flight assistant turns and accumulates the current transcript.
#[derive(Debug, Default)]
pub struct ResponseTracker {
    count: u32,
    transcript: String,
}

impl ResponseTracker {
    /// Create an idle tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a `response.created`. Returns true when this was the 0→1
    /// transition, i.e. the assistant just started speaking.
    pub fn created(&mut self) -> bool {
        self.count += 1;
        self.count == 1
    }

    /// Record a `response.done`. Returns the remaining in-flight count.
    pub fn done(&mut self) -> u32 {
        if self.count == 0 {
            tracing::warn!("response done with no response in flight, clamping at zero");
        } else {
            self.count -= 1;
        }
        self.count
    }

    /// Append a streamed transcript fragment for the current turn.
    pub fn append_delta(&mut self, delta: &str) {
        self.transcript.push_str(delta);
    }

    /// Finalize the current turn's transcript: accumulated delta text is
    /// preferred, inline payload text is the fallback. Clears the accumulator.
    pub fn finalize_transcript(&mut self, inline: Option<&str>) -> String {
        let accumulated = std::mem::take(&mut self.transcript);
        if !accumulated.is_empty() {
            accumulated
        } else {
            inline.unwrap_or_default().to_string()
        }
    }

    /// In-flight turn count.
    pub fn in_flight(&self) -> u32 {
        self.count
    }

    /// Whether no turn is in flight.
    pub fn is_idle(&self) -> bool {
        self.count == 0
    }

    /// Clear count and transcript. Called on every communication reset.
    pub fn reset(&mut self) {
        self.count = 0;
        self.transcript.clear();
    }
}
