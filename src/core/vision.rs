//! Vision sub-request state.
//!
//! The assistant asks for visual context through a reserved function call.
//! At most one request is outstanding at a time; its answer (or an apology)
//! re-enters the conversation as a system message and a forced response.

/// Pending-request flag plus the in-flight prompt.
#[derive(Debug, Default)]
pub struct VisionRequestState {
    pending: bool,
    prompt: Option<String>,
}

impl VisionRequestState {
    /// Mark a request as in flight. Returns false when one already is.
    pub fn begin(&mut self, prompt: String) -> bool {
        if self.pending {
            return false;
        }
        self.pending = true;
        self.prompt = Some(prompt);
        true
    }

    /// Clear the in-flight request. Returns false when none was pending,
    /// which marks the completion as stale.
    pub fn finish(&mut self) -> bool {
        let was_pending = self.pending;
        self.pending = false;
        self.prompt = None;
        was_pending
    }

    /// Whether a request is outstanding.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// The in-flight prompt, when one is outstanding.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    /// Drop any outstanding request without side effects. Used on resets.
    pub fn reset(&mut self) {
        self.pending = false;
        self.prompt = None;
    }
}

/// System message embedding a successful vision answer.
pub fn answer_message(answer: &str) -> String {
    format!(
        "The vision system looked and answered: \"{answer}\". \
         Use this observation to continue the conversation naturally."
    )
}

/// System message for the failure path.
pub const VISION_APOLOGY: &str = "The vision system could not provide an answer. \
     Briefly apologize to the user and continue without the visual context.";
