//! Transcript heuristics.
//!
//! Two places couple conversation flow to literal characters in model output:
//! the end-of-speech punctuation sniff and the single-word coherence check on
//! inbound transcripts. Both are deliberately isolated here, and the
//! end-of-speech rule is pluggable, so a future explicit protocol signal can
//! replace them without touching the state machine.

use std::sync::Arc;

/// What the finished transcript asks the session to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Nothing signaled; normal gating applies
    Neutral,
    /// Trailing question: the assistant expects an answer, re-enable the mic
    ExpectsReply,
    /// Conversation-end marker: wrap up, optionally disabling the mic
    ConversationEnded,
}

/// Pluggable predicate mapping a finished transcript to a [`SpeechOutcome`].
pub type EndOfSpeechPredicate = Arc<dyn Fn(&str) -> SpeechOutcome + Send + Sync>;

/// The default punctuation rule: trailing `?` expects a reply; a trailing `;`
/// or a `.;` fragment marks the conversation as ended.
pub fn punctuation_outcome(transcript: &str) -> SpeechOutcome {
    let trimmed = transcript.trim();
    if trimmed.ends_with(';') || trimmed.contains(".;") {
        SpeechOutcome::ConversationEnded
    } else if trimmed.ends_with('?') {
        SpeechOutcome::ExpectsReply
    } else {
        SpeechOutcome::Neutral
    }
}

/// The default [`EndOfSpeechPredicate`].
pub fn default_predicate() -> EndOfSpeechPredicate {
    Arc::new(punctuation_outcome)
}

/// Short acknowledgement phrases accepted as coherent single-word input.
pub const DEFAULT_ACKNOWLEDGEMENTS: &[&str] = &[
    "yes", "no", "ok", "okay", "sure", "yeah", "yep", "nope", "stop", "hello", "hi", "thanks",
];

/// Whether an inbound user transcript is worth forcing a response for.
///
/// Empty (after trimming and newline stripping) is incoherent. Single-word
/// transcripts are rejected unless the word, stripped of trailing
/// punctuation, matches the acknowledgement allow-list case-insensitively.
pub fn is_coherent(transcript: &str, acknowledgements: &[String]) -> bool {
    let cleaned = transcript.replace(['\n', '\r'], " ");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return false;
    }

    let mut words = cleaned.split_whitespace();
    let first = words.next().unwrap_or_default();
    if words.next().is_some() {
        return true;
    }

    let bare = first.trim_end_matches(['.', ',', '!', '?']);
    acknowledgements.iter().any(|a| a.eq_ignore_ascii_case(bare))
}
