//! Reconnect scheduling and the idle watchdog.
//!
//! Reconnects use a fixed delay, not exponential backoff: re-synchronization
//! latency stays bounded and predictable for a conversational session. The
//! idle watchdog force-closes an open connection that has seen no traffic in
//! either direction for the configured threshold, which then rides the normal
//! close-then-reconnect path.

use std::time::{Duration, Instant};

/// How a server-reported error code relates to retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Token, session and rate-limit conditions: always retried
    AlwaysRetry,
    /// Anything else: retried unless a reconnect is already pending or a
    /// token acquisition is in progress
    RetryUnlessBusy,
}

/// Classify a server error code for retry purposes.
pub fn classify_error(code: Option<&str>) -> RetryClass {
    match code.unwrap_or_default() {
        "token_expired" | "invalid_token" | "invalid_api_key" | "session_not_found"
        | "session_expired" | "rate_limit_exceeded" | "rate_limited" => RetryClass::AlwaysRetry,
        _ => RetryClass::RetryUnlessBusy,
    }
}

/// Fixed-delay reconnect scheduler. At most one reconnect pending at a time.
#[derive(Debug)]
pub struct ReconnectPolicy {
    delay: Duration,
    due_at: Option<Instant>,
}

impl ReconnectPolicy {
    /// Create a policy with the given fixed delay.
    pub fn new(delay: Duration) -> Self {
        Self { delay, due_at: None }
    }

    /// Schedule a reconnect `delay` from `now`. A no-op if one is pending.
    /// Returns true when a new reconnect was scheduled.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.due_at.is_some() {
            return false;
        }
        self.due_at = Some(now + self.delay);
        tracing::info!(delay_ms = self.delay.as_millis() as u64, "reconnect scheduled");
        true
    }

    /// Whether a reconnect is pending.
    pub fn is_pending(&self) -> bool {
        self.due_at.is_some()
    }

    /// Consume the pending reconnect if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> bool {
        match self.due_at {
            Some(due) if now >= due => {
                self.due_at = None;
                true
            }
            _ => false,
        }
    }

    /// Drop any pending reconnect.
    pub fn cancel(&mut self) {
        self.due_at = None;
    }
}

/// Tracks inactivity on an open connection.
#[derive(Debug)]
pub struct IdleWatchdog {
    threshold: Duration,
    last_activity: Instant,
}

impl IdleWatchdog {
    /// Create a watchdog with the given silence threshold.
    pub fn new(threshold: Duration, now: Instant) -> Self {
        Self {
            threshold,
            last_activity: now,
        }
    }

    /// Record activity (any inbound or outbound message).
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Whether the silence threshold has been exceeded.
    pub fn expired(&self, now: Instant) -> bool {
        now.duration_since(self.last_activity) >= self.threshold
    }
}
