//! Microphone capture pipeline.
//!
//! Reads newly written samples from the device's circular buffer once per
//! sampling interval, encodes them as base64 PCM16 and sends them as append
//! messages. The first read after a (re)start only resynchronizes the cursor:
//! device start transients are discarded, never sent.

use std::time::{Duration, Instant};

use crate::core::audio;
use crate::errors::TransportError;
use crate::events::{EventSink, SessionEvent};
use crate::ports::CaptureDevice;
use crate::protocol::messages::ClientEvent;

/// Drives one capture device and its read cursor.
pub struct CapturePipeline {
    device: Box<dyn CaptureDevice>,
    interval: Duration,
    wire_rate: u32,
    /// Caller preference; forced off on device faults
    enabled: bool,
    /// Whether a capture run is in progress
    active: bool,
    cursor: usize,
    discard_next_read: bool,
    next_read_at: Option<Instant>,
    chunks_sent: u64,
    started_notified: bool,
    scratch: Vec<f32>,
}

impl CapturePipeline {
    /// Create a pipeline over a capture device port.
    pub fn new(device: Box<dyn CaptureDevice>, interval: Duration, wire_rate: u32) -> Self {
        Self {
            device,
            interval,
            wire_rate,
            enabled: true,
            active: false,
            cursor: 0,
            discard_next_read: false,
            next_read_at: None,
            chunks_sent: 0,
            started_notified: false,
            scratch: Vec::new(),
        }
    }

    /// Caller preference for capturing at all.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether the caller preference permits capture.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether a capture run is in progress.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Begin a capture run. A no-op when already active or not enabled.
    ///
    /// A device start failure logs, forces the enabled preference off and
    /// leaves the pipeline inactive.
    pub fn start(&mut self, now: Instant) {
        if self.active || !self.enabled {
            return;
        }
        if let Err(e) = self.device.start() {
            tracing::error!(error = %e, "capture device failed to start, disabling capture");
            self.enabled = false;
            return;
        }
        self.active = true;
        self.discard_next_read = true;
        self.next_read_at = Some(now + self.interval);
        self.chunks_sent = 0;
        self.started_notified = false;
    }

    /// Stop the capture run. Fires capture-stopped only if at least one chunk
    /// was actually sent since the last start.
    pub fn stop(&mut self, events: &EventSink) {
        if !self.active {
            return;
        }
        self.device.stop();
        self.active = false;
        self.next_read_at = None;
        if self.chunks_sent > 0 {
            events(SessionEvent::CaptureStopped);
        }
    }

    /// Advance the pipeline: restart a silently stopped device, and once per
    /// interval read the newly written samples and send them through `send`.
    pub fn tick(
        &mut self,
        now: Instant,
        send: &mut dyn FnMut(ClientEvent) -> Result<(), TransportError>,
        events: &EventSink,
    ) {
        if !self.active {
            return;
        }

        if !self.device.is_recording() {
            tracing::warn!("capture device silently stopped recording, restarting");
            if let Err(e) = self.device.start() {
                tracing::error!(error = %e, "capture device restart failed, disabling capture");
                self.enabled = false;
                self.active = false;
                return;
            }
            self.discard_next_read = true;
        }

        let due = match self.next_read_at {
            Some(at) => now >= at,
            None => false,
        };
        if !due {
            return;
        }
        self.next_read_at = Some(now + self.interval);

        let write = self.device.write_cursor();
        if self.discard_next_read {
            // Resynchronize past the start transient without sending
            self.cursor = write;
            self.discard_next_read = false;
            return;
        }

        let len = self.device.buffer_len();
        if len == 0 {
            return;
        }
        let count = (write + len - self.cursor) % len;
        if count == 0 {
            return;
        }

        self.scratch.clear();
        self.device.read_into(self.cursor, count, &mut self.scratch);
        self.cursor = write;

        let device_rate = self.device.sample_rate();
        let samples = if device_rate == self.wire_rate {
            &self.scratch
        } else {
            &audio::resample_linear(&self.scratch, device_rate, self.wire_rate)
        };

        let event = ClientEvent::audio_append(&audio::encode_pcm16(samples));
        match send(event) {
            Ok(()) => {
                self.chunks_sent += 1;
                if !self.started_notified {
                    self.started_notified = true;
                    events(SessionEvent::CaptureStarted);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping capture chunk, send failed");
            }
        }
    }
}
