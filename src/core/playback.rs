//! Assistant audio playback pipeline.
//!
//! Inbound audio deltas are base64 PCM16 at the wire rate. Each one is
//! decoded, converted to float, resampled to the render device's actual rate
//! and pushed onto the shared [`SampleQueue`] the pull-based render callback
//! drains.

use crate::core::audio;
use crate::core::queue::SampleQueue;
use crate::errors::DataError;
use crate::protocol::messages::ServerEvent;

/// Decodes inbound audio and feeds the render queue.
pub struct PlaybackPipeline {
    queue: SampleQueue,
    wire_rate: u32,
    output_rate: u32,
}

impl PlaybackPipeline {
    /// Create a pipeline converting from the wire rate to the render rate.
    pub fn new(wire_rate: u32, output_rate: u32) -> Self {
        Self {
            queue: SampleQueue::new(),
            wire_rate,
            output_rate,
        }
    }

    /// Handle to the shared sample queue, for the render context.
    pub fn queue(&self) -> SampleQueue {
        self.queue.clone()
    }

    /// Decode one audio delta and enqueue its samples.
    pub fn handle_delta(&self, delta: &str) -> Result<(), DataError> {
        let bytes = ServerEvent::decode_audio_delta(delta)?;
        let samples = audio::decode_pcm16(&bytes);
        let resampled = audio::resample_linear(&samples, self.wire_rate, self.output_rate);
        self.queue.push_slice(&resampled);
        Ok(())
    }

    /// Drop any queued audio. Called on disconnect and shutdown.
    pub fn stop(&self) {
        self.queue.clear();
    }

    /// Whether queued audio is still draining to the render callback.
    pub fn is_draining(&self) -> bool {
        !self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::prelude::*;

    fn delta_for(samples: &[f32]) -> String {
        BASE64_STANDARD.encode(audio::encode_pcm16(samples))
    }

    #[test]
    fn test_delta_decoded_and_queued() {
        let p = PlaybackPipeline::new(24000, 24000);
        p.handle_delta(&delta_for(&[0.25, -0.25, 0.5])).unwrap();
        assert!(p.is_draining());

        let q = p.queue();
        assert_eq!(q.len(), 3);
        assert!((q.pop().unwrap() - 0.25).abs() < 1.0 / 32767.0);
    }

    #[test]
    fn test_delta_resampled_to_output_rate() {
        let p = PlaybackPipeline::new(24000, 48000);
        p.handle_delta(&delta_for(&[0.1; 240])).unwrap();
        assert_eq!(p.queue().len(), 480);
    }

    #[test]
    fn test_bad_base64_is_a_data_error() {
        let p = PlaybackPipeline::new(24000, 24000);
        assert!(p.handle_delta("!!! not base64 !!!").is_err());
        assert!(!p.is_draining());
    }

    #[test]
    fn test_render_pull_emits_silence_when_drained() {
        let p = PlaybackPipeline::new(24000, 24000);
        p.handle_delta(&delta_for(&[1.0])).unwrap();

        let q = p.queue();
        let mut frames = [9.0f32; 4];
        q.fill(&mut frames, 2);
        assert!((frames[0] - frames[1]).abs() < f32::EPSILON);
        assert_eq!(&frames[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_stop_clears_queue() {
        let p = PlaybackPipeline::new(24000, 24000);
        p.handle_delta(&delta_for(&[0.5; 10])).unwrap();
        p.stop();
        assert!(!p.is_draining());
    }
}
