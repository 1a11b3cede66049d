//! PCM16 conversion and linear-interpolation resampling.
//!
//! The wire carries 16-bit signed little-endian PCM; the engine side works in
//! floats. Encoding clamps to [-1, 1] and rounds; decoding divides by 32768.

/// Encode float samples to PCM16 little-endian bytes.
///
/// `round(clamp(x, -1, 1) * 32767)` per sample.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0).round() as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Decode PCM16 little-endian bytes to float samples (`pcm16 / 32768`).
///
/// A trailing odd byte is dropped.
pub fn decode_pcm16(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Resample a mono buffer between sample rates using linear interpolation.
///
/// Resampling to the input rate returns the input unchanged.
pub fn resample_linear(input: &[f32], from_hz: u32, to_hz: u32) -> Vec<f32> {
    if from_hz == to_hz || input.is_empty() {
        return input.to_vec();
    }

    let ratio = from_hz as f64 / to_hz as f64;
    let out_len = ((input.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let pos = i as f64 * ratio;
        let index = pos as usize;
        let frac = (pos - index as f64) as f32;
        let a = input[index.min(input.len() - 1)];
        let b = input[(index + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}
