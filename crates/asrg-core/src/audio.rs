//! PCM16 LE ↔ float32 conversion.
//!
//! The gateway's internal representation of audio is always `f32` in
//! `[-1.0, 1.0]`; the wire representation is always signed 16-bit
//! little-endian. Conversion happens at the adapter boundary (§6 of the
//! spec) so nothing upstream of the wire adapters ever sees raw PCM16 bytes.

/// Decode a PCM16 LE byte buffer into `f32` samples in `[-1.0, 1.0]`.
///
/// Trailing odd bytes (an incomplete sample) are dropped rather than
/// panicking, since a chunk boundary from the network layer is not
/// guaranteed to land on a sample boundary... except it always does for
/// this gateway's fixed-width frames. Dropping is defensive, not expected.
#[must_use]
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|c| f32::from(i16::from_le_bytes([c[0], c[1]])) / 32_768.0)
        .collect()
}

/// Encode `f32` samples in `[-1.0, 1.0]` back to PCM16 LE bytes.
///
/// Samples are clamped before scaling so out-of-range floats (a buggy
/// upstream synthesis step) cannot wrap around to the opposite sign.
#[must_use]
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        let clipped = s.clamp(-1.0, 1.0);
        #[allow(clippy::cast_possible_truncation)]
        let quantized = (clipped * 32_768.0) as i32;
        let sample = quantized.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Mean-square energy of a `f32` sample window, used by the segmentation
/// silence check (spec §4.3).
#[must_use]
pub fn mean_square_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    #[allow(clippy::cast_precision_loss)]
    (sum_sq / samples.len() as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_samples() {
        let original: Vec<i16> = vec![0, 1, -1, 32767, -32768, 1234, -1234];
        let bytes: Vec<u8> = original.iter().flat_map(|s| s.to_le_bytes()).collect();
        let floats = pcm16_to_f32(&bytes);
        let back = f32_to_pcm16(&floats);
        let decoded: Vec<i16> = back
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
        // -32768 / 32768.0 * 32768.0 re-quantizes to -32768 exactly; all other
        // samples are likewise exact because the spec's scale factor (32768)
        // has no rounding error for 16-bit inputs.
        assert_eq!(decoded, original);
    }

    #[test]
    fn odd_length_buffer_drops_trailing_byte() {
        let bytes = [0u8, 0, 1];
        assert_eq!(pcm16_to_f32(&bytes).len(), 1);
    }

    #[test]
    fn silence_has_zero_energy() {
        assert_eq!(mean_square_energy(&[0.0; 100]), 0.0);
    }

    #[test]
    fn full_scale_energy_is_one() {
        assert!((mean_square_energy(&[1.0; 100]) - 1.0).abs() < f32::EPSILON);
    }
}
