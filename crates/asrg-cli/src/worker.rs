//! The bundled reference `InferenceWorker`.
//!
//! Acoustic model internals are out of scope here (loading weights, GPU
//! placement, decoding strategy); `SilentWorker` only exercises the
//! scheduler/session machinery end to end. A production deployment swaps
//! this for a real model-backed `InferenceWorker` at the composition root
//! in `main.rs` — nothing above this trait boundary changes.

use asrg_scheduler::InferenceWorker;

pub struct SilentWorker;

impl InferenceWorker for SilentWorker {
    fn run_batch(&self, waveforms: &[Vec<f32>], sample_rates: &[u32]) -> Result<Vec<String>, String> {
        if waveforms.len() != sample_rates.len() {
            return Err("waveforms/sample_rates length mismatch".to_string());
        }
        Ok(waveforms.iter().map(|_| String::new()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_one_empty_transcript_per_waveform() {
        let worker = SilentWorker;
        let out = worker.run_batch(&[vec![0.0; 10], vec![0.0; 20]], &[16_000, 16_000]).unwrap();
        assert_eq!(out, vec![String::new(), String::new()]);
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let worker = SilentWorker;
        assert!(worker.run_batch(&[vec![0.0; 10]], &[16_000, 8_000]).is_err());
    }
}
