//! The per-connection session state machine (spec §4.3).
//!
//! A `Session` owns no wire knowledge: adapters (`asrg-wire`) feed it raw
//! PCM16 chunks and control events, and drain the `ServerFrame`s it returns.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use asrg_core::{pcm16_to_f32, GatewayConfig, GatewayError, Priority, ServerFrame};
use asrg_scheduler::MicroBatchScheduler;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::buffers::{RollingBuffer, SegmentBuffer};
use crate::settle_gate::{SettleGate, SettleGateConfig};
use crate::vad;

/// Coarse lifecycle state, mirrored into the session's `tracing` span on
/// close (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no audio yet.
    Open,
    /// Receiving audio, emitting partials and segment finals.
    Streaming,
    /// EOS/cap reached; draining pending segment finals.
    Flushing,
    /// Terminal.
    Closed,
}

type PendingReceiver = oneshot::Receiver<Result<asrg_core::WorkResult, GatewayError>>;

struct PendingSegment {
    idx: u64,
    receiver: PendingReceiver,
    submitted_at: Instant,
}

/// Per-connection streaming transcription state machine.
pub struct Session {
    config: Arc<GatewayConfig>,
    scheduler: Arc<MicroBatchScheduler>,
    sample_rate: u32,
    interim_enabled: bool,

    ctx_buf: RollingBuffer,
    full_buf: SegmentBuffer,
    bytes_since_last_emit: usize,
    last_emit_monotonic: Instant,
    total_bytes: usize,
    seg_idx: u64,
    pending_segments: VecDeque<PendingSegment>,
    settle_gate: SettleGate,

    state: SessionState,
}

impl Session {
    #[must_use]
    pub fn new(config: Arc<GatewayConfig>, scheduler: Arc<MicroBatchScheduler>, sample_rate: u32) -> Self {
        Self::with_interim(config, scheduler, sample_rate, true)
    }

    /// As [`Session::new`], but with `interim_enabled` set from the client
    /// handshake (spec §3 "`interim_enabled` — boolean, from handshake")
    /// instead of defaulting to `true`.
    #[must_use]
    pub fn with_interim(
        config: Arc<GatewayConfig>,
        scheduler: Arc<MicroBatchScheduler>,
        sample_rate: u32,
        interim_enabled: bool,
    ) -> Self {
        let ctx_cap = config.max_ctx_bytes(sample_rate);
        let settle_gate = SettleGate::new(SettleGateConfig {
            target_eos_ms: config.target_eos_ms,
            quiet_ms: config.quiet_ms,
            vad_hangover_ms: config.vad_hangover_ms,
        });
        Self {
            ctx_buf: RollingBuffer::new(ctx_cap),
            full_buf: SegmentBuffer::new(),
            bytes_since_last_emit: 0,
            last_emit_monotonic: Instant::now(),
            total_bytes: 0,
            seg_idx: 0,
            pending_segments: VecDeque::new(),
            settle_gate,
            state: SessionState::Open,
            interim_enabled,
            config,
            scheduler,
            sample_rate,
        }
    }

    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Process one inbound PCM16 LE chunk, returning any frames to emit.
    ///
    /// Implements spec §4.3's per-tick loop followed by segmentation
    /// evaluation on `full_buf`.
    pub async fn on_audio(&mut self, chunk: &[u8]) -> Vec<ServerFrame> {
        if self.state == SessionState::Open {
            self.state = SessionState::Streaming;
        }

        self.ctx_buf.push(chunk);
        self.full_buf.push(chunk);
        self.bytes_since_last_emit += chunk.len();
        self.total_bytes += chunk.len();

        let mut frames = Vec::new();

        if let Some(cap_frame) = self.check_audio_cap() {
            frames.push(cap_frame);
            return frames;
        }

        if let Some(frame) = self.maybe_emit_partial().await {
            frames.push(frame);
        }

        frames.extend(self.evaluate_segmentation());
        frames.extend(self.drain_pending_segments());

        frames
    }

    fn check_audio_cap(&mut self) -> Option<ServerFrame> {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let cap_bytes = (self.config.max_audio_seconds * f64::from(self.sample_rate)) as usize * 2;
        if self.total_bytes >= cap_bytes {
            warn!(sample_rate = self.sample_rate, "session exceeded max_audio_seconds, forcing flush");
            self.state = SessionState::Flushing;
            return Some(ServerFrame::Error {
                error: GatewayError::SessionCapExceeded.to_string(),
            });
        }
        None
    }

    async fn maybe_emit_partial(&mut self) -> Option<ServerFrame> {
        let step_bytes = self.config.step_bytes(self.sample_rate);
        if self.bytes_since_last_emit < step_bytes {
            return None;
        }

        let now = Instant::now();
        let queue_fraction = self.scheduler.load_fraction();
        let hot = self.config.decimation_when_hot
            && queue_fraction >= self.config.hot_queue_fraction
            && now.saturating_duration_since(self.last_emit_monotonic)
                < Duration::from_millis(self.config.decimation_min_interval_ms);
        if hot {
            debug!(queue_fraction, "decimating partial tick under hot queue");
            self.bytes_since_last_emit = 0;
            return None;
        }

        let waveform = pcm16_to_f32(&self.ctx_buf.as_contiguous());
        let rx = match self.scheduler.submit(waveform, self.sample_rate, Priority::Partial) {
            Ok(rx) => rx,
            Err(_queue_full) => {
                // Non-fatal for a partial: drop this tick like a timeout.
                self.bytes_since_last_emit = 0;
                return None;
            }
        };

        let deadline = Duration::from_secs_f64(self.config.tick_timeout_s);
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(Ok(result))) => {
                self.last_emit_monotonic = now;
                self.bytes_since_last_emit = 0;
                self.settle_gate.on_partial(now);
                if self.interim_enabled {
                    Some(ServerFrame::Partial { text: result.text })
                } else {
                    None
                }
            }
            Ok(Ok(Err(err))) => {
                self.bytes_since_last_emit = 0;
                warn!(error = %err, "partial tick inference failed");
                None
            }
            Ok(Err(_recv_dropped)) | Err(_timeout) => {
                // Deadline exceeded or the scheduler dropped the sender;
                // drop the tick silently but reset as though it had emitted
                // (spec §4.3 step 7), so a stall doesn't cause backlog.
                self.bytes_since_last_emit = 0;
                None
            }
        }
    }

    fn evaluate_segmentation(&mut self) -> Vec<ServerFrame> {
        let since_seg = self.full_buf.len();
        let segment_len_bytes = ms_to_bytes(self.config.segment_len_ms, self.sample_rate);
        let segment_min_bytes = ms_to_bytes(self.config.segment_min_ms, self.sample_rate);

        let should_cut = if since_seg >= segment_len_bytes {
            true
        } else if since_seg >= segment_min_bytes {
            let tail_bytes = ms_to_bytes(self.config.vad_tail_ms, self.sample_rate).min(since_seg);
            let tail_start = self.full_buf.len() - tail_bytes;
            let tail_samples = pcm16_to_f32(&self.full_buf.as_slice()[tail_start..]);
            let now = Instant::now();
            if vad::is_silent(&tail_samples, self.config.vad_energy_threshold) {
                self.settle_gate.on_vad_off(now);
            } else {
                self.settle_gate.on_partial(now);
            }
            // Eager finalization (spec §4.4): cut once the settle gate has
            // seen enough observed silence, rather than on a single
            // instantaneous tail-energy reading.
            self.settle_gate.should_flush(now)
        } else {
            false
        };

        if !should_cut {
            return Vec::new();
        }

        let overlap_bytes = ms_to_bytes(self.config.segment_overlap_ms, self.sample_rate);
        let payload = self.full_buf.cut(since_seg, overlap_bytes);
        self.submit_segment(payload);
        Vec::new()
    }

    fn submit_segment(&mut self, payload: Vec<u8>) {
        let waveform = pcm16_to_f32(&payload);
        match self.scheduler.submit(waveform, self.sample_rate, Priority::Final) {
            Ok(receiver) => {
                self.pending_segments.push_back(PendingSegment {
                    idx: self.seg_idx,
                    receiver,
                    submitted_at: Instant::now(),
                });
                self.seg_idx += 1;
            }
            Err(err) => {
                warn!(error = %err, "segment submit rejected, audio dropped");
            }
        }
    }

    /// Drain completed segment futures from the front of the queue, in
    /// order, stopping at the first not-yet-complete one (spec §4.3).
    /// A pending segment older than `finals_timeout_s` is treated as timed
    /// out and dropped with an error frame rather than blocking the queue
    /// forever.
    fn drain_pending_segments(&mut self) -> Vec<ServerFrame> {
        let deadline = Duration::from_secs_f64(self.config.finals_timeout_s);
        let mut frames = Vec::new();

        while let Some(pending) = self.pending_segments.front_mut() {
            match pending.receiver.try_recv() {
                Ok(Ok(result)) => {
                    frames.push(ServerFrame::Final { text: result.text });
                    self.pending_segments.pop_front();
                }
                Ok(Err(err)) => {
                    warn!(error = %err, idx = pending.idx, "segment inference failed");
                    frames.push(ServerFrame::Error { error: err.to_string() });
                    self.pending_segments.pop_front();
                }
                Err(oneshot::error::TryRecvError::Empty) => {
                    if pending.submitted_at.elapsed() >= deadline {
                        warn!(idx = pending.idx, "segment finalization timed out");
                        frames.push(ServerFrame::Error {
                            error: GatewayError::Timeout.to_string(),
                        });
                        self.pending_segments.pop_front();
                    } else {
                        break;
                    }
                }
                Err(oneshot::error::TryRecvError::Closed) => {
                    warn!(idx = pending.idx, "segment result sender dropped");
                    self.pending_segments.pop_front();
                }
            }
        }

        frames
    }

    /// Terminal flush: client EOS, transport close with residual audio, or
    /// `max_audio_seconds` exceeded. Submits any residual `full_buf`
    /// contents at `Final` priority, awaits up to `finals_timeout_s`, then
    /// awaits every still-pending segment in order.
    pub async fn flush_and_close(&mut self) -> Vec<ServerFrame> {
        self.state = SessionState::Flushing;
        let mut frames = Vec::new();

        if !self.full_buf.is_empty() {
            let residual = self.full_buf.take_all();
            let waveform = pcm16_to_f32(&residual);
            match self.scheduler.submit(waveform, self.sample_rate, Priority::Final) {
                Ok(rx) => {
                    let deadline = Duration::from_secs_f64(self.config.finals_timeout_s);
                    match tokio::time::timeout(deadline, rx).await {
                        Ok(Ok(Ok(result))) => frames.push(ServerFrame::Final { text: result.text }),
                        Ok(Ok(Err(err))) => frames.push(ServerFrame::Error { error: err.to_string() }),
                        Ok(Err(_)) | Err(_) => frames.push(ServerFrame::Error {
                            error: GatewayError::Timeout.to_string(),
                        }),
                    }
                }
                Err(err) => frames.push(ServerFrame::Error { error: err.to_string() }),
            }
        }

        let deadline = Duration::from_secs_f64(self.config.finals_timeout_s);
        while let Some(mut pending) = self.pending_segments.pop_front() {
            match tokio::time::timeout(deadline, &mut pending.receiver).await {
                Ok(Ok(Ok(result))) => frames.push(ServerFrame::Final { text: result.text }),
                Ok(Ok(Err(err))) => frames.push(ServerFrame::Error { error: err.to_string() }),
                Ok(Err(_)) | Err(_) => frames.push(ServerFrame::Error {
                    error: GatewayError::Timeout.to_string(),
                }),
            }
        }

        self.state = SessionState::Closed;
        info!(total_bytes = self.total_bytes, "session closed");
        frames
    }
}

fn ms_to_bytes(ms: u64, sample_rate: u32) -> usize {
    #[allow(clippy::cast_possible_truncation)]
    let samples = (u128::from(ms) * u128::from(sample_rate) / 1000) as usize;
    samples * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use asrg_scheduler::InferenceWorker;

    struct EchoWorker;
    impl InferenceWorker for EchoWorker {
        fn run_batch(&self, waveforms: &[Vec<f32>], _sample_rates: &[u32]) -> Result<Vec<String>, String> {
            Ok(waveforms.iter().map(|w| format!("n={}", w.len())).collect())
        }
    }

    fn test_config() -> GatewayConfig {
        GatewayConfig {
            step_ms: 20,
            tick_timeout_s: 1.0,
            finals_timeout_s: 1.0,
            segment_len_ms: 1_000_000,
            segment_min_ms: 1_000_000,
            max_audio_seconds: 600.0,
            ..GatewayConfig::default()
        }
    }

    fn silence_chunk(ms: u64, sample_rate: u32) -> Vec<u8> {
        vec![0u8; ms_to_bytes(ms, sample_rate)]
    }

    #[tokio::test]
    async fn partial_tick_emits_after_step_bytes() {
        let config = Arc::new(test_config());
        let scheduler = Arc::new(MicroBatchScheduler::new(32, 5, 8));
        scheduler.start(Arc::new(EchoWorker));
        let mut session = Session::new(config, scheduler, 16_000);

        let frames = session.on_audio(&silence_chunk(20, 16_000)).await;
        assert!(matches!(frames.first(), Some(ServerFrame::Partial { .. })));
    }

    #[tokio::test]
    async fn sub_step_chunk_emits_nothing() {
        let config = Arc::new(test_config());
        let scheduler = Arc::new(MicroBatchScheduler::new(32, 5, 8));
        scheduler.start(Arc::new(EchoWorker));
        let mut session = Session::new(config, scheduler, 16_000);

        let frames = session.on_audio(&silence_chunk(1, 16_000)).await;
        assert!(frames.is_empty());
    }

    #[tokio::test]
    async fn flush_and_close_drains_residual_audio() {
        let config = Arc::new(test_config());
        let scheduler = Arc::new(MicroBatchScheduler::new(32, 5, 8));
        scheduler.start(Arc::new(EchoWorker));
        let mut session = Session::new(config, scheduler, 16_000);

        session.on_audio(&silence_chunk(5, 16_000)).await;
        let frames = session.flush_and_close().await;
        assert!(frames.iter().any(|f| matches!(f, ServerFrame::Final { .. })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn hard_segment_cut_after_segment_len() {
        let config = Arc::new(GatewayConfig {
            step_ms: 1_000_000,
            segment_len_ms: 40,
            segment_min_ms: 40,
            finals_timeout_s: 1.0,
            ..test_config()
        });
        let scheduler = Arc::new(MicroBatchScheduler::new(32, 5, 8));
        scheduler.start(Arc::new(EchoWorker));
        let mut session = Session::new(config, scheduler, 16_000);

        session.on_audio(&silence_chunk(50, 16_000)).await;
        // give the scheduler a tick to resolve the segment submission
        tokio::time::sleep(Duration::from_millis(50)).await;
        let frames = session.on_audio(&silence_chunk(1, 16_000)).await;
        assert!(frames.iter().any(|f| matches!(f, ServerFrame::Final { .. })));
    }

    #[tokio::test]
    async fn settle_gate_cut_waits_for_accumulated_quiet_ms() {
        // segment_min reachable well before segment_len, and quiet_ms large
        // enough that a single silent chunk is not enough to flush the gate.
        let config = Arc::new(GatewayConfig {
            step_ms: 1_000_000,
            segment_len_ms: 10_000,
            segment_min_ms: 20,
            quiet_ms: 30,
            finals_timeout_s: 1.0,
            ..test_config()
        });
        let scheduler = Arc::new(MicroBatchScheduler::new(32, 5, 8));
        scheduler.start(Arc::new(EchoWorker));
        let mut session = Session::new(config, scheduler, 16_000);

        // crosses segment_min_bytes but the settle gate has only just
        // observed silence, well under quiet_ms.
        let frames = session.on_audio(&silence_chunk(25, 16_000)).await;
        assert!(!frames.iter().any(|f| matches!(f, ServerFrame::Final { .. })));

        // real time elapses past quiet_ms before the next silent chunk, so
        // the accumulated observed silence now clears the threshold.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let frames = session.on_audio(&silence_chunk(25, 16_000)).await;
        assert!(frames.iter().any(|f| matches!(f, ServerFrame::Final { .. })));
    }

    #[tokio::test]
    async fn with_interim_disabled_suppresses_partial_frames() {
        let config = Arc::new(test_config());
        let scheduler = Arc::new(MicroBatchScheduler::new(32, 5, 8));
        scheduler.start(Arc::new(EchoWorker));
        let mut session = Session::with_interim(config, scheduler, 16_000, false);

        let frames = session.on_audio(&silence_chunk(20, 16_000)).await;
        assert!(!frames.iter().any(|f| matches!(f, ServerFrame::Partial { .. })));
    }
}
