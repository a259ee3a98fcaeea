//! Typed gateway configuration (spec §4.7).
//!
//! `GatewayConfig` is the single source of truth for every knob named in
//! §4.3/§4.4/§6. It is read-only after startup (spec §5 "Shared resources").
//! Loading from environment variables and CLI flags happens in
//! `asrg-runtime`/`asrg-cli`; this crate only owns the struct, its defaults,
//! and validation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while validating a [`GatewayConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A field was outside its legal range.
    #[error("{field}: {reason}")]
    OutOfRange {
        /// Name of the offending field.
        field: &'static str,
        /// Human-readable explanation.
        reason: String,
    },
    /// TLS was requested but only one of cert/key was supplied.
    #[error("tls_cert_path and tls_key_path must both be set or both be absent")]
    IncompleteTls,
}

/// Complete gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    // ── Model / bind ────────────────────────────────────────────────
    /// Model path or identifier passed to the Inference Worker.
    pub model_id: String,
    /// Bind host for both the WS and gRPC listeners.
    pub host: String,
    /// WebSocket listener port.
    pub ws_port: u16,
    /// gRPC listener port.
    pub grpc_port: u16,
    /// Optional TLS certificate path (PEM).
    pub tls_cert_path: Option<PathBuf>,
    /// Optional TLS key path (PEM).
    pub tls_key_path: Option<PathBuf>,

    // ── Scheduler (§4.2) ────────────────────────────────────────────
    /// Maximum items per batch.
    pub max_batch: usize,
    /// Aggregation window, milliseconds. `0` is legal (single-item batches).
    pub window_ms: u64,
    /// Queue bound = `queue_max_factor * max_batch`.
    pub queue_max_factor: usize,

    // ── Session cadence (§4.3) ──────────────────────────────────────
    /// Minimum new audio (ms) since last emit before a tick is considered.
    pub step_ms: u64,
    /// Rolling context cap fed to partial ticks.
    pub max_ctx_seconds: f64,
    /// Absolute session duration cap.
    pub max_audio_seconds: f64,
    /// Per-partial-tick deadline.
    pub tick_timeout_s: f64,
    /// Deadline for the terminal/segment flush.
    pub finals_timeout_s: f64,

    // ── Decimation (§4.3 step 5) ─────────────────────────────────────
    /// Enables load-aware tick decimation.
    pub decimation_when_hot: bool,
    /// Minimum wall-clock gap between partial emits when hot.
    pub decimation_min_interval_ms: u64,
    /// Scheduler qsize/maxsize threshold defining "hot", in `[0, 1]`.
    pub hot_queue_fraction: f64,

    // ── Segmentation / VAD (§4.3) ────────────────────────────────────
    /// Hard segment cut length.
    pub segment_len_ms: u64,
    /// Minimum duration before a silence-triggered cut is allowed.
    pub segment_min_ms: u64,
    /// Overlap audio re-prepended to the next segment after a cut.
    pub segment_overlap_ms: u64,
    /// Silence-detection tail window.
    pub vad_tail_ms: u64,
    /// RMS² energy threshold below which the tail window is "silence".
    pub vad_energy_threshold: f32,

    // ── Settle gate (§4.4) ────────────────────────────────────────────
    /// Target time-to-end-of-utterance, milliseconds.
    pub target_eos_ms: u64,
    /// Observed-silence threshold that triggers `should_flush`.
    pub quiet_ms: u64,
    /// VAD hangover, milliseconds.
    pub vad_hangover_ms: u64,

    // ── Admission (§4.5/§4.6) ─────────────────────────────────────────
    /// Maximum concurrently active sessions per adapter.
    pub max_active: usize,

    /// Whether a Worker batch error closes the affected session (§9 open
    /// question — resolved as a configurable policy, default `false`).
    pub close_session_on_inference_error: bool,

    // ── Process lifecycle (§4.9) ─────────────────────────────────────
    /// How long shutdown waits for in-flight sessions to flush before the
    /// process exits anyway.
    pub shutdown_deadline_s: f64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model_id: "nvidia/parakeet-tdt_ctc-1.1b".to_string(),
            host: "0.0.0.0".to_string(),
            ws_port: 8000,
            grpc_port: 8001,
            tls_cert_path: None,
            tls_key_path: None,

            max_batch: 32,
            window_ms: 10,
            queue_max_factor: 32,

            step_ms: 320,
            max_ctx_seconds: 10.0,
            max_audio_seconds: 600.0,
            tick_timeout_s: 2.0,
            finals_timeout_s: 30.0,

            decimation_when_hot: true,
            decimation_min_interval_ms: 500,
            hot_queue_fraction: 0.75,

            segment_len_ms: 10_000,
            segment_min_ms: 2_000,
            segment_overlap_ms: 240,
            vad_tail_ms: 300,
            vad_energy_threshold: 0.01,

            target_eos_ms: 220,
            quiet_ms: 140,
            vad_hangover_ms: 160,

            max_active: 400,
            close_session_on_inference_error: false,

            shutdown_deadline_s: 30.0,
        }
    }
}

impl GatewayConfig {
    /// Validate the configuration, returning the first violation found.
    ///
    /// Called once at startup, before the Inference Worker is constructed
    /// (spec §4.9) — an invalid value is always a startup error, never a
    /// first-use surprise.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_batch",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.queue_max_factor == 0 {
            return Err(ConfigError::OutOfRange {
                field: "queue_max_factor",
                reason: "must be >= 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.hot_queue_fraction) {
            return Err(ConfigError::OutOfRange {
                field: "hot_queue_fraction",
                reason: "must be in [0, 1]".to_string(),
            });
        }
        if self.max_ctx_seconds <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "max_ctx_seconds",
                reason: "must be > 0".to_string(),
            });
        }
        if self.max_audio_seconds <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "max_audio_seconds",
                reason: "must be > 0".to_string(),
            });
        }
        if self.segment_min_ms > self.segment_len_ms {
            return Err(ConfigError::OutOfRange {
                field: "segment_min_ms",
                reason: "must be <= segment_len_ms".to_string(),
            });
        }
        if self.max_active == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_active",
                reason: "must be >= 1".to_string(),
            });
        }
        if self.vad_energy_threshold < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "vad_energy_threshold",
                reason: "must be >= 0".to_string(),
            });
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err(ConfigError::IncompleteTls);
        }
        if self.shutdown_deadline_s <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "shutdown_deadline_s",
                reason: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Queue bound derived from `max_batch` and `queue_max_factor`.
    #[must_use]
    pub const fn queue_maxsize(&self) -> usize {
        self.max_batch * self.queue_max_factor
    }

    /// Minimum new-audio byte count before a partial tick is considered,
    /// at the given sample rate (PCM16 mono).
    #[must_use]
    pub fn step_bytes(&self, sample_rate: u32) -> usize {
        ms_to_bytes(self.step_ms, sample_rate)
    }

    /// Rolling context byte cap at the given sample rate.
    #[must_use]
    pub fn max_ctx_bytes(&self, sample_rate: u32) -> usize {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let samples = (self.max_ctx_seconds * f64::from(sample_rate)) as usize;
        samples * 2
    }
}

fn ms_to_bytes(ms: u64, sample_rate: u32) -> usize {
    #[allow(clippy::cast_possible_truncation)]
    let samples = (ms as u128 * u128::from(sample_rate) / 1000) as usize;
    samples * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(GatewayConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_max_batch_rejected() {
        let cfg = GatewayConfig {
            max_batch: 0,
            ..GatewayConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::OutOfRange { field: "max_batch", .. })
        ));
    }

    #[test]
    fn hot_queue_fraction_out_of_range_rejected() {
        let cfg = GatewayConfig {
            hot_queue_fraction: 1.5,
            ..GatewayConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mismatched_tls_paths_rejected() {
        let cfg = GatewayConfig {
            tls_cert_path: Some(PathBuf::from("cert.pem")),
            tls_key_path: None,
            ..GatewayConfig::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::IncompleteTls));
    }

    #[test]
    fn step_bytes_matches_step_ms_at_16k() {
        let cfg = GatewayConfig {
            step_ms: 320,
            ..GatewayConfig::default()
        };
        // 320ms @ 16kHz mono PCM16 = 0.32 * 16000 * 2 bytes
        assert_eq!(cfg.step_bytes(16_000), 10_240);
    }

    #[test]
    fn max_ctx_bytes_scales_with_sample_rate() {
        let cfg = GatewayConfig {
            max_ctx_seconds: 4.0,
            ..GatewayConfig::default()
        };
        assert_eq!(cfg.max_ctx_bytes(16_000), 4 * 16_000 * 2);
    }
}
