//! Command-line surface: flags mirror every knob named in `GatewayConfig`,
//! each overridable by a `GATEWAY_`-prefixed environment variable.

use std::path::PathBuf;

use asrg_core::GatewayConfig;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "asrg", about = "Streaming speech-recognition gateway", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start the gateway: bind the WebSocket and gRPC listeners and serve
    /// until a shutdown signal arrives.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Parser)]
pub struct ServeArgs {
    /// Model path or identifier passed to the Inference Worker.
    #[arg(long, env = "GATEWAY_MODEL_ID", default_value = "nvidia/parakeet-tdt_ctc-1.1b")]
    pub model_id: String,

    /// Bind host for both listeners.
    #[arg(long, env = "GATEWAY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// WebSocket listener port.
    #[arg(long, env = "GATEWAY_WS_PORT", default_value_t = 8000)]
    pub ws_port: u16,

    /// gRPC listener port.
    #[arg(long, env = "GATEWAY_GRPC_PORT", default_value_t = 8001)]
    pub grpc_port: u16,

    /// TLS certificate path (PEM). Requires `--tls-key-path`.
    #[arg(long, env = "GATEWAY_TLS_CERT_PATH")]
    pub tls_cert_path: Option<PathBuf>,

    /// TLS key path (PEM). Requires `--tls-cert-path`.
    #[arg(long, env = "GATEWAY_TLS_KEY_PATH")]
    pub tls_key_path: Option<PathBuf>,

    /// Maximum items per inference batch.
    #[arg(long, env = "GATEWAY_MAX_BATCH", default_value_t = 32)]
    pub max_batch: usize,

    /// Micro-batch aggregation window, milliseconds.
    #[arg(long, env = "GATEWAY_WINDOW_MS", default_value_t = 10)]
    pub window_ms: u64,

    /// Queue bound as a multiple of `max_batch`.
    #[arg(long, env = "GATEWAY_QUEUE_MAX_FACTOR", default_value_t = 32)]
    pub queue_max_factor: usize,

    /// Minimum new audio (ms) before a partial tick is considered.
    #[arg(long, env = "GATEWAY_STEP_MS", default_value_t = 320)]
    pub step_ms: u64,

    /// Rolling context cap fed to partial ticks, in seconds.
    #[arg(long, env = "GATEWAY_MAX_CTX_SECONDS", default_value_t = 10.0)]
    pub max_ctx_seconds: f64,

    /// Absolute session duration cap, in seconds.
    #[arg(long, env = "GATEWAY_MAX_AUDIO_SECONDS", default_value_t = 600.0)]
    pub max_audio_seconds: f64,

    /// Maximum concurrently active sessions.
    #[arg(long, env = "GATEWAY_MAX_ACTIVE", default_value_t = 400)]
    pub max_active: usize,

    /// Per-partial-tick deadline, in seconds.
    #[arg(long, env = "GATEWAY_TICK_TIMEOUT_S", default_value_t = 2.0)]
    pub tick_timeout_s: f64,

    /// Deadline for the terminal/segment flush, in seconds.
    #[arg(long, env = "GATEWAY_FINALS_TIMEOUT_S", default_value_t = 30.0)]
    pub finals_timeout_s: f64,

    /// Hard segment cut length, milliseconds.
    #[arg(long, env = "GATEWAY_SEGMENT_LEN_MS", default_value_t = 10_000)]
    pub segment_len_ms: u64,

    /// Minimum duration before a silence-triggered cut is allowed, ms.
    #[arg(long, env = "GATEWAY_SEGMENT_MIN_MS", default_value_t = 2_000)]
    pub segment_min_ms: u64,

    /// Overlap audio re-prepended to the next segment after a cut, ms.
    #[arg(long, env = "GATEWAY_SEGMENT_OVERLAP_MS", default_value_t = 240)]
    pub segment_overlap_ms: u64,

    /// Silence-detection tail window, milliseconds.
    #[arg(long, env = "GATEWAY_VAD_TAIL_MS", default_value_t = 300)]
    pub vad_tail_ms: u64,

    /// RMS^2 energy threshold below which the tail window is silence.
    #[arg(long, env = "GATEWAY_VAD_ENERGY_THRESHOLD", default_value_t = 0.01)]
    pub vad_energy_threshold: f32,

    /// Target time-to-end-of-utterance, milliseconds.
    #[arg(long, env = "GATEWAY_TARGET_EOS_MS", default_value_t = 220)]
    pub target_eos_ms: u64,

    /// Observed-silence threshold that triggers a flush, milliseconds.
    #[arg(long, env = "GATEWAY_QUIET_MS", default_value_t = 140)]
    pub quiet_ms: u64,

    /// VAD hangover, milliseconds.
    #[arg(long, env = "GATEWAY_VAD_HANGOVER_MS", default_value_t = 160)]
    pub vad_hangover_ms: u64,

    /// Disables load-aware tick decimation.
    #[arg(long, env = "GATEWAY_DISABLE_DECIMATION")]
    pub disable_decimation: bool,

    /// Minimum wall-clock gap between partial emits when hot, ms.
    #[arg(long, env = "GATEWAY_DECIMATION_MIN_INTERVAL_MS", default_value_t = 500)]
    pub decimation_min_interval_ms: u64,

    /// Scheduler qsize/maxsize threshold defining "hot", in [0, 1].
    #[arg(long, env = "GATEWAY_HOT_QUEUE_FRACTION", default_value_t = 0.75)]
    pub hot_queue_fraction: f64,

    /// Close a session when its Worker batch call errors, instead of just
    /// failing the affected tick/segment.
    #[arg(long, env = "GATEWAY_CLOSE_SESSION_ON_INFERENCE_ERROR")]
    pub close_session_on_inference_error: bool,

    /// Seconds to wait for in-flight sessions to flush during shutdown.
    #[arg(long, env = "GATEWAY_SHUTDOWN_DEADLINE_S", default_value_t = 30.0)]
    pub shutdown_deadline_s: f64,

    /// Log verbosity override (takes precedence over `RUST_LOG`). Repeat
    /// for more detail: `-v` = info, `-vv` = debug, `-vvv` = trace.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ServeArgs {
    #[must_use]
    pub fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            model_id: self.model_id,
            host: self.host,
            ws_port: self.ws_port,
            grpc_port: self.grpc_port,
            tls_cert_path: self.tls_cert_path,
            tls_key_path: self.tls_key_path,

            max_batch: self.max_batch,
            window_ms: self.window_ms,
            queue_max_factor: self.queue_max_factor,

            step_ms: self.step_ms,
            max_ctx_seconds: self.max_ctx_seconds,
            max_audio_seconds: self.max_audio_seconds,
            tick_timeout_s: self.tick_timeout_s,
            finals_timeout_s: self.finals_timeout_s,

            decimation_when_hot: !self.disable_decimation,
            decimation_min_interval_ms: self.decimation_min_interval_ms,
            hot_queue_fraction: self.hot_queue_fraction,

            segment_len_ms: self.segment_len_ms,
            segment_min_ms: self.segment_min_ms,
            segment_overlap_ms: self.segment_overlap_ms,
            vad_tail_ms: self.vad_tail_ms,
            vad_energy_threshold: self.vad_energy_threshold,

            target_eos_ms: self.target_eos_ms,
            quiet_ms: self.quiet_ms,
            vad_hangover_ms: self.vad_hangover_ms,

            max_active: self.max_active,
            close_session_on_inference_error: self.close_session_on_inference_error,

            shutdown_deadline_s: self.shutdown_deadline_s,
        }
    }

    /// `RUST_LOG`-style filter directive implied by repeated `-v`, or `None`
    /// to defer entirely to `RUST_LOG`/the tracing default.
    #[must_use]
    pub const fn verbosity_filter(&self) -> Option<&'static str> {
        match self.verbose {
            0 => None,
            1 => Some("info"),
            2 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serve_args_parse_with_defaults() {
        let cli = Cli::parse_from(["asrg", "serve"]);
        let Commands::Serve(args) = cli.command;
        assert_eq!(args.ws_port, 8000);
        assert_eq!(args.grpc_port, 8001);
        let config = args.into_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn serve_args_override_ports() {
        let cli = Cli::parse_from(["asrg", "serve", "--ws-port", "9100", "--grpc-port", "9101"]);
        let Commands::Serve(args) = cli.command;
        assert_eq!(args.ws_port, 9100);
        assert_eq!(args.grpc_port, 9101);
    }

    #[test]
    fn disable_decimation_flag_flips_default() {
        let cli = Cli::parse_from(["asrg", "serve", "--disable-decimation"]);
        let Commands::Serve(args) = cli.command;
        let config = args.into_config();
        assert!(!config.decimation_when_hot);
    }
}
