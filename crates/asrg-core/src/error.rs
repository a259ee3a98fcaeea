//! Gateway error taxonomy (spec §7).
//!
//! Every variant here is something a *caller* (an adapter, a session) needs
//! to branch on, which is why this is a flat enum rather than a tree of
//! per-component error types: the wire adapters map each variant to exactly
//! one wire-level signal (HTTP status, WS close code, gRPC status code).

use thiserror::Error;

/// Errors surfaced across the scheduler/session/adapter boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Malformed wire frame, or an encoding/sample-rate combination the
    /// gateway does not support. Maps to gRPC `INVALID_ARGUMENT` or a WS
    /// protocol error + close.
    #[error("schema error: {0}")]
    Schema(String),

    /// The scheduler's priority queue was at capacity when `submit` was
    /// called. Maps to WS close 1013, HTTP 429, or gRPC `RESOURCE_EXHAUSTED`.
    #[error("queue full (maxsize={maxsize})")]
    QueueFull {
        /// Configured queue bound at the moment of rejection.
        maxsize: usize,
    },

    /// A submitted item's deadline (`tick_timeout_s` or `finals_timeout_s`)
    /// elapsed before the Worker resolved it. Partial ticks drop silently;
    /// finals surface this to the caller.
    #[error("deadline exceeded waiting for inference result")]
    Timeout,

    /// The Worker's batch call failed; every item in that batch observes
    /// this same error. Maps to gRPC `INTERNAL`.
    #[error("inference failed: {0}")]
    Inference(String),

    /// `max_audio_seconds` was exceeded; the session is flushed and closed.
    #[error("session exceeded max_audio_seconds cap")]
    SessionCapExceeded,

    /// Client disconnected or the transport failed. Never surfaced to the
    /// client (there is nobody left to surface it to); logged and the
    /// session is abandoned.
    #[error("transport error: {0}")]
    Transport(String),

    /// Configuration failed validation at startup.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl GatewayError {
    /// Whether this error should be logged at `warn` (client-caused) rather
    /// than `error` (server-caused) level — see spec §4.8.
    #[must_use]
    pub const fn is_client_caused(&self) -> bool {
        matches!(
            self,
            Self::Schema(_) | Self::QueueFull { .. } | Self::Timeout | Self::Transport(_)
        )
    }
}
