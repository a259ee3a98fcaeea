//! Per-connection session state machine: segmentation, decimation, and the
//! dynamic end-of-utterance ("settle gate") that decide when and what to
//! submit to the scheduler, and when to finalize an utterance.
//!
//! Wire adapters (`asrg-wire`) own frame parsing and protocol mapping; a
//! `Session` only ever sees PCM16 bytes in and [`asrg_core::ServerFrame`]s
//! out.

pub mod buffers;
pub mod session;
pub mod settle_gate;
pub mod vad;

pub use session::{Session, SessionState};
pub use settle_gate::{SettleGate, SettleGateConfig};
