//! Domain types shared by the streaming ASR gateway: error taxonomy, PCM
//! conversion, the scheduler's wire-agnostic work item, protocol-agnostic
//! client/server frame variants, and the gateway's typed configuration.
//!
//! Adapters (`asrg-wire`), the scheduler (`asrg-scheduler`), and the session
//! state machine (`asrg-session`) all depend on this crate; it depends on
//! nothing in the workspace.

pub mod audio;
pub mod config;
pub mod error;
pub mod frame;
pub mod work_item;

pub use audio::{pcm16_to_f32, f32_to_pcm16};
pub use config::{GatewayConfig, ConfigError};
pub use error::GatewayError;
pub use frame::{ClientFrame, ControlFrame, ServerFrame};
pub use work_item::{Priority, WorkItem, WorkResult};

/// Opaque per-process session identifier.
pub type SessionId = uuid::Uuid;
