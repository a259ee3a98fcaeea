//! Process lifecycle orchestration: binds the WebSocket and gRPC listeners
//! over a shared [`asrg_wire::GatewayState`] and drives startup/shutdown.

pub mod lifecycle;

pub use lifecycle::run;
