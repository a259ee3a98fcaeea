//! Wire adapters: WebSocket and Riva-compatible gRPC front ends over the
//! shared session/scheduler core.

pub mod error;
pub mod grpc;
pub mod state;
pub mod ws;

pub use state::{AdmissionGuard, AppState, GatewayState};
