//! Wire-level mappings of [`GatewayError`] (spec §7): WS close codes and
//! gRPC status codes. Each adapter owns its own mapping function because
//! the wire signals differ, but both start from the same taxonomy.

use asrg_core::GatewayError;
use tonic::Status;

/// WebSocket close code 1013 — "Try Again Later" (RFC 6455 §7.4.1), used for
/// both connection-admission rejection and queue-full rejection (spec §4.5).
pub const WS_CLOSE_SERVER_BUSY: u16 = 1013;
/// WebSocket close code 1002 — protocol error, used for malformed frames.
pub const WS_CLOSE_PROTOCOL_ERROR: u16 = 1002;

/// Map a [`GatewayError`] to a gRPC status, per spec §4.5's enumerated
/// codes (`INVALID_ARGUMENT`, `INTERNAL`, `RESOURCE_EXHAUSTED`).
#[must_use]
pub fn to_grpc_status(err: &GatewayError) -> Status {
    match err {
        GatewayError::Schema(msg) => Status::invalid_argument(msg.clone()),
        GatewayError::QueueFull { maxsize } => {
            Status::resource_exhausted(format!("scheduler queue full (maxsize={maxsize})"))
        }
        GatewayError::Timeout => Status::deadline_exceeded(err.to_string()),
        GatewayError::Inference(_) => Status::internal(err.to_string()),
        GatewayError::SessionCapExceeded => Status::resource_exhausted(err.to_string()),
        GatewayError::Transport(_) => Status::unavailable(err.to_string()),
        GatewayError::Config(_) => Status::internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_error_is_invalid_argument() {
        let status = to_grpc_status(&GatewayError::Schema("bad frame".to_string()));
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn queue_full_is_resource_exhausted() {
        let status = to_grpc_status(&GatewayError::QueueFull { maxsize: 10 });
        assert_eq!(status.code(), tonic::Code::ResourceExhausted);
    }
}
