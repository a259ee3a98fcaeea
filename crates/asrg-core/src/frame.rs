//! Protocol-agnostic client/server frame variants (spec §9, "Dynamic typing
//! → explicit variants"). The WebSocket and gRPC adapters each translate
//! their own wire shape into these before handing off to a Session, and
//! translate a Session's emitted [`ServerFrame`] back into their own wire
//! shape on the way out.

use serde::{Deserialize, Serialize};

/// A frame received from a client.
#[derive(Debug, Clone)]
pub enum ClientFrame {
    /// Raw PCM16 LE audio bytes.
    Audio(Vec<u8>),
    /// A parsed control message.
    Control(ControlFrame),
}

/// Client control messages (spec §6: WS text frames `{type, ...}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// Terminal flush: no more audio will follow.
    Eos,
    /// Liveness probe; answered with `ServerFrame::Pong`.
    Ping,
}

/// A frame emitted to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent once, immediately after connection admission.
    Hello {
        /// The session id assigned to this connection.
        sid: String,
    },
    /// An interim, non-authoritative transcript.
    Partial {
        /// The transcribed text so far.
        text: String,
    },
    /// An authoritative transcript for a completed segment or session.
    Final {
        /// The transcribed text for this segment.
        text: String,
    },
    /// Reply to `ControlFrame::Ping`.
    Pong,
    /// A non-fatal error report (the connection may remain open).
    Error {
        /// Human-readable error description.
        error: String,
    },
}
