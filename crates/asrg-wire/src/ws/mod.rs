//! WebSocket adapter (spec §4.5 "WebSocket adapter").
//!
//! Accepts binary PCM16 LE frames and JSON control frames, drives a
//! [`Session`] per connection, and serializes its [`ServerFrame`]s back out
//! as JSON text frames.

use std::sync::Arc;
use std::time::Instant;

use asrg_core::{ClientFrame, ControlFrame, GatewayError, ServerFrame};
use asrg_session::{Session, SessionState};
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::WS_CLOSE_SERVER_BUSY;
use crate::state::{AdmissionGuard, AppState};

/// The fixed sample rate this adapter accepts, matching the original
/// NeMo CTC WS server's contract (16 kHz mono PCM16 LE).
const SAMPLE_RATE_HZ: u32 = 16_000;

/// Build the `/ws/audio` route. The caller nests this under its own prefix.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new().route("/ws/audio", get(upgrade)).with_state(state)
}

async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    if state.try_admit() {
        let guard = AdmissionGuard::new(Arc::clone(&state));
        ws.on_upgrade(move |socket| handle_socket(socket, state, guard))
    } else {
        warn!(active = state.active_session_count(), "rejecting connection: server busy");
        ws.on_upgrade(reject_busy)
    }
}

async fn reject_busy(mut socket: WebSocket) {
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: WS_CLOSE_SERVER_BUSY,
            reason: "server busy".into(),
        })))
        .await;
}

async fn handle_socket(socket: WebSocket, state: AppState, _guard: AdmissionGuard) {
    let sid = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let mut session = Session::new(Arc::clone(&state.config), Arc::clone(&state.scheduler), SAMPLE_RATE_HZ);

    let hello = ServerFrame::Hello { sid: sid.to_string() };
    if send_frame(&mut sender, &hello).await.is_err() {
        return;
    }

    info!(%sid, "session accepted");
    let started = Instant::now();

    while let Some(Ok(msg)) = receiver.next().await {
        let frame = match to_client_frame(msg) {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(Stop::Close) => break,
            Err(Stop::Malformed(parse_err)) => {
                let err = GatewayError::Schema(parse_err.to_string());
                warn!(error = %err, "malformed control frame");
                let _ = send_frame(&mut sender, &ServerFrame::Error { error: err.to_string() }).await;
                continue;
            }
        };
        if handle_client_frame(frame, &mut session, &mut sender).await {
            break;
        }
    }

    if session.state() != SessionState::Closed {
        let frames = session.flush_and_close().await;
        let _ = send_frames(&mut sender, frames).await;
    }

    info!(
        %sid,
        duration_ms = started.elapsed().as_millis(),
        final_state = ?session.state(),
        "session closed"
    );
}

/// Why `to_client_frame` didn't hand back a `ClientFrame`.
enum Stop {
    /// The peer sent a WS-level close frame.
    Close,
    /// A text frame didn't parse as a `ControlFrame`.
    Malformed(serde_json::Error),
}

/// Translate one inbound WS message into the protocol-agnostic `ClientFrame`
/// (spec §9). `Ok(None)` means the message was WS transport plumbing (ping/
/// pong) with no `ClientFrame` equivalent and should be silently skipped.
fn to_client_frame(msg: Message) -> Result<Option<ClientFrame>, Stop> {
    match msg {
        Message::Binary(bytes) => Ok(Some(ClientFrame::Audio(bytes))),
        Message::Text(text) => serde_json::from_str::<ControlFrame>(&text)
            .map(|control| Some(ClientFrame::Control(control)))
            .map_err(Stop::Malformed),
        Message::Close(_) => Err(Stop::Close),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
    }
}

/// Drive a `Session` with one `ClientFrame`. Returns `true` if the
/// connection should close after this message.
async fn handle_client_frame(
    frame: ClientFrame,
    session: &mut Session,
    sender: &mut SplitSink<WebSocket, Message>,
) -> bool {
    match frame {
        ClientFrame::Audio(bytes) => {
            let frames = session.on_audio(&bytes).await;
            if send_frames(sender, frames).await.is_err() {
                return true;
            }
            false
        }
        ClientFrame::Control(ControlFrame::Eos) => {
            let frames = session.flush_and_close().await;
            let _ = send_frames(sender, frames).await;
            true
        }
        ClientFrame::Control(ControlFrame::Ping) => {
            let _ = send_frame(sender, &ServerFrame::Pong).await;
            false
        }
    }
}

async fn send_frames(sender: &mut SplitSink<WebSocket, Message>, frames: Vec<ServerFrame>) -> Result<(), axum::Error> {
    for frame in &frames {
        send_frame(sender, frame).await?;
    }
    Ok(())
}

async fn send_frame(sender: &mut SplitSink<WebSocket, Message>, frame: &ServerFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).expect("ServerFrame always serializes");
    sender.send(Message::Text(text)).await
}
