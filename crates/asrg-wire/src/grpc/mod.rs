//! Riva-compatible streaming gRPC adapter (spec §4.5 "gRPC adapter").
//!
//! The generated `tonic` service code lives in `riva` (built from
//! `proto/riva.proto` by `build.rs`); this module implements the service
//! trait by driving an [`asrg_session::Session`] exactly like the WS
//! adapter does.

pub mod riva {
    tonic::include_proto!("asrg.v1");
}

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use asrg_core::{ClientFrame, GatewayError, ServerFrame};
use asrg_session::Session;
use async_stream::try_stream;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::info;
use uuid::Uuid;

use crate::error::to_grpc_status;
use crate::state::{AdmissionGuard, AppState};
use riva::riva_speech_recognition_server::{RivaSpeechRecognition, RivaSpeechRecognitionServer};
use riva::streaming_recognize_request::StreamingRequest;
use riva::{
    AudioEncoding, SpeechRecognitionAlternative, StreamingRecognitionResult, StreamingRecognizeRequest,
    StreamingRecognizeResponse,
};

/// Construct the tonic server for this service, ready to be added to a
/// `tonic::transport::Server` router.
#[must_use]
pub fn service(state: AppState) -> RivaSpeechRecognitionServer<GatewayGrpcService> {
    RivaSpeechRecognitionServer::new(GatewayGrpcService { state })
}

pub struct GatewayGrpcService {
    state: AppState,
}

type ResponseStream = Pin<Box<dyn Stream<Item = Result<StreamingRecognizeResponse, Status>> + Send>>;

#[tonic::async_trait]
impl RivaSpeechRecognition for GatewayGrpcService {
    type StreamingRecognizeStream = ResponseStream;

    async fn streaming_recognize(
        &self,
        request: Request<Streaming<StreamingRecognizeRequest>>,
    ) -> Result<Response<Self::StreamingRecognizeStream>, Status> {
        if !self.state.try_admit() {
            return Err(Status::resource_exhausted("server busy"));
        }
        let guard = AdmissionGuard::new(Arc::clone(&self.state));
        let state = Arc::clone(&self.state);
        let mut inbound = request.into_inner();

        let output = try_stream! {
            let _guard = guard;
            let sid = Uuid::new_v4();
            let started = Instant::now();

            let Some(first) = inbound.next().await else {
                return;
            };
            let (sample_rate, interim_results) = match parse_streaming_config(first?)? {
                Some(parsed) => parsed,
                None => Err(Status::invalid_argument(
                    "first message must carry streaming_config",
                ))?,
            };

            let mut session = Session::with_interim(
                Arc::clone(&state.config),
                Arc::clone(&state.scheduler),
                sample_rate,
                interim_results,
            );
            info!(%sid, sample_rate, "grpc session accepted");

            while let Some(msg) = inbound.next().await {
                let audio = match extract_client_frame(msg?)? {
                    ClientFrame::Audio(bytes) => bytes,
                    ClientFrame::Control(_) => Err(Status::invalid_argument(
                        "no control frames after streaming_config on the grpc transport",
                    ))?,
                };
                let frames = session.on_audio(&audio).await;
                for frame in frames {
                    if let Some(response) = to_response(frame)? {
                        yield response;
                    }
                }
            }

            for frame in session.flush_and_close().await {
                if let Some(response) = to_response(frame)? {
                    yield response;
                }
            }

            info!(%sid, duration_ms = started.elapsed().as_millis(), "grpc session closed");
        };

        Ok(Response::new(Box::pin(output)))
    }
}

/// Parses the mandatory first message. Returns `Ok(None)` if the first
/// message was not a `streaming_config` (a protocol violation), or
/// `Ok(Some((sample_rate, interim_results)))` on success.
fn parse_streaming_config(req: StreamingRecognizeRequest) -> Result<Option<(u32, bool)>, Status> {
    match req.streaming_request {
        Some(StreamingRequest::StreamingConfig(cfg)) => {
            let config = cfg
                .config
                .ok_or_else(|| Status::invalid_argument("missing recognition_config"))?;
            if config.encoding() != AudioEncoding::LinearPcm {
                return Err(Status::invalid_argument("only LINEAR_PCM encoding is supported"));
            }
            if config.sample_rate_hertz != 16_000 {
                return Err(Status::invalid_argument("only 16000 Hz sample rate is supported"));
            }
            Ok(Some((config.sample_rate_hertz, cfg.interim_results)))
        }
        _ => Ok(None),
    }
}

/// Translate one inbound gRPC request message into the protocol-agnostic
/// `ClientFrame` (spec §9). This transport has no wire shape for
/// `ControlFrame`; `audio_content` is the only frame clients send after the
/// handshake message.
fn extract_client_frame(req: StreamingRecognizeRequest) -> Result<ClientFrame, Status> {
    match req.streaming_request {
        Some(StreamingRequest::AudioContent(bytes)) => Ok(ClientFrame::Audio(bytes)),
        _ => Err(Status::invalid_argument(
            "expected audio_content after streaming_config",
        )),
    }
}

/// Translate one emitted `ServerFrame` into a response message, or `Err` to
/// terminate the stream with a gRPC status (spec §7: finals surface
/// `INTERNAL` rather than being dropped).
fn to_response(frame: ServerFrame) -> Result<Option<StreamingRecognizeResponse>, Status> {
    let (transcript, is_final) = match frame {
        ServerFrame::Partial { text } => (text, false),
        ServerFrame::Final { text } => (text, true),
        ServerFrame::Error { error } => return Err(to_grpc_status(&GatewayError::Inference(error))),
        ServerFrame::Hello { .. } | ServerFrame::Pong => return Ok(None),
    };
    Ok(Some(StreamingRecognizeResponse {
        results: vec![StreamingRecognitionResult {
            alternatives: vec![SpeechRecognitionAlternative {
                transcript,
                confidence: 0.0,
            }],
            is_final,
            stability: if is_final { 0.0 } else { 0.5 },
        }],
    }))
}
