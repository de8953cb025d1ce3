//! The per-connection task: owns both socket halves, drains the outbound
//! queue in order and turns inbound frames into session events.

use crate::connection::{ConnectionEvent, ConnectionReader, ConnectionWriter};
use crate::events::{SessionEvent, SessionFailure};
use crate::session::Shared;
use gemini_live_types::{ClientMessage, Content, ServerContent, ServerMessage, ToolCall, decode, encode};
use std::sync::Arc;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{Instrument, debug, info, info_span, warn};

/// Close code sent and reported for a client-initiated disconnect.
pub(crate) const NORMAL_CLOSURE: u16 = 1000;

pub(crate) enum Outbound {
    /// An encoded client frame.
    Frame(String),
    Close,
}

/// How a connection ended.
pub(crate) enum Ending {
    Closed { code: u16, reason: String },
    Failed(String),
}

pub(crate) async fn run(
    shared: Arc<Shared>,
    generation: u64,
    mut writer: ConnectionWriter,
    mut reader: ConnectionReader,
    mut rx: UnboundedReceiver<Outbound>,
    tx: UnboundedSender<Outbound>,
) {
    shared.events.emit(&SessionEvent::Open);

    let ending = loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Outbound::Frame(payload)) => {
                    if let Err(e) = writer.send(payload).await {
                        break Ending::Failed(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    writer.close().await;
                    break Ending::Closed {
                        code: NORMAL_CLOSURE,
                        reason: "client disconnect".to_string(),
                    };
                }
            },
            event = reader.next_event() => match event {
                ConnectionEvent::Received(payload) => handle_frame(&shared, &tx, &payload),
                ConnectionEvent::Closed { code, reason } => {
                    info!(code, %reason, "Live endpoint closed the connection");
                    break Ending::Closed { code, reason };
                }
                ConnectionEvent::TransportError(message) => {
                    warn!(error = %message, "Live connection dropped");
                    break Ending::Failed(message);
                }
            },
        }
    };

    shared.finish(generation, ending);
}

fn handle_frame(shared: &Arc<Shared>, tx: &UnboundedSender<Outbound>, payload: &[u8]) {
    let message = match decode(payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, bytes = payload.len(), "Dropping malformed frame");
            shared
                .events
                .emit(&SessionEvent::Error(SessionFailure::malformed_frame(e.to_string())));
            return;
        }
    };

    match message {
        ServerMessage::SetupComplete => {
            debug!("Setup acknowledged");
            shared.events.emit(&SessionEvent::SetupComplete);
        }
        ServerMessage::ServerContent(content) => emit_server_content(shared, content),
        ServerMessage::ToolCall(tool_call) => {
            shared.events.emit(&SessionEvent::ToolCall(tool_call.clone()));
            spawn_dispatch(shared.clone(), tx.clone(), tool_call);
        }
        ServerMessage::ToolCallCancellation(cancellation) => {
            debug!(ids = ?cancellation.ids, "Tool calls cancelled");
            shared
                .events
                .emit(&SessionEvent::ToolCallCancellation(cancellation.ids));
        }
    }
}

/// An interruption suppresses the rest of the frame. Audio parts are reported
/// one event each, then the remaining parts as a single content event, then
/// the end of the turn.
fn emit_server_content(shared: &Shared, content: ServerContent) {
    if content.interrupted {
        shared.events.emit(&SessionEvent::Interrupted);
        return;
    }

    if let Some(turn) = content.model_turn {
        let (audio, other): (Vec<_>, Vec<_>) =
            turn.parts.into_iter().partition(|part| part.is_pcm_audio());
        for blob in audio.into_iter().filter_map(|part| part.inline_data) {
            shared.events.emit(&SessionEvent::Audio(blob.data));
        }
        if !other.is_empty() {
            shared.events.emit(&SessionEvent::Content(Content {
                role: turn.role,
                parts: other,
            }));
        }
    }

    if content.turn_complete {
        shared.events.emit(&SessionEvent::TurnComplete);
    }
}

/// Answers a tool call off the driver task so inbound frames keep flowing
/// while handlers run. The response goes out on the connection that asked.
fn spawn_dispatch(shared: Arc<Shared>, tx: UnboundedSender<Outbound>, tool_call: ToolCall) {
    let span = info_span!("tool_batch", calls = tool_call.function_calls.len());
    tokio::spawn(
        async move {
            let config = shared.active_config();
            let response = shared.registry.dispatch(tool_call, config.as_deref()).await;
            let failed = response
                .function_responses
                .iter()
                .filter(|r| r.error_message().is_some())
                .count();

            match encode(&ClientMessage::ToolResponse(response)) {
                Ok(payload) => {
                    if tx.send(Outbound::Frame(payload)).is_err() {
                        debug!("Connection ended before the tool response could be sent");
                    } else {
                        info!(failed, "Tool response queued");
                    }
                }
                Err(e) => warn!(error = %e, "Failed to encode tool response"),
            }
        }
        .instrument(span),
    );
}
