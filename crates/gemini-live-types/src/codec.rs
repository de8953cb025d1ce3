//! Frame codec: envelopes to transport payloads and back.
//!
//! Payloads are JSON text. Inbound frames are decoded leniently (unknown fields
//! are ignored) but a frame must carry one of the fields that identify its kind.

use crate::messages::{ClientMessage, ServerContent, ServerMessage};
use crate::tools::{ToolCall, ToolCallCancellation};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Inbound frame as it appears on the wire. At most one field is expected to be
/// set; if several are, the tool-related ones take precedence.
#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ServerEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    setup_complete: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_content: Option<ServerContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call: Option<ToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_cancellation: Option<ToolCallCancellation>,
}

/// Encodes an outbound message as a text payload.
pub fn encode(message: &ClientMessage) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes an inbound payload (text or binary frame contents).
pub fn decode(payload: &[u8]) -> Result<ServerMessage, CodecError> {
    let envelope: ServerEnvelope = serde_json::from_slice(payload)
        .map_err(|e| CodecError::MalformedFrame(e.to_string()))?;

    if let Some(call) = envelope.tool_call {
        Ok(ServerMessage::ToolCall(call))
    } else if let Some(cancellation) = envelope.tool_call_cancellation {
        Ok(ServerMessage::ToolCallCancellation(cancellation))
    } else if let Some(content) = envelope.server_content {
        Ok(ServerMessage::ServerContent(content))
    } else if envelope.setup_complete.is_some() {
        Ok(ServerMessage::SetupComplete)
    } else {
        Err(CodecError::MalformedFrame(
            "frame carries no recognised message field".to_string(),
        ))
    }
}

/// Encodes a server message. Used by peers that play the endpoint's role.
pub fn encode_server(message: &ServerMessage) -> Result<String, CodecError> {
    let mut envelope = ServerEnvelope::default();
    match message {
        ServerMessage::SetupComplete => {
            envelope.setup_complete = Some(serde_json::Value::Object(Default::default()))
        }
        ServerMessage::ServerContent(content) => envelope.server_content = Some(content.clone()),
        ServerMessage::ToolCall(call) => envelope.tool_call = Some(call.clone()),
        ServerMessage::ToolCallCancellation(c) => envelope.tool_call_cancellation = Some(c.clone()),
    }
    Ok(serde_json::to_string(&envelope)?)
}

/// Decodes a client message. Used by peers that play the endpoint's role.
pub fn decode_client(payload: &[u8]) -> Result<ClientMessage, CodecError> {
    serde_json::from_slice(payload).map_err(|e| CodecError::MalformedFrame(e.to_string()))
}
