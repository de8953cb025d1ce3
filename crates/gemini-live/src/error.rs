use gemini_live_types::CodecError;
use std::time::Duration;
use tokio_tungstenite::tungstenite;

/// Failures of the websocket transport.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] tungstenite::Error),
    #[error("websocket handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("websocket transport error: {0}")]
    Transport(#[source] tungstenite::Error),
}

/// Errors returned synchronously by the session handle.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no session config has been set")]
    NoConfig,
    #[error("session is not connected")]
    NotConnected,
    #[error("connection attempt was abandoned by disconnect")]
    Superseded,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors a tool handler can report for one function call.
///
/// Either kind is turned into an `{"error": ..}` entry for that call id only.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl From<gemini_live_types::SchemaError> for ToolError {
    fn from(err: gemini_live_types::SchemaError) -> Self {
        ToolError::InvalidArguments(err.to_string())
    }
}
