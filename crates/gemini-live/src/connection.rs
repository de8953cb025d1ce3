//! The single websocket to the live endpoint.

use crate::error::ConnectionError;
use bytes::Bytes;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{HeaderValue, Request, header::AUTHORIZATION},
        protocol::Message as WsMessage,
    },
};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code reported when the peer vanished without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// How long `open` waits for the websocket upgrade to complete.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How the session authenticates against the endpoint. Never logged.
#[derive(Debug)]
pub enum Credentials {
    None,
    /// Appended to the URL as the `key` query parameter.
    ApiKey(SecretString),
    /// Sent as `Authorization: Bearer <token>`.
    BearerToken(SecretString),
}

/// Where and how to connect. Supplied by the caller at connect time.
#[derive(Debug)]
pub struct Endpoint {
    pub url: String,
    pub credentials: Credentials,
    pub handshake_timeout: Duration,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            credentials: Credentials::None,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.credentials = Credentials::ApiKey(SecretString::from(api_key.into()));
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.credentials = Credentials::BearerToken(SecretString::from(token.into()));
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    fn client_request(&self) -> Result<Request<()>, ConnectionError> {
        let url = match &self.credentials {
            Credentials::ApiKey(key) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                format!("{}{}key={}", self.url, separator, key.expose_secret())
            }
            _ => self.url.clone(),
        };
        let mut request = url
            .into_client_request()
            .map_err(|e| ConnectionError::InvalidEndpoint(e.to_string()))?;

        if let Credentials::BearerToken(token) = &self.credentials {
            let value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|_| {
                    ConnectionError::InvalidEndpoint("bearer token is not a valid header".into())
                })?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

/// Lifecycle notifications produced by the read half.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// One text or binary frame.
    Received(Bytes),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
    /// The transport failed or dropped without a close handshake.
    TransportError(String),
}

/// Opens the websocket and splits it into its write and read halves.
pub async fn open(endpoint: &Endpoint) -> Result<(ConnectionWriter, ConnectionReader), ConnectionError> {
    let request = endpoint.client_request()?;
    let host = request.uri().host().unwrap_or_default().to_string();

    let handshake = connect_async(request);
    let (ws_stream, response) = tokio::time::timeout(endpoint.handshake_timeout, handshake)
        .await
        .map_err(|_| ConnectionError::HandshakeTimeout(endpoint.handshake_timeout))?
        .map_err(ConnectionError::Handshake)?;
    info!(%host, status = %response.status(), "Connected to live websocket.");

    let (sink, stream) = ws_stream.split();
    Ok((ConnectionWriter { sink }, ConnectionReader { stream }))
}

/// Write half. Frames are written in the order `send` is called.
pub struct ConnectionWriter {
    sink: SplitSink<WsStream, WsMessage>,
}

impl ConnectionWriter {
    /// Sends one text frame and waits for it to be flushed.
    pub async fn send(&mut self, payload: String) -> Result<(), ConnectionError> {
        self.sink
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(ConnectionError::Transport)
    }

    /// Starts the closing handshake. Nothing is sent afterwards.
    pub async fn close(&mut self) {
        match self.sink.close().await {
            Ok(()) => debug!("Live websocket closed."),
            Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {}
            Err(e) => debug!(error = %e, "Error while closing live websocket"),
        }
    }
}

/// Read half.
pub struct ConnectionReader {
    stream: SplitStream<WsStream>,
}

impl ConnectionReader {
    /// Waits for the next frame or lifecycle change. Control frames are skipped.
    ///
    /// Cancel safe: no frame is lost if the future is dropped before completion.
    pub async fn next_event(&mut self) -> ConnectionEvent {
        loop {
            let Some(frame) = self.stream.next().await else {
                return ConnectionEvent::TransportError(
                    "connection dropped without a close frame".to_string(),
                );
            };
            match frame {
                Ok(WsMessage::Text(text)) => {
                    return ConnectionEvent::Received(Bytes::copy_from_slice(text.as_bytes()));
                }
                Ok(WsMessage::Binary(data)) => return ConnectionEvent::Received(Bytes::from(data)),
                Ok(WsMessage::Close(frame)) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    return ConnectionEvent::Closed { code, reason };
                }
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => continue,
                Err(tungstenite::Error::ConnectionClosed) => {
                    return ConnectionEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "connection closed".to_string(),
                    };
                }
                Err(e) => return ConnectionEvent::TransportError(e.to_string()),
            }
        }
    }
}
