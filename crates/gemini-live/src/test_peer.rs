//! A local websocket server standing in for the live endpoint in tests.

use crate::connection::Endpoint;
use futures_util::{SinkExt, StreamExt};
use gemini_live_types::{ClientMessage, ServerMessage, decode_client, encode_server};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    WebSocketStream, accept_async,
    tungstenite::protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode},
};

pub(crate) struct FakePeer {
    listener: TcpListener,
}

impl FakePeer {
    pub(crate) async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub(crate) fn endpoint(&self) -> Endpoint {
        let addr = self.listener.local_addr().unwrap();
        Endpoint::new(format!("ws://{addr}/live")).with_api_key("test-key")
    }

    pub(crate) async fn accept(&self) -> PeerConnection {
        let (stream, _) = self.listener.accept().await.unwrap();
        let ws = accept_async(stream).await.unwrap();
        PeerConnection { ws }
    }
}

pub(crate) struct PeerConnection {
    ws: WebSocketStream<TcpStream>,
}

impl PeerConnection {
    /// Next client frame, or `None` once the client has closed.
    pub(crate) async fn recv(&mut self) -> Option<ClientMessage> {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.ws.next())
                .await
                .expect("timed out waiting for a client frame")?;
            match frame.ok()? {
                WsMessage::Text(text) => return Some(decode_client(text.as_bytes()).unwrap()),
                WsMessage::Close(_) => return None,
                _ => continue,
            }
        }
    }

    pub(crate) async fn send(&mut self, message: &ServerMessage) {
        let payload = encode_server(message).unwrap();
        self.send_raw(&payload).await;
    }

    pub(crate) async fn send_raw(&mut self, payload: &str) {
        self.ws
            .send(WsMessage::Text(payload.to_string().into()))
            .await
            .unwrap();
    }

    pub(crate) async fn close(&mut self, code: u16, reason: &'static str) {
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.into(),
        };
        self.ws.close(Some(frame)).await.unwrap();
    }
}
