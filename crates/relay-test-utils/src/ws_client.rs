//! A minimal WebSocket client speaking the relay wire protocol, for
//! integration tests.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use nostr_proto::{ClientMessage, RelayMessage};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::MaybeTlsStream;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub struct RelayClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl RelayClient {
    pub async fn connect(url: &str) -> Result<Self, BoxError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), BoxError> {
        self.send_raw(&msg.to_json()?).await
    }

    /// Send an arbitrary text frame, valid protocol or not.
    pub async fn send_raw(&mut self, text: &str) -> Result<(), BoxError> {
        self.write.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Receive the next relay message, skipping transport-level frames.
    pub async fn recv(&mut self) -> Result<RelayMessage, BoxError> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(RelayMessage::parse(&text)?),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) => return Err("connection closed by relay".into()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    /// Like [`recv`](Self::recv), but fails fast instead of hanging a test.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<RelayMessage, BoxError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| BoxError::from("timed out waiting for relay message"))?
    }

    pub async fn close(&mut self) -> Result<(), BoxError> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
