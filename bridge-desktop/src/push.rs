//! Push Channel Implementation using WebSockets

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    push::{PushChannel, PushConnection},
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

/// WebSocket-backed push channel
///
/// Each [`connect`](PushChannel::connect) performs a fresh handshake. Ping
/// frames are answered by tungstenite while reading.
#[derive(Debug, Default, Clone)]
pub struct WebSocketChannel;

impl WebSocketChannel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PushChannel for WebSocketChannel {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| BridgeError::ConnectionClosed(format!("{}: {}", url, e)))?;

        info!(url = url, status = response.status().as_u16(), "Push channel opened");
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WebSocketConnection {
    async fn next_message(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Push channel closed by peer");
                    return None;
                }
                // ping, pong, binary and raw frames carry no notification
                Ok(_) => continue,
                Err(e) => return Some(Err(BridgeError::ConnectionClosed(e.to_string()))),
            }
        }
    }

    async fn send(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| BridgeError::ConnectionClosed(e.to_string()))
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "Ignoring error while closing push channel");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_invalid_url_fails() {
        let channel = WebSocketChannel::new();
        let result = channel.connect("not a url").await;
        assert!(matches!(result, Err(BridgeError::ConnectionClosed(_))));
    }
}
