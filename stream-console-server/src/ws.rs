//! Websocket halves as console connection endpoints

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use stream_console_hub::{ConsoleSink, ConsoleSource, HandleError};

/// Split an upgraded socket into the halves the hub works with
pub fn split(socket: WebSocket) -> (WsSink, WsSource) {
    let (sink, stream) = socket.split();
    (WsSink { inner: sink }, WsSource { inner: stream })
}

pub struct WsSink {
    inner: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ConsoleSink for WsSink {
    async fn send_text(&mut self, text: &str) -> Result<(), HandleError> {
        self.inner
            .send(Message::Text(text.to_string()))
            .await
            .map_err(|e| HandleError::Write(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), HandleError> {
        self.inner
            .close()
            .await
            .map_err(|e| HandleError::Write(e.to_string()))
    }
}

pub struct WsSource {
    inner: SplitStream<WebSocket>,
}

#[async_trait]
impl ConsoleSource for WsSource {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, HandleError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.into_bytes())),
                Ok(Message::Binary(data)) => return Some(Ok(data)),
                // axum answers pings itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(HandleError::Read(e.to_string()))),
            }
        }
    }
}
