//! Transport-neutral view of an established console connection
//!
//! Once the websocket handshake is done the hub only needs two things: a
//! way to push text frames out and a way to pull raw frames in. The
//! server implements these for its websocket halves, [`crate::memory`]
//! implements them in-process.

use async_trait::async_trait;
use std::time::Duration;

/// Connection-level failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandleError {
    #[error("connection closed")]
    Closed,

    #[error("write failed: {0}")]
    Write(String),

    #[error("read failed: {0}")]
    Read(String),

    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Outgoing half of a console connection
#[async_trait]
pub trait ConsoleSink: Send {
    /// Write one text frame
    async fn send_text(&mut self, text: &str) -> Result<(), HandleError>;

    /// Close the underlying connection
    async fn close(&mut self) -> Result<(), HandleError>;
}

/// Incoming half of a console connection
#[async_trait]
pub trait ConsoleSource: Send {
    /// Next raw frame from the client
    ///
    /// `None` means the client closed the connection cleanly.
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, HandleError>>;
}
