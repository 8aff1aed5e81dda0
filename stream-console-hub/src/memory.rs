//! In-process console connections
//!
//! [`connection`] returns the hub-facing halves together with a
//! [`MemoryClient`] that plays the browser: it reads what the hub sends,
//! types frames back, and can break or stall the connection.

use crate::connection::{ConsoleSink, ConsoleSource, HandleError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Default)]
struct Flags {
    broken: AtomicBool,
    stalled: AtomicBool,
    closed: AtomicBool,
}

pub struct MemorySink {
    tx: mpsc::UnboundedSender<String>,
    flags: Arc<Flags>,
}

pub struct MemorySource {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    flags: Arc<Flags>,
}

/// The client end of an in-process connection
pub struct MemoryClient {
    received: mpsc::UnboundedReceiver<String>,
    frames: Option<mpsc::UnboundedSender<Vec<u8>>>,
    flags: Arc<Flags>,
}

/// Create a connected sink/source pair and its client
pub fn connection() -> (MemorySink, MemorySource, MemoryClient) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let flags = Arc::new(Flags::default());

    (
        MemorySink {
            tx: out_tx,
            flags: flags.clone(),
        },
        MemorySource {
            rx: in_rx,
            flags: flags.clone(),
        },
        MemoryClient {
            received: out_rx,
            frames: Some(in_tx),
            flags,
        },
    )
}

#[async_trait]
impl ConsoleSink for MemorySink {
    async fn send_text(&mut self, text: &str) -> Result<(), HandleError> {
        if self.flags.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.flags.closed.load(Ordering::SeqCst) {
            return Err(HandleError::Closed);
        }
        if self.flags.broken.load(Ordering::SeqCst) {
            return Err(HandleError::Write("connection reset by peer".to_string()));
        }
        self.tx
            .send(text.to_string())
            .map_err(|_| HandleError::Closed)
    }

    async fn close(&mut self) -> Result<(), HandleError> {
        self.flags.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl ConsoleSource for MemorySource {
    async fn next_frame(&mut self) -> Option<Result<Vec<u8>, HandleError>> {
        match self.rx.recv().await {
            Some(frame) => Some(Ok(frame)),
            None if self.flags.broken.load(Ordering::SeqCst) => Some(Err(HandleError::Read(
                "connection reset by peer".to_string(),
            ))),
            None => None,
        }
    }
}

impl MemoryClient {
    /// Type a text frame into the console
    pub fn send(&self, text: &str) -> bool {
        self.send_bytes(text.as_bytes().to_vec())
    }

    /// Send a raw frame
    pub fn send_bytes(&self, frame: Vec<u8>) -> bool {
        self.frames
            .as_ref()
            .is_some_and(|tx| tx.send(frame).is_ok())
    }

    /// Wait for the next text frame written by the hub
    pub async fn recv(&mut self) -> Option<String> {
        self.received.recv().await
    }

    /// Everything written by the hub so far
    pub fn drain(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(text) = self.received.try_recv() {
            out.push(text);
        }
        out
    }

    /// Close from the client side
    pub fn hang_up(&mut self) {
        self.frames = None;
    }

    /// Make reads and writes fail as if the network dropped
    pub fn break_connection(&mut self) {
        self.flags.broken.store(true, Ordering::SeqCst);
        self.frames = None;
    }

    /// Make writes hang forever
    pub fn stall_writes(&self) {
        self.flags.stalled.store(true, Ordering::SeqCst);
    }

    /// True once the hub closed its side
    pub fn is_closed_by_server(&self) -> bool {
        self.flags.closed.load(Ordering::SeqCst)
    }
}
