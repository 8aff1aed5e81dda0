//! A single live console connection

use crate::connection::{ConsoleSink, ConsoleSource, HandleError};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Opaque identity of a console connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct HandleId(Uuid);

impl HandleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Which consoles a broadcast is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Every active console
    All,
}

/// Receiving side of a connection's inbound buffer, tagged with its handle
#[derive(Debug)]
pub struct InboundBuffer {
    pub(crate) handle: HandleId,
    pub(crate) rx: mpsc::Receiver<Vec<u8>>,
}

impl InboundBuffer {
    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Vec<u8>>> {
        self.rx.poll_recv(cx)
    }
}

/// One live console connection plus its buffering state
///
/// `active` is owned by the hub: only registration and hub-side
/// deactivation flip it, so the hub's active count can never drift. The
/// handle itself only tracks whether its connection has been released.
pub struct ConnectionHandle {
    id: HandleId,
    audience: Audience,
    active: AtomicBool,
    closed: AtomicBool,
    write_timeout: Duration,
    sink: Mutex<Option<Box<dyn ConsoleSink>>>,
    inbound_tx: parking_lot::Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    inbound_rx: parking_lot::Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Wrap an established connection; the handle starts inactive
    pub fn new(
        sink: Box<dyn ConsoleSink>,
        audience: Audience,
        inbound_capacity: usize,
        write_timeout: Duration,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(inbound_capacity.max(1));
        Arc::new(Self {
            id: HandleId::new(),
            audience,
            active: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            write_timeout,
            sink: Mutex::new(Some(sink)),
            inbound_tx: parking_lot::Mutex::new(Some(tx)),
            inbound_rx: parking_lot::Mutex::new(Some(rx)),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn audience(&self) -> Audience {
        self.audience
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns false if the handle was already active
    pub(crate) fn activate(&self) -> bool {
        !self.active.swap(true, Ordering::SeqCst)
    }

    /// Returns true only for the call that actually flipped the flag
    pub(crate) fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    /// Take the receiving side of the inbound buffer (can only be called once)
    pub fn take_inbound(&self) -> Option<InboundBuffer> {
        self.inbound_rx.lock().take().map(|rx| InboundBuffer {
            handle: self.id,
            rx,
        })
    }

    /// Write one text frame to the client
    ///
    /// Any failure, including a write that outlives the handle's write
    /// timeout, closes the handle before the error is returned.
    pub async fn send(&self, text: &str) -> Result<(), HandleError> {
        let result = {
            let mut sink = self.sink.lock().await;
            match sink.as_mut() {
                None => Err(HandleError::Closed),
                Some(sink) => {
                    match tokio::time::timeout(self.write_timeout, sink.send_text(text)).await {
                        Ok(result) => result,
                        Err(_) => Err(HandleError::Timeout(self.write_timeout)),
                    }
                }
            }
        };

        if let Err(e) = &result {
            warn!(handle = %self.id, error = %e, "Error sending message to console");
            self.close().await;
        }
        result
    }

    /// Move frames from the client into the inbound buffer until the
    /// connection fails or the handle is closed
    ///
    /// This is the only path by which a client-side disconnect is noticed.
    pub async fn read_loop(self: Arc<Self>, mut source: Box<dyn ConsoleSource>) {
        let tx = self.inbound_tx.lock().clone();
        let Some(tx) = tx else {
            debug!(handle = %self.id, "Read loop started on a closed handle");
            return;
        };

        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = source.next_frame() => next,
            };

            match next {
                Some(Ok(frame)) => {
                    let sent = tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        sent = tx.send(frame) => sent,
                    };
                    if sent.is_err() {
                        debug!(handle = %self.id, "Inbound buffer dropped, stopping read loop");
                        break;
                    }
                }
                Some(Err(e)) => {
                    warn!(handle = %self.id, error = %e, "Error reading console messages from websocket");
                    break;
                }
                None => {
                    info!(handle = %self.id, "Console connection closed by client");
                    break;
                }
            }
        }

        drop(tx);
        self.close().await;
    }

    /// Release the connection and the inbound buffer
    ///
    /// Safe to call any number of times; only the first call does work.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.cancel.cancel();
        self.inbound_tx.lock().take();

        let sink = self.sink.lock().await.take();
        if let Some(mut sink) = sink {
            match tokio::time::timeout(self.write_timeout, sink.close()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(handle = %self.id, error = %e, "Error closing console connection")
                }
                Err(_) => debug!(handle = %self.id, "Timed out closing console connection"),
            }
        }
        debug!(handle = %self.id, "Console handle closed");
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("audience", &self.audience)
            .field("active", &self.is_active())
            .field("closed", &self.is_closed())
            .finish()
    }
}
