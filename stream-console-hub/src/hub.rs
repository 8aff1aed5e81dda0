//! Console hub: owns every connection handle, the broadcast path and the backlog

use crate::backlog::Backlog;
use crate::connection::ConsoleSink;
use crate::handle::{Audience, ConnectionHandle, HandleId, InboundBuffer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use stream_console_core::config::{ConsoleConfig, ReplayPolicy};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Registration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("console handle {0} is already closed")]
    HandleClosed(HandleId),

    #[error("console handle {0} is already registered")]
    AlreadyRegistered(HandleId),

    #[error("console hub is shut down")]
    ShutDown,
}

/// Outcome of a single broadcast call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastReport {
    /// No console was active; the message went to the backlog
    Backlogged,
    /// Delivered to `delivered` consoles; `failed` were found closed or
    /// failed the write, and were deactivated
    Delivered {
        delivered: usize,
        failed: Vec<HandleId>,
    },
    /// The hub is shut down and no longer accepts messages
    ShutDown,
}

/// Point-in-time view of the hub
#[derive(Debug, Clone, Serialize)]
pub struct HubSnapshot {
    pub active_handles: usize,
    pub handles: Vec<HandleId>,
    pub backlog: Vec<String>,
}

struct HubState {
    handles: Vec<Arc<ConnectionHandle>>,
    active_count: usize,
    backlog: Backlog,
    shut_down: bool,
}

impl HubState {
    fn check_invariant(&self) {
        debug_assert_eq!(
            self.active_count,
            self.handles.iter().filter(|h| h.is_active()).count(),
            "active count out of sync with handle flags"
        );
    }

    /// Flip a handle inactive and keep the count in step with it
    fn deactivate(&mut self, handle: &ConnectionHandle) {
        if handle.deactivate() {
            self.active_count = self.active_count.saturating_sub(1);
        }
    }

    /// Drop handles whose connection was released before the router
    /// reported it; returns their ids
    fn evict_closed(&mut self) -> Vec<HandleId> {
        let closed: Vec<Arc<ConnectionHandle>> = self
            .handles
            .iter()
            .filter(|h| h.is_active() && h.is_closed())
            .cloned()
            .collect();
        if closed.is_empty() {
            return Vec::new();
        }
        for handle in &closed {
            self.deactivate(handle);
            info!(handle = %handle.id(), "Evicting closed console handle");
        }
        self.evict_inactive();
        closed.iter().map(|h| h.id()).collect()
    }

    fn evict_inactive(&mut self) {
        self.handles.retain(|h| h.is_active());
        self.check_invariant();
    }
}

/// Owns every console connection, the broadcast path and the backlog
///
/// All mutable state sits behind one async mutex so registration (from
/// the HTTP accept path), deactivation (from the router) and broadcasts
/// (from anywhere) are serialized. Broadcast writes happen outside it,
/// under a separate lock that keeps concurrent broadcasts in order.
pub struct Hub {
    state: Mutex<HubState>,
    send_lock: Mutex<()>,
    attach_tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<InboundBuffer>>>,
    attach_rx: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<InboundBuffer>>>,
    replay: ReplayPolicy,
    inbound_capacity: usize,
    write_timeout: Duration,
}

impl Hub {
    pub fn new(config: &ConsoleConfig) -> Self {
        let (attach_tx, attach_rx) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(HubState {
                handles: Vec::new(),
                active_count: 0,
                backlog: Backlog::new(config.backlog_capacity, config.backlog_ttl()),
                shut_down: false,
            }),
            send_lock: Mutex::new(()),
            attach_tx: parking_lot::Mutex::new(Some(attach_tx)),
            attach_rx: parking_lot::Mutex::new(Some(attach_rx)),
            replay: config.replay,
            inbound_capacity: config.inbound_capacity,
            write_timeout: config.write_timeout(),
        }
    }

    /// Take the stream of inbound buffers of newly registered handles
    /// (can only be called once; the command router owns it)
    pub fn take_attach_receiver(&self) -> Option<mpsc::UnboundedReceiver<InboundBuffer>> {
        self.attach_rx.lock().take()
    }

    /// Wrap a freshly upgraded connection in a handle using the hub's settings
    pub fn create_handle(&self, sink: Box<dyn ConsoleSink>) -> Arc<ConnectionHandle> {
        ConnectionHandle::new(sink, Audience::All, self.inbound_capacity, self.write_timeout)
    }

    /// Activate a handle and add it to the broadcast set
    ///
    /// The handle's inbound buffer is passed to the router, then the
    /// backlog is replayed to it according to the configured policy.
    /// Returns the number of replayed messages.
    pub async fn register(&self, handle: &Arc<ConnectionHandle>) -> Result<usize, HubError> {
        let mut state = self.state.lock().await;

        if state.shut_down {
            warn!(handle = %handle.id(), "Attempting to register console handle after shutdown, skipping.");
            return Err(HubError::ShutDown);
        }
        if handle.is_closed() {
            warn!(handle = %handle.id(), "Attempting to register closed console handle, skipping.");
            return Err(HubError::HandleClosed(handle.id()));
        }
        if handle.is_active() || state.handles.iter().any(|h| h.id() == handle.id()) {
            warn!(handle = %handle.id(), "Console handle already registered, skipping.");
            return Err(HubError::AlreadyRegistered(handle.id()));
        }

        let replay = state.backlog.take_for_replay(self.replay);
        let mut pending = replay.into_iter();
        let mut replayed = 0;
        while let Some(entry) = pending.next() {
            if handle.send(&entry.message).await.is_err() {
                let mut undelivered = vec![entry];
                undelivered.extend(pending);
                state.backlog.restore_front(undelivered);
                return Err(HubError::HandleClosed(handle.id()));
            }
            replayed += 1;
        }

        if let Some(buffer) = handle.take_inbound() {
            let attached = self
                .attach_tx
                .lock()
                .as_ref()
                .is_some_and(|tx| tx.send(buffer).is_ok());
            if !attached {
                warn!(handle = %handle.id(), "No command router attached; console input will be ignored");
            }
        }

        handle.activate();
        state.handles.push(handle.clone());
        state.active_count += 1;
        state.check_invariant();

        info!(
            handle = %handle.id(),
            active = state.active_count,
            replayed,
            "Console handle registered"
        );
        Ok(replayed)
    }

    pub async fn has_active_handles(&self) -> bool {
        self.state.lock().await.active_count > 0
    }

    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active_count
    }

    /// Send a message to every active console in registration order
    ///
    /// Handles whose client already hung up are evicted first, so a
    /// message sent before the router notices the disconnect still lands
    /// in the backlog. With no active console the message is backlogged.
    /// A failing console is deactivated and evicted; delivery to the
    /// remaining consoles continues.
    ///
    /// The state lock is released while writing, so a stalled console
    /// delays only other broadcasts, never registration or status reads.
    pub async fn broadcast(&self, message: impl Into<String>, audience: Audience) -> BroadcastReport {
        let message = message.into();
        let _sending = self.send_lock.lock().await;

        let (mut failed, recipients): (Vec<HandleId>, Vec<Arc<ConnectionHandle>>) = {
            let mut state = self.state.lock().await;

            if state.shut_down {
                debug!("Dropping broadcast after hub shutdown");
                return BroadcastReport::ShutDown;
            }

            let closed = state.evict_closed();

            if state.active_count == 0 {
                state.backlog.push(message);
                debug!(backlog = state.backlog.len(), "No active consoles, message backlogged");
                return BroadcastReport::Backlogged;
            }

            let recipients = match audience {
                Audience::All => state
                    .handles
                    .iter()
                    .filter(|h| h.is_active())
                    .cloned()
                    .collect(),
            };
            (closed, recipients)
        };

        let mut delivered = 0;
        let mut broken = Vec::new();
        for handle in &recipients {
            match handle.send(&message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(handle = %handle.id(), error = %e, "Deactivating console handle");
                    broken.push(handle.clone());
                }
            }
        }

        if !broken.is_empty() {
            let mut state = self.state.lock().await;
            for handle in &broken {
                state.deactivate(handle);
                failed.push(handle.id());
            }
            state.evict_inactive();
        }

        BroadcastReport::Delivered { delivered, failed }
    }

    /// Deactivate and evict a handle whose connection is gone
    ///
    /// Returns false if the handle was unknown or already inactive.
    pub async fn deactivate(&self, id: HandleId) -> bool {
        let mut state = self.state.lock().await;
        let Some(handle) = state.handles.iter().find(|h| h.id() == id).cloned() else {
            return false;
        };

        let was_active = handle.is_active();
        state.deactivate(&handle);
        state.evict_inactive();
        drop(state);

        handle.close().await;
        if was_active {
            info!(handle = %id, "Console handle deactivated");
        }
        was_active
    }

    /// Backlogged messages, oldest first
    pub async fn backlog(&self) -> Vec<String> {
        let mut state = self.state.lock().await;
        state.backlog.prune_expired_at(chrono::Utc::now());
        state.backlog.messages()
    }

    pub async fn snapshot(&self) -> HubSnapshot {
        let mut state = self.state.lock().await;
        state.backlog.prune_expired_at(chrono::Utc::now());
        HubSnapshot {
            active_handles: state.active_count,
            handles: state.handles.iter().map(|h| h.id()).collect(),
            backlog: state.backlog.messages(),
        }
    }

    /// Close every handle, the router feed and the backlog
    ///
    /// Only the first call does work.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return;
        }
        state.shut_down = true;

        self.attach_tx.lock().take();

        let handles = std::mem::take(&mut state.handles);
        for handle in &handles {
            handle.deactivate();
            handle.close().await;
        }
        state.active_count = 0;
        state.backlog.clear();

        info!(closed = handles.len(), "Console hub shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{self, MemoryClient};

    fn config(replay: ReplayPolicy) -> ConsoleConfig {
        ConsoleConfig {
            replay,
            write_timeout_ms: 50,
            ..ConsoleConfig::default()
        }
    }

    async fn connect(hub: &Hub) -> (Arc<ConnectionHandle>, MemoryClient) {
        let (sink, _source, client) = memory::connection();
        let handle = hub.create_handle(Box::new(sink));
        hub.register(&handle).await.unwrap();
        (handle, client)
    }

    #[tokio::test]
    async fn test_register_activates_and_counts() {
        let hub = Hub::new(&config(ReplayPolicy::None));
        assert!(!hub.has_active_handles().await);

        let (handle, _client) = connect(&hub).await;
        assert!(handle.is_active());
        assert_eq!(hub.active_count().await, 1);
        assert!(hub.has_active_handles().await);
    }

    #[tokio::test]
    async fn test_register_twice_is_rejected() {
        let hub = Hub::new(&config(ReplayPolicy::None));
        let (handle, _client) = connect(&hub).await;

        let err = hub.register(&handle).await.unwrap_err();
        assert_eq!(err, HubError::AlreadyRegistered(handle.id()));
        assert_eq!(hub.active_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_closed_handle_is_rejected() {
        let hub = Hub::new(&config(ReplayPolicy::None));
        let (sink, _source, _client) = memory::connection();
        let handle = hub.create_handle(Box::new(sink));
        handle.close().await;

        let err = hub.register(&handle).await.unwrap_err();
        assert_eq!(err, HubError::HandleClosed(handle.id()));
        assert_eq!(hub.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_hands_inbound_buffer_to_router() {
        let hub = Hub::new(&config(ReplayPolicy::None));
        let mut attached = hub.take_attach_receiver().unwrap();
        let (handle, _client) = connect(&hub).await;

        let buffer = attached.recv().await.unwrap();
        assert_eq!(buffer.handle(), handle.id());
        assert!(hub.take_attach_receiver().is_none());
    }

    #[tokio::test]
    async fn test_failed_replay_restores_backlog() {
        let hub = Hub::new(&config(ReplayPolicy::All));
        hub.broadcast("one", Audience::All).await;
        hub.broadcast("two", Audience::All).await;

        let (sink, _source, mut client) = memory::connection();
        client.break_connection();
        let handle = hub.create_handle(Box::new(sink));

        assert!(hub.register(&handle).await.is_err());
        assert_eq!(hub.active_count().await, 0);
        assert_eq!(hub.backlog().await, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_broadcast_after_client_hang_up_is_backlogged() {
        let hub = Hub::new(&config(ReplayPolicy::All));
        let (sink, source, mut client) = memory::connection();
        let handle = hub.create_handle(Box::new(sink));
        hub.register(&handle).await.unwrap();
        let reader = tokio::spawn(handle.clone().read_loop(Box::new(source)));

        client.hang_up();
        reader.await.unwrap();
        // the router has not reported the disconnect yet
        assert!(handle.is_active() && handle.is_closed());

        assert_eq!(
            hub.broadcast("important", Audience::All).await,
            BroadcastReport::Backlogged
        );
        assert_eq!(hub.backlog().await, vec!["important"]);
        assert_eq!(hub.active_count().await, 0);
        assert!(hub.snapshot().await.handles.is_empty());
        assert!(!hub.deactivate(handle.id()).await);
    }

    #[tokio::test]
    async fn test_stalled_broadcast_does_not_block_the_hub() {
        let hub = Arc::new(Hub::new(&ConsoleConfig {
            write_timeout_ms: 500,
            ..config(ReplayPolicy::None)
        }));
        let (stalled, client) = connect(&hub).await;
        client.stall_writes();

        let sending = tokio::spawn({
            let hub = hub.clone();
            async move { hub.broadcast("slow", Audience::All).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let quick = Duration::from_millis(200);
        assert_eq!(
            tokio::time::timeout(quick, hub.active_count()).await.unwrap(),
            1
        );
        let (sink, _source, _fresh) = memory::connection();
        let fresh = hub.create_handle(Box::new(sink));
        tokio::time::timeout(quick, hub.register(&fresh))
            .await
            .unwrap()
            .unwrap();

        let report = sending.await.unwrap();
        assert_eq!(
            report,
            BroadcastReport::Delivered {
                delivered: 0,
                failed: vec![stalled.id()],
            }
        );
        assert_eq!(hub.snapshot().await.handles, vec![fresh.id()]);
    }

    #[tokio::test]
    async fn test_deactivate_is_counted_once() {
        let hub = Hub::new(&config(ReplayPolicy::None));
        let (handle, client) = connect(&hub).await;

        assert!(hub.deactivate(handle.id()).await);
        assert!(!hub.deactivate(handle.id()).await);
        assert_eq!(hub.active_count().await, 0);
        assert!(handle.is_closed());
        assert!(client.is_closed_by_server());
    }

    #[tokio::test]
    async fn test_shutdown_closes_everything_once() {
        let hub = Hub::new(&config(ReplayPolicy::None));
        let mut attached = hub.take_attach_receiver().unwrap();
        let (first, _c1) = connect(&hub).await;
        let (second, _c2) = connect(&hub).await;

        hub.shutdown().await;
        hub.shutdown().await;

        assert!(first.is_closed() && second.is_closed());
        assert_eq!(hub.active_count().await, 0);
        assert!(hub.snapshot().await.handles.is_empty());
        assert_eq!(
            hub.broadcast("late", Audience::All).await,
            BroadcastReport::ShutDown
        );

        // both buffers were attached before the feed closed
        assert!(attached.recv().await.is_some());
        assert!(attached.recv().await.is_some());
        assert!(attached.recv().await.is_none());
    }
}
