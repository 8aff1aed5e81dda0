//! Command router
//!
//! Multiplexes operator input from every console and commands emitted by
//! backend modules into one ordered dispatch path. Instead of spinning on
//! a sleep, each pass is a single wait across every source: the router
//! parks until at least one console buffer, module channel or new
//! registration is ready, then services every ready source once, in
//! registration order, before looking at any source again.

use crate::handle::{Audience, HandleId, InboundBuffer};
use crate::hub::Hub;
use std::sync::Arc;
use std::task::{Context, Poll};
use stream_console_core::bus::{Command, DeliveryError, ModuleEndpoint, ModuleId, RetryPolicy, UnknownModule};
use stream_console_core::config::RouterConfig;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Something the router has to act on
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RouterEvent {
    Console { handle: HandleId, frame: Vec<u8> },
    ConsoleClosed(HandleId),
    Module(Command),
    ModuleClosed(ModuleId),
}

struct ModuleSlot {
    endpoint: ModuleEndpoint,
    draining: bool,
}

/// Every input the router waits on
pub(crate) struct Sources {
    attach: Option<mpsc::UnboundedReceiver<InboundBuffer>>,
    consoles: Vec<InboundBuffer>,
    modules: Vec<ModuleSlot>,
}

impl Sources {
    fn new(
        attach: Option<mpsc::UnboundedReceiver<InboundBuffer>>,
        endpoints: Vec<ModuleEndpoint>,
    ) -> Self {
        Self {
            attach,
            consoles: Vec::new(),
            modules: endpoints
                .into_iter()
                .map(|endpoint| ModuleSlot {
                    endpoint,
                    draining: true,
                })
                .collect(),
        }
    }

    /// One round-robin pass over every source
    ///
    /// Each console buffer and module channel contributes at most one
    /// event per pass. Closed sources are reported once and dropped from
    /// later passes. Pending only when nothing at all is ready.
    pub(crate) fn poll_pass(&mut self, cx: &mut Context<'_>) -> Poll<Vec<RouterEvent>> {
        let mut attach_closed = false;
        if let Some(attach) = self.attach.as_mut() {
            loop {
                match attach.poll_recv(cx) {
                    Poll::Ready(Some(buffer)) => {
                        debug!(handle = %buffer.handle(), "Servicing new console buffer");
                        self.consoles.push(buffer);
                    }
                    Poll::Ready(None) => {
                        attach_closed = true;
                        break;
                    }
                    Poll::Pending => break,
                }
            }
        }
        if attach_closed {
            debug!("Console registration feed closed");
            self.attach = None;
        }

        let mut batch = Vec::new();

        self.consoles.retain_mut(|buffer| match buffer.poll_recv(cx) {
            Poll::Ready(Some(frame)) => {
                batch.push(RouterEvent::Console {
                    handle: buffer.handle(),
                    frame,
                });
                true
            }
            Poll::Ready(None) => {
                batch.push(RouterEvent::ConsoleClosed(buffer.handle()));
                false
            }
            Poll::Pending => true,
        });

        for slot in self.modules.iter_mut().filter(|slot| slot.draining) {
            match slot.endpoint.poll_recv(cx) {
                Poll::Ready(Some(command)) => batch.push(RouterEvent::Module(command)),
                Poll::Ready(None) => {
                    slot.draining = false;
                    batch.push(RouterEvent::ModuleClosed(slot.endpoint.id()));
                }
                Poll::Pending => {}
            }
        }

        if batch.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(batch)
        }
    }

    fn endpoint(&self, id: ModuleId) -> Option<&ModuleEndpoint> {
        self.modules
            .iter()
            .map(|slot| &slot.endpoint)
            .find(|endpoint| endpoint.id() == id)
    }
}

/// Parse one line typed into a console
///
/// `@<module> <text>` addresses a module explicitly; anything else goes
/// to `default_target`. Blank input yields `None`.
pub fn parse_operator_command(
    text: &str,
    default_target: ModuleId,
) -> Result<Option<Command>, UnknownModule> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let (target, command) = match text.strip_prefix('@') {
        Some(addressed) => {
            let (name, rest) = addressed
                .split_once(char::is_whitespace)
                .unwrap_or((addressed, ""));
            (name.parse::<ModuleId>()?, rest.trim())
        }
        None => (default_target, text),
    };

    if command.is_empty() {
        return Ok(None);
    }
    Ok(Some(Command::new(command, ModuleId::Main, target)))
}

/// Routes operator and module commands to their targets
pub struct CommandRouter {
    hub: Arc<Hub>,
    sources: Sources,
    default_target: ModuleId,
    retry: RetryPolicy,
}

impl CommandRouter {
    /// Build a router for the hub's consoles and the given module endpoints
    pub fn new(hub: Arc<Hub>, endpoints: Vec<ModuleEndpoint>, config: &RouterConfig) -> Self {
        let attach = hub.take_attach_receiver();
        if attach.is_none() {
            warn!("Console registration feed already taken; router will only see module commands");
        }

        Self {
            hub,
            sources: Sources::new(attach, endpoints),
            default_target: config.default_target,
            retry: RetryPolicy::from(&config.retry),
        }
    }

    /// Run until cancelled
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            modules = self.sources.modules.len(),
            default_target = %self.default_target,
            "Command router started"
        );

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => break,
                batch = futures::future::poll_fn(|cx| self.sources.poll_pass(cx)) => batch,
            };

            for event in batch {
                self.handle_event(event).await;
            }
        }

        info!("Command router stopped");
    }

    async fn handle_event(&mut self, event: RouterEvent) {
        match event {
            RouterEvent::Console { handle, frame } => self.handle_console_frame(handle, frame).await,
            RouterEvent::ConsoleClosed(handle) => {
                info!(handle = %handle, "Websocket management connection closed by client");
                self.hub.deactivate(handle).await;
            }
            RouterEvent::Module(command) => {
                debug!(source = %command.source, target = %command.target, "Got command from module");
                self.dispatch(command).await;
            }
            RouterEvent::ModuleClosed(module) => {
                warn!(module = %module, "Module stopped sending commands");
            }
        }
    }

    async fn handle_console_frame(&mut self, handle: HandleId, frame: Vec<u8>) {
        let text = match String::from_utf8(frame) {
            Ok(text) => text,
            Err(e) => {
                warn!(handle = %handle, error = %e, "Ignoring console frame that is not UTF-8");
                return;
            }
        };

        match parse_operator_command(&text, self.default_target) {
            Ok(Some(command)) => {
                info!(handle = %handle, target = %command.target, "Got command: {}", command.command);
                self.dispatch(command).await;
            }
            Ok(None) => debug!(handle = %handle, "Ignoring empty console input"),
            Err(e) => {
                warn!(handle = %handle, error = %e, "Console addressed an unknown module");
                self.hub
                    .broadcast(format!("[router] {}", e), Audience::All)
                    .await;
            }
        }
    }

    /// Deliver a command to its target
    ///
    /// Commands for `Main` become console broadcasts; everything else goes
    /// to the target module's endpoint. Failures are announced to the
    /// consoles rather than dropped.
    async fn dispatch(&self, command: Command) {
        if command.target == ModuleId::Main {
            let line = format!("[{}] {}", command.source, command.command);
            self.hub.broadcast(line, Audience::All).await;
            return;
        }

        let target = command.target;
        let result = match self.sources.endpoint(target) {
            Some(endpoint) => endpoint.deliver(command, &self.retry).await,
            None => Err(DeliveryError::NoRoute { target, command }),
        };

        match result {
            Ok(()) => debug!(target = %target, "Command delivered"),
            Err(e) => {
                error!(target = %target, error = %e, "Command delivery failed");
                let notice = format!("[router] {} (command: {})", e, e.command().command);
                self.hub.broadcast(notice, Audience::All).await;
            }
        }
    }
}
