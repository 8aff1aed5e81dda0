//! Bounded channel pairs between the router and backend modules

use super::events::{Command, ModuleId};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, warn};

/// Bounded retry with exponential backoff used when a target channel is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Backoff to wait after the given (1-based) failed attempt
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_millis(400),
        }
    }
}

/// Command delivery errors
///
/// Every variant hands the undelivered command back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("module {target} did not accept the command after {attempts} attempts (channel full)")]
    Backpressure {
        target: ModuleId,
        attempts: u32,
        command: Command,
    },

    #[error("module {target} is no longer receiving commands")]
    Closed { target: ModuleId, command: Command },

    #[error("no route to module {target}")]
    NoRoute { target: ModuleId, command: Command },
}

impl DeliveryError {
    /// The command that could not be delivered
    pub fn command(&self) -> &Command {
        match self {
            DeliveryError::Backpressure { command, .. }
            | DeliveryError::Closed { command, .. }
            | DeliveryError::NoRoute { command, .. } => command,
        }
    }

    /// Recover the command that could not be delivered
    pub fn into_command(self) -> Command {
        match self {
            DeliveryError::Backpressure { command, .. }
            | DeliveryError::Closed { command, .. }
            | DeliveryError::NoRoute { command, .. } => command,
        }
    }
}

/// Router side of a module connection
#[derive(Debug)]
pub struct ModuleEndpoint {
    id: ModuleId,
    to_module: mpsc::Sender<Command>,
    from_module: mpsc::Receiver<Command>,
}

/// Module side of a module connection
#[derive(Debug)]
pub struct ModulePort {
    id: ModuleId,
    inbound: mpsc::Receiver<Command>,
    outbound: mpsc::Sender<Command>,
}

/// Create the two halves of a module connection, each direction bounded by `capacity`
pub fn module_channel(id: ModuleId, capacity: usize) -> (ModuleEndpoint, ModulePort) {
    let (to_module, inbound) = mpsc::channel(capacity.max(1));
    let (outbound, from_module) = mpsc::channel(capacity.max(1));

    (
        ModuleEndpoint {
            id,
            to_module,
            from_module,
        },
        ModulePort {
            id,
            inbound,
            outbound,
        },
    )
}

impl ModuleEndpoint {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Deliver a command into the module without blocking indefinitely
    ///
    /// A full channel is retried with exponential backoff up to
    /// `policy.max_attempts` times before the command is handed back.
    pub async fn deliver(&self, command: Command, policy: &RetryPolicy) -> Result<(), DeliveryError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut command = command;
        let mut attempt = 1;

        loop {
            match self.to_module.try_send(command) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Closed(command)) => {
                    return Err(DeliveryError::Closed {
                        target: self.id,
                        command,
                    });
                }
                Err(TrySendError::Full(rejected)) => {
                    if attempt >= max_attempts {
                        warn!(module = %self.id, attempts = attempt, "Module channel still full, giving up");
                        return Err(DeliveryError::Backpressure {
                            target: self.id,
                            attempts: attempt,
                            command: rejected,
                        });
                    }
                    let backoff = policy.backoff_for(attempt);
                    debug!(module = %self.id, attempt, ?backoff, "Module channel full, backing off");
                    tokio::time::sleep(backoff).await;
                    command = rejected;
                    attempt += 1;
                }
            }
        }
    }

    /// Poll for the next command emitted by the module
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Command>> {
        self.from_module.poll_recv(cx)
    }

    /// Take a command emitted by the module if one is ready
    pub fn try_recv(&mut self) -> Result<Command, TryRecvError> {
        self.from_module.try_recv()
    }

    /// True once the module has dropped its inbound receiver
    pub fn is_closed(&self) -> bool {
        self.to_module.is_closed()
    }
}

impl ModulePort {
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Wait for the next command addressed to this module
    ///
    /// Returns `None` once the router side has gone away.
    pub async fn recv(&mut self) -> Option<Command> {
        self.inbound.recv().await
    }

    /// Take a command addressed to this module if one is ready
    pub fn try_recv(&mut self) -> Result<Command, TryRecvError> {
        self.inbound.try_recv()
    }

    /// Push a command toward the router, waiting while the channel is full
    pub async fn send(&self, command: Command) -> Result<(), DeliveryError> {
        self.outbound
            .send(command)
            .await
            .map_err(|e| DeliveryError::Closed {
                target: ModuleId::Main,
                command: e.0,
            })
    }

    /// Push a command toward the router without waiting
    ///
    /// A full channel is reported as backpressure so the caller can retry.
    pub fn try_send(&self, command: Command) -> Result<(), DeliveryError> {
        self.outbound.try_send(command).map_err(|e| match e {
            TrySendError::Full(command) => DeliveryError::Backpressure {
                target: ModuleId::Main,
                attempts: 1,
                command,
            },
            TrySendError::Closed(command) => DeliveryError::Closed {
                target: ModuleId::Main,
                command,
            },
        })
    }

    /// Build a command from this module to the console
    pub fn to_console(&self, text: impl Into<String>) -> Command {
        Command::new(text, self.id, ModuleId::Main)
    }
}
