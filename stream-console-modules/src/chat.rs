//! Chat integration module
//!
//! Stands between the console and a streaming platform's chat. It watches
//! one chat channel as one account; operators drive it from the console
//! and it reports back through the command bus.

use crate::base::{ModuleError, ModuleHandler, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use stream_console_core::bus::{Command, ModuleId, ModulePort};
use stream_console_core::config::ChatIntegrationConfig;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Chat integration handler
pub struct ChatIntegrationHandler {
    config: ChatIntegrationConfig,
    port: Option<ModulePort>,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChatIntegrationHandler {
    /// Create a new chat integration handler
    pub fn new(config: ChatIntegrationConfig) -> Self {
        Self {
            config,
            port: None,
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    async fn run(
        config: ChatIntegrationConfig,
        mut port: ModulePort,
        running: Arc<AtomicBool>,
        cancel: CancellationToken,
    ) {
        let announce = port.to_console(format!(
            "watching #{} as {}",
            config.channel, config.username
        ));
        if let Err(e) = port.try_send(announce) {
            warn!(error = %e, "Could not announce chat integration start");
        }

        loop {
            let command = tokio::select! {
                _ = cancel.cancelled() => break,
                command = port.recv() => command,
            };

            let Some(command) = command else {
                info!("Router closed the chat integration channel");
                break;
            };

            info!(source = %command.source, "Got command {}", command.command);
            let Some(reply) = respond(&config, &command) else {
                continue;
            };

            let sent = tokio::select! {
                _ = cancel.cancelled() => break,
                sent = port.send(reply) => sent,
            };
            if let Err(e) = sent {
                warn!(error = %e, "Chat integration could not reply");
                break;
            }
        }

        running.store(false, Ordering::SeqCst);
        debug!("Chat integration loop stopped");
    }
}

/// Reply a command deserves, if any
fn respond(config: &ChatIntegrationConfig, command: &Command) -> Option<Command> {
    let text = command.command.trim();
    let (verb, rest) = text.split_once(' ').unwrap_or((text, ""));

    let reply = match verb {
        "status" => format!(
            "status: watching #{} as {}",
            config.channel, config.username
        ),
        "ping" => "pong".to_string(),
        "say" if !rest.trim().is_empty() => {
            info!(channel = %config.channel, "Posting to chat: {}", rest.trim());
            format!("#{} <{}> {}", config.channel, config.username, rest.trim())
        }
        "say" => "usage: say <message>".to_string(),
        _ => format!("unknown command: {}", text),
    };

    // Commands from other modules are not echoed back to them
    if command.source != ModuleId::Main {
        debug!(source = %command.source, "Not replying to module command");
        return None;
    }
    Some(command.reply(reply))
}

#[async_trait]
impl ModuleHandler for ChatIntegrationHandler {
    fn id(&self) -> ModuleId {
        ModuleId::ChatIntegration
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn set_port(&mut self, port: ModulePort) {
        self.port = Some(port);
    }

    async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(ModuleError::AlreadyRunning(self.id().to_string()));
        }
        let port = self
            .port
            .take()
            .ok_or_else(|| ModuleError::NoPort(self.id().to_string()))?;

        info!(channel = %self.config.channel, "Starting chat integration");
        self.cancel = CancellationToken::new();
        self.running.store(true, Ordering::SeqCst);
        self.task = Some(tokio::spawn(Self::run(
            self.config.clone(),
            port,
            self.running.clone(),
            self.cancel.clone(),
        )));
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Err(ModuleError::NotRunning(self.id().to_string()));
        };

        self.cancel.cancel();
        if let Err(e) = task.await {
            warn!(error = %e, "Chat integration task ended abnormally");
        }
        self.running.store(false, Ordering::SeqCst);
        info!("Chat integration stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use stream_console_core::bus::module_channel;
    use tokio::time::timeout;

    fn config() -> ChatIntegrationConfig {
        ChatIntegrationConfig {
            enabled: true,
            channel: "speedruns".to_string(),
            username: "console-bot".to_string(),
        }
    }

    fn from_console(text: &str) -> Command {
        Command::new(text, ModuleId::Main, ModuleId::ChatIntegration)
    }

    #[test]
    fn test_respond_status_and_ping() {
        let status = respond(&config(), &from_console("status")).unwrap();
        assert_eq!(status.command, "status: watching #speedruns as console-bot");
        assert_eq!(status.target, ModuleId::Main);

        let pong = respond(&config(), &from_console("ping")).unwrap();
        assert_eq!(pong.command, "pong");
    }

    #[test]
    fn test_respond_say_and_unknown() {
        let said = respond(&config(), &from_console("say hi chat")).unwrap();
        assert_eq!(said.command, "#speedruns <console-bot> hi chat");

        let usage = respond(&config(), &from_console("say")).unwrap();
        assert_eq!(usage.command, "usage: say <message>");

        let unknown = respond(&config(), &from_console("dance")).unwrap();
        assert_eq!(unknown.command, "unknown command: dance");
    }

    #[tokio::test]
    async fn test_start_without_port_fails() {
        let mut handler = ChatIntegrationHandler::new(config());
        let err = handler.start().await.unwrap_err();
        assert!(matches!(err, ModuleError::NoPort(_)));
        assert!(!handler.is_running());
    }

    #[tokio::test]
    async fn test_module_announces_and_answers() {
        let (mut endpoint, port) = module_channel(ModuleId::ChatIntegration, 4);
        let mut handler = ChatIntegrationHandler::new(config());
        handler.set_port(port);
        handler.start().await.unwrap();
        assert!(handler.is_running());

        let announce = timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(cmd) = endpoint.try_recv() {
                    return cmd;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(announce.command, "watching #speedruns as console-bot");

        endpoint
            .deliver(from_console("ping"), &Default::default())
            .await
            .unwrap();
        let reply = timeout(Duration::from_secs(1), async {
            loop {
                if let Ok(cmd) = endpoint.try_recv() {
                    return cmd;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(reply.command, "pong");

        handler.stop().await.unwrap();
        assert!(!handler.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_not_started() {
        let mut handler = ChatIntegrationHandler::new(config());
        let err = handler.stop().await.unwrap_err();
        assert!(matches!(err, ModuleError::NotRunning(_)));
    }
}
