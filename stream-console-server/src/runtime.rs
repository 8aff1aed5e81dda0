//! Console runtime
//!
//! Binds the listener, builds the hub, modules and router from one
//! [`Config`], and runs them until the cancellation token fires.

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use stream_console_core::config::{validate_config, Config};
use stream_console_hub::{CommandRouter, Hub};
use stream_console_modules::ModuleManager;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::server::{build_router, run_server};
use crate::state::AppState;
use crate::ticker::run_ticker;

pub struct Console {
    config: Config,
    listener: TcpListener,
    hub: Arc<Hub>,
    modules: Arc<ModuleManager>,
}

impl Console {
    /// Validate `config` and bind its listening address
    pub async fn bind(config: Config) -> anyhow::Result<Self> {
        validate_config(&config)?;
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind console listener on {}", addr))?;
        Ok(Self::with_listener(config, listener))
    }

    /// Use an already bound listener
    pub fn with_listener(config: Config, listener: TcpListener) -> Self {
        let hub = Arc::new(Hub::new(&config.console));
        let modules = Arc::new(ModuleManager::new(
            config.modules.clone(),
            config.router.module_channel_capacity,
        ));
        Self {
            config,
            listener,
            hub,
            modules,
        }
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn hub(&self) -> Arc<Hub> {
        self.hub.clone()
    }

    pub fn modules(&self) -> Arc<ModuleManager> {
        self.modules.clone()
    }

    /// Serve until `cancel` fires, then tear everything down
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let Console {
            config,
            listener,
            hub,
            modules,
        } = self;

        let endpoints = modules.initialize().await?;
        let router = CommandRouter::new(hub.clone(), endpoints, &config.router);
        let router_task = tokio::spawn(router.run(cancel.clone()));
        modules.start_all().await?;

        let ticker_task = config.console.heartbeat_interval().map(|period| {
            info!(?period, "Status ticker enabled");
            tokio::spawn(run_ticker(
                hub.clone(),
                period,
                config.console.heartbeat_message.clone(),
                cancel.clone(),
            ))
        });

        let state = AppState::new(
            hub.clone(),
            modules.clone(),
            config.server.allowed_origins.clone(),
        );
        let app = build_router(state, &config.server);

        // Closing the consoles first lets the server drain their connections
        let shutdown_hub = hub.clone();
        let shutdown = cancel.clone();
        let served = run_server(listener, app, async move {
            shutdown.cancelled().await;
            shutdown_hub.shutdown().await;
        })
        .await;
        if let Err(e) = &served {
            error!("Console server failed: {:#}", e);
        }

        cancel.cancel();
        if let Err(e) = router_task.await {
            error!("Command router task failed: {}", e);
        }
        if let Some(task) = ticker_task {
            if let Err(e) = task.await {
                error!("Status ticker task failed: {}", e);
            }
        }
        modules.stop_all().await?;
        hub.shutdown().await;
        info!("Console stopped");

        served
    }
}
