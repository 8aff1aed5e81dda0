//! Base trait for backend module handlers

use async_trait::async_trait;
use std::sync::Arc;
use stream_console_core::bus::{ModuleId, ModulePort};
use tokio::sync::RwLock;

/// Trait for backend module handlers
///
/// A module is handed the module side of its command channel pair before
/// it is started. Once running it receives commands addressed to it on
/// the port and may push commands back at any time.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    /// Identity of this module on the command bus
    fn id(&self) -> ModuleId;

    /// Check if the module is running
    fn is_running(&self) -> bool;

    /// Hand the module its side of the command channels
    fn set_port(&mut self, port: ModulePort);

    /// Start the module
    async fn start(&mut self) -> Result<()>;

    /// Stop the module
    async fn stop(&mut self) -> Result<()>;
}

/// Module errors
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("Module not configured: {0}")]
    NotConfigured(String),

    #[error("Module not running: {0}")]
    NotRunning(String),

    #[error("Module already running: {0}")]
    AlreadyRunning(String),

    #[error("Module has no command port: {0}")]
    NoPort(String),
}

pub type Result<T> = std::result::Result<T, ModuleError>;

/// Shared module handler type
pub type ModuleHandlerPtr = Arc<RwLock<dyn ModuleHandler>>;
