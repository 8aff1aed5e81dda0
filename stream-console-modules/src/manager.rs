//! Module manager

use crate::base::{ModuleError, ModuleHandler, ModuleHandlerPtr, Result};
use crate::chat::ChatIntegrationHandler;
use std::collections::BTreeMap;
use std::sync::Arc;
use stream_console_core::bus::{module_channel, ModuleEndpoint, ModuleId};
use stream_console_core::config::ModulesConfig;
use tokio::sync::RwLock;

/// Module manager that owns every backend module handler
pub struct ModuleManager {
    /// Configuration
    config: ModulesConfig,
    /// Capacity of each module's command channels
    channel_capacity: usize,
    /// Module handlers
    handlers: RwLock<BTreeMap<ModuleId, ModuleHandlerPtr>>,
}

impl ModuleManager {
    /// Create a new module manager
    pub fn new(config: ModulesConfig, channel_capacity: usize) -> Self {
        Self {
            config,
            channel_capacity,
            handlers: RwLock::new(BTreeMap::new()),
        }
    }

    /// Initialize enabled modules and return the router's side of their channels
    pub async fn initialize(&self) -> Result<Vec<ModuleEndpoint>> {
        let mut handlers = self.handlers.write().await;
        let mut endpoints = Vec::new();

        if self.config.chat_integration.enabled {
            if self.config.chat_integration.channel.trim().is_empty() {
                return Err(ModuleError::NotConfigured(
                    "chat_integration channel is empty".to_string(),
                ));
            }
            let (endpoint, port) = module_channel(ModuleId::ChatIntegration, self.channel_capacity);
            let mut handler = ChatIntegrationHandler::new(self.config.chat_integration.clone());
            handler.set_port(port);
            handlers.insert(
                ModuleId::ChatIntegration,
                Arc::new(RwLock::new(handler)) as ModuleHandlerPtr,
            );
            endpoints.push(endpoint);
            tracing::info!("Chat integration module initialized");
        } else {
            tracing::info!("Chat integration module disabled");
        }

        Ok(endpoints)
    }

    /// Start all module handlers
    pub async fn start_all(&self) -> Result<()> {
        let handlers = self.handlers.read().await;

        for (id, handler) in handlers.iter() {
            tracing::info!("Starting {} module...", id);
            let mut handler = handler.write().await;
            if let Err(e) = handler.start().await {
                tracing::error!("Failed to start {} module: {}", id, e);
            }
        }

        Ok(())
    }

    /// Stop all module handlers
    pub async fn stop_all(&self) -> Result<()> {
        let mut handlers = self.handlers.write().await;

        for (id, handler) in handlers.iter() {
            tracing::info!("Stopping {} module...", id);
            let mut handler = handler.write().await;
            if let Err(e) = handler.stop().await {
                tracing::error!("Failed to stop {} module: {}", id, e);
            }
        }

        handlers.clear();
        Ok(())
    }

    /// Get a module handler by id
    pub async fn get_handler(&self, id: ModuleId) -> Option<ModuleHandlerPtr> {
        self.handlers.read().await.get(&id).cloned()
    }

    /// Check if a module is running
    pub async fn is_module_running(&self, id: ModuleId) -> bool {
        match self.get_handler(id).await {
            Some(handler) => handler.read().await.is_running(),
            None => false,
        }
    }

    /// Get list of initialized modules
    pub async fn list_modules(&self) -> Vec<ModuleId> {
        self.handlers.read().await.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_console_core::config::ChatIntegrationConfig;

    #[tokio::test]
    async fn test_initialize_enabled_module() {
        let manager = ModuleManager::new(ModulesConfig::default(), 8);
        let endpoints = manager.initialize().await.unwrap();

        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].id(), ModuleId::ChatIntegration);
        assert_eq!(manager.list_modules().await, vec![ModuleId::ChatIntegration]);
        assert!(!manager.is_module_running(ModuleId::ChatIntegration).await);
    }

    #[tokio::test]
    async fn test_disabled_module_is_skipped() {
        let config = ModulesConfig {
            chat_integration: ChatIntegrationConfig {
                enabled: false,
                ..Default::default()
            },
        };
        let manager = ModuleManager::new(config, 8);

        assert!(manager.initialize().await.unwrap().is_empty());
        assert!(manager.list_modules().await.is_empty());
        assert!(manager.get_handler(ModuleId::ChatIntegration).await.is_none());
    }

    #[tokio::test]
    async fn test_start_and_stop_all() {
        let manager = ModuleManager::new(ModulesConfig::default(), 8);
        let _endpoints = manager.initialize().await.unwrap();

        manager.start_all().await.unwrap();
        assert!(manager.is_module_running(ModuleId::ChatIntegration).await);

        manager.stop_all().await.unwrap();
        assert!(!manager.is_module_running(ModuleId::ChatIntegration).await);
        assert!(manager.list_modules().await.is_empty());
    }
}
