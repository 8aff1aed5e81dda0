use serde::Serialize;
use std::sync::Arc;
use stream_console_core::bus::ModuleId;
use stream_console_hub::{Hub, HubSnapshot};
use stream_console_modules::ModuleManager;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub modules: Arc<ModuleManager>,
    pub allowed_origins: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(hub: Arc<Hub>, modules: Arc<ModuleManager>, allowed_origins: Vec<String>) -> Self {
        Self {
            hub,
            modules,
            allowed_origins: Arc::new(allowed_origins),
        }
    }

    /// Only pages served from a configured origin may open a console
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            Some(origin) => self
                .allowed_origins
                .iter()
                .any(|allowed| allowed.trim_end_matches('/') == origin.trim_end_matches('/')),
            None => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub id: ModuleId,
    pub running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub hub: HubSnapshot,
    pub modules: Vec<ModuleStatus>,
}
