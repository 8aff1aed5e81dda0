//! Backend modules for stream-console
//!
//! Modules sit behind the command router. Each one owns the module side of
//! a bounded channel pair and talks to the consoles only through it.

pub mod base;
pub mod chat;
pub mod manager;

pub use base::{ModuleError, ModuleHandler, ModuleHandlerPtr, Result};
pub use chat::ChatIntegrationHandler;
pub use manager::ModuleManager;
