//! Core types and configuration for stream-console
//!
//! This crate provides the command bus, configuration, error type and
//! logging setup shared by the hub, the backend modules and the server.

pub mod bus;
pub mod config;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
