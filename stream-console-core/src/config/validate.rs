//! Configuration validation rules.

use super::schema::{Config, ReplayPolicy};

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.server.host.trim().is_empty() {
        errors.push("server.host must not be empty".to_string());
    }
    if config.server.port == 0 {
        errors.push("server.port must be > 0".to_string());
    }
    if config.server.allowed_origins.is_empty() {
        errors.push("server.allowed_origins must list at least one origin".to_string());
    }
    for origin in &config.server.allowed_origins {
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            errors.push(format!(
                "server.allowed_origins entry {:?} must start with http:// or https://",
                origin
            ));
        }
    }
    if config.server.index_file.trim().is_empty() {
        errors.push("server.index_file must not be empty".to_string());
    }

    if config.console.inbound_capacity == 0 {
        errors.push("console.inbound_capacity must be > 0".to_string());
    }
    if config.console.write_timeout_ms == 0 {
        errors.push("console.write_timeout_ms must be > 0".to_string());
    }
    if config.console.backlog_capacity == 0 {
        errors.push("console.backlog_capacity must be > 0".to_string());
    }
    if config.console.replay == ReplayPolicy::Last(0) {
        errors.push("console.replay last must be > 0 (use \"none\" to disable replay)".to_string());
    }
    if config.console.heartbeat_secs > 0 && config.console.heartbeat_message.is_empty() {
        errors.push(
            "console.heartbeat_message is required when heartbeat_secs is set".to_string(),
        );
    }

    if config.router.module_channel_capacity == 0 {
        errors.push("router.module_channel_capacity must be > 0".to_string());
    }
    if config.router.retry.max_attempts == 0 {
        errors.push("router.retry.max_attempts must be > 0".to_string());
    }
    if config.router.retry.initial_backoff_ms > config.router.retry.max_backoff_ms {
        errors.push(
            "router.retry.initial_backoff_ms must not exceed router.retry.max_backoff_ms"
                .to_string(),
        );
    }

    let chat = &config.modules.chat_integration;
    if chat.enabled {
        if chat.channel.trim().is_empty() {
            errors.push(
                "modules.chat_integration.channel is required when chat_integration is enabled"
                    .to_string(),
            );
        }
        if chat.username.trim().is_empty() {
            errors.push(
                "modules.chat_integration.username is required when chat_integration is enabled"
                    .to_string(),
            );
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
