//! Command types for the bus

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identity of a participant on the command bus
///
/// `Main` is the console itself (operators typing into a browser console
/// and the status broadcast path). Every other variant is a backend
/// module with its own endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleId {
    Main,
    ChatIntegration,
}

impl ModuleId {
    /// All known module identities, in declaration order
    pub const ALL: [ModuleId; 2] = [ModuleId::Main, ModuleId::ChatIntegration];

    /// Stable name used in logs, config and console addressing
    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleId::Main => "main",
            ModuleId::ChatIntegration => "chat_integration",
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name does not match any [`ModuleId`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown module: {0}")]
pub struct UnknownModule(pub String);

impl FromStr for ModuleId {
    type Err = UnknownModule;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        ModuleId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| UnknownModule(s.to_string()))
    }
}

/// A tagged instruction passed between console operators and backend modules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Command payload
    pub command: String,
    /// Who issued the command
    pub source: ModuleId,
    /// Who the command is addressed to
    pub target: ModuleId,
}

impl Command {
    /// Create a new command
    pub fn new(command: impl Into<String>, source: ModuleId, target: ModuleId) -> Self {
        Self {
            command: command.into(),
            source,
            target,
        }
    }

    /// Build the reply to this command, addressed back to its source
    pub fn reply(&self, command: impl Into<String>) -> Self {
        Self::new(command, self.target, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_id_round_trips_through_name() {
        for id in ModuleId::ALL {
            assert_eq!(id.as_str().parse::<ModuleId>().unwrap(), id);
        }
    }

    #[test]
    fn test_module_id_parse_is_lenient_about_case_and_dashes() {
        assert_eq!(
            "Chat-Integration".parse::<ModuleId>().unwrap(),
            ModuleId::ChatIntegration
        );
        assert_eq!(" MAIN ".parse::<ModuleId>().unwrap(), ModuleId::Main);
    }

    #[test]
    fn test_module_id_parse_rejects_unknown() {
        let err = "twitter".parse::<ModuleId>().unwrap_err();
        assert_eq!(err.to_string(), "unknown module: twitter");
    }

    #[test]
    fn test_module_id_serde_uses_snake_case() {
        let json = serde_json::to_string(&ModuleId::ChatIntegration).unwrap();
        assert_eq!(json, "\"chat_integration\"");
    }

    #[test]
    fn test_reply_swaps_source_and_target() {
        let cmd = Command::new("status", ModuleId::Main, ModuleId::ChatIntegration);
        let reply = cmd.reply("ok");
        assert_eq!(reply.source, ModuleId::ChatIntegration);
        assert_eq!(reply.target, ModuleId::Main);
        assert_eq!(reply.command, "ok");
    }
}
