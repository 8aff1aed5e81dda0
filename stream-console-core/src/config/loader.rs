//! Configuration loading and management

use super::schema::Config;
use super::validate::validate_config;
use crate::{Error, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Prefix of `STREAM_CONSOLE__SECTION__KEY=value` overrides
const OVERRIDE_PREFIX: &str = "STREAM_CONSOLE__";

/// Short environment names for the settings changed most often
const ENV_ALIASES: [(&str, &str); 2] = [
    ("STREAM_CONSOLE_HOST", "server.host"),
    ("STREAM_CONSOLE_PORT", "server.port"),
];

/// Configuration loader
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    /// Create a new config loader with the default config directory
    pub fn new() -> Self {
        let config_dir = dirs::home_dir()
            .map(|h| h.join(".stream-console"))
            .unwrap_or_else(|| PathBuf::from(".stream-console"));

        Self { config_dir }
    }

    /// Create a new config loader with a custom config directory
    pub fn with_dir<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            config_dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Load the config file, apply environment overrides and validate
    ///
    /// Every section is `#[serde(default)]`, so a partial file only
    /// replaces the keys it names. Aliases apply before path overrides.
    pub fn load(&self) -> Result<Config> {
        let config_path = self.config_path();
        let config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {}", config_path.display(), e)))?
        } else {
            Config::default()
        };

        let config = apply_env_overrides(config, env_overrides(std::env::vars()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, config: &Config) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(self.config_path(), content)?;
        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the config file path
    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Dotted config keys and raw values taken from the environment, in the
/// order they must be applied
fn env_overrides(vars: impl Iterator<Item = (String, String)>) -> Vec<(String, String)> {
    let vars: Vec<(String, String)> = vars.collect();

    let aliases = ENV_ALIASES.iter().filter_map(|(name, key)| {
        vars.iter()
            .find(|(var, _)| var == name)
            .map(|(_, raw)| (key.to_string(), raw.clone()))
    });

    let mut paths: Vec<(String, String)> = vars
        .iter()
        .filter_map(|(var, raw)| {
            let key = var
                .strip_prefix(OVERRIDE_PREFIX)?
                .split("__")
                .map(str::to_ascii_lowercase)
                .collect::<Vec<_>>()
                .join(".");
            Some((key, raw.clone()))
        })
        .collect();
    paths.sort();

    aliases.chain(paths).collect()
}

/// Write each override into the typed config
///
/// Keys must name an existing field; the value is read as JSON when it
/// parses, otherwise as a plain string.
fn apply_env_overrides(config: Config, overrides: Vec<(String, String)>) -> Result<Config> {
    if overrides.is_empty() {
        return Ok(config);
    }

    let mut tree = serde_json::to_value(config)?;
    for (key, raw) in overrides {
        let pointer = format!("/{}", key.replace('.', "/"));
        let slot = tree
            .pointer_mut(&pointer)
            .ok_or_else(|| Error::Config(format!("unknown config key from environment: {}", key)))?;
        *slot = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
    }

    serde_json::from_value(tree).map_err(|e| Error::Config(format!("environment override: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ModuleId;
    use crate::config::schema::ReplayPolicy;
    use once_cell::sync::Lazy;
    use std::sync::{Mutex, MutexGuard};
    use tempfile::TempDir;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    struct EnvVarGuard {
        key: String,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &str, value: &str) -> Self {
            let original = std::env::var(key).ok();
            // SAFETY: tests serialize env mutations with ENV_LOCK.
            unsafe { std::env::set_var(key, value) };
            Self {
                key: key.to_string(),
                original,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            if let Some(value) = &self.original {
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                unsafe { std::env::set_var(&self.key, value) };
            } else {
                // SAFETY: tests serialize env mutations with ENV_LOCK.
                unsafe { std::env::remove_var(&self.key) };
            }
        }
    }

    fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[test]
    fn test_load_default_config() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());
        let config = loader.load().unwrap();

        assert_eq!(config.server.port, 8765);
        assert_eq!(config.console.replay, ReplayPolicy::All);
    }

    #[test]
    fn test_save_and_load_config() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_dir(temp_dir.path());

        let mut config = Config::default();
        config.modules.chat_integration.channel = "speedruns".to_string();
        config.console.replay = ReplayPolicy::Last(5);

        loader.save(&config).unwrap();
        let loaded = loader.load().unwrap();

        assert_eq!(loaded.modules.chat_integration.channel, "speedruns");
        assert_eq!(loaded.console.replay, ReplayPolicy::Last(5));
    }

    #[test]
    fn test_file_values_merge_over_defaults() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            r#"{"server": {"port": 9000}, "router": {"default_target": "main"}}"#,
        )
        .unwrap();

        let config = ConfigLoader::with_dir(temp_dir.path()).load().unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.router.default_target, ModuleId::Main);
    }

    #[test]
    fn test_load_applies_alias_env_overrides() {
        let _lock = lock_env();
        let _port_guard = EnvVarGuard::set("STREAM_CONSOLE_PORT", "9100");
        let _host_guard = EnvVarGuard::set("STREAM_CONSOLE_HOST", "0.0.0.0");

        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::with_dir(temp_dir.path()).load().unwrap();

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_load_applies_path_env_overrides() {
        let _lock = lock_env();
        let _capacity_guard = EnvVarGuard::set("STREAM_CONSOLE__CONSOLE__INBOUND_CAPACITY", "10");
        let _replay_guard = EnvVarGuard::set("STREAM_CONSOLE__CONSOLE__REPLAY", "none");
        let _enabled_guard =
            EnvVarGuard::set("STREAM_CONSOLE__MODULES__CHAT_INTEGRATION__ENABLED", "false");

        let temp_dir = TempDir::new().unwrap();
        let config = ConfigLoader::with_dir(temp_dir.path()).load().unwrap();

        assert_eq!(config.console.inbound_capacity, 10);
        assert_eq!(config.console.replay, ReplayPolicy::None);
        assert!(!config.modules.chat_integration.enabled);
    }

    #[test]
    fn test_path_env_overrides_alias_and_file() {
        let _lock = lock_env();
        let _alias_guard = EnvVarGuard::set("STREAM_CONSOLE_PORT", "9200");
        let _path_guard = EnvVarGuard::set("STREAM_CONSOLE__SERVER__PORT", "9300");

        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILE),
            r#"{"server": {"port": 9000}}"#,
        )
        .unwrap();

        let config = ConfigLoader::with_dir(temp_dir.path()).load().unwrap();
        assert_eq!(config.server.port, 9300);
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let _lock = lock_env();
        let _guard = EnvVarGuard::set("STREAM_CONSOLE__CONSOLE__INBOUND_CAPACITY", "0");

        let temp_dir = TempDir::new().unwrap();
        let err = ConfigLoader::with_dir(temp_dir.path()).load().unwrap_err();
        assert!(err.to_string().contains("console.inbound_capacity"));
    }

    #[test]
    fn test_malformed_file_names_the_path() {
        let _lock = lock_env();
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("config.json"), "{ not json").unwrap();

        let err = ConfigLoader::with_dir(temp_dir.path()).load().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_unknown_env_key_is_rejected() {
        let _lock = lock_env();
        let _guard = EnvVarGuard::set("STREAM_CONSOLE__SERVER__NO_SUCH_KEY", "1");

        let temp_dir = TempDir::new().unwrap();
        let err = ConfigLoader::with_dir(temp_dir.path()).load().unwrap_err();
        assert!(matches!(err, crate::Error::Config(_)));
        assert!(err.to_string().contains("server.no_such_key"));
    }
}
