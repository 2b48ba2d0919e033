// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates room bindings and backend sections, provides defaults for optional ones
use crate::binding::{Binding, BindingsConfig};
use crate::message::ChannelType;
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// `[bindings.<logical room>] <backend> = "<backend room id>"`
    #[serde(default)]
    pub bindings: BindingsConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localstore: Option<LocalStoreConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

// ─── LocalStoreConfig ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
    /// Public URL prefix the directory is served under
    pub base_url: String,
}

fn default_store_path() -> String {
    paths::store_dir().to_string_lossy().to_string()
}

// ─── TelegramConfig ─────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Chat ids that receive operator failure reports
    #[serde(default)]
    pub admins: Vec<i64>,
    /// Whether to run a Telegram bridge; `false` keeps Telegram as the
    /// operator channel only
    #[serde(default = "default_true")]
    pub relay: bool,
}

// Custom Debug impl to redact bot_token
impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("admins", &self.admins)
            .field("relay", &self.relay)
            .finish()
    }
}

// ─── ConsoleConfig ──────────────────────────────────────────────

/// Line-based stdin/stdout backend, handy for local testing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Room id console lines are posted in
    #[serde(default = "default_console_room")]
    pub room: String,
    #[serde(default = "default_console_self_id")]
    pub self_id: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            room: default_console_room(),
            self_id: default_console_self_id(),
        }
    }
}

fn default_console_room() -> String {
    "console".to_string()
}

fn default_console_self_id() -> String {
    "shoal".to_string()
}

// ─── SupervisorConfig ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Upper bound on the operator notification before the process exits
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            notify_timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_notify_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

/// Expand tilde (~) to home directory in paths
/// Logs a warning if expansion fails and falls back to the original path
fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(base_dirs) = directories::BaseDirs::new() {
            return base_dirs
                .home_dir()
                .join(stripped)
                .to_string_lossy()
                .to_string();
        } else {
            tracing::warn!(
                path = %path,
                "Failed to expand tilde in path: could not determine home directory"
            );
        }
    }
    path.to_string()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. SHOAL_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/shoal/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("SHOAL_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration with environment variable overrides.
    /// Searches: SHOAL_CONFIG_PATH env var, ./config.toml, then ~/.config/shoal/config.toml
    pub fn load() -> Result<Self> {
        let config = if let Some(config_path) = Self::find_config_file() {
            Self::read_file(&config_path)?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config::default()
        };
        config.finish()
    }

    /// Load configuration from an explicit path, then apply overrides
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::read_file(path)?.finish()
    }

    fn read_file(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "Loading configuration from file");
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn finish(mut self) -> Result<Self> {
        self.apply_env_overrides()?;
        if let Some(ref mut store) = self.localstore {
            store.path = expand_tilde(&store.path);
        }
        self.validate()?;
        Ok(self)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(val) = std::env::var("TELEGRAM_BOT_TOKEN") {
            match self.telegram {
                Some(ref mut tg) => tg.bot_token = val,
                None => {
                    self.telegram = Some(TelegramConfig {
                        bot_token: val,
                        admins: Vec::new(),
                        relay: true,
                    })
                }
            }
        }
        if let Ok(val) = std::env::var("SHOAL_ADMINS") {
            let admins = val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<i64>()
                        .with_context(|| format!("SHOAL_ADMINS must be numeric chat ids, got: {}", s))
                })
                .collect::<Result<Vec<_>>>()?;
            if let Some(ref mut tg) = self.telegram {
                tg.admins = admins;
            } else {
                tracing::warn!("SHOAL_ADMINS set but Telegram is not configured; ignoring");
            }
        }
        if let Ok(val) = std::env::var("LOCALSTORE_BASE_URL") {
            match self.localstore {
                Some(ref mut store) => store.base_url = val,
                None => {
                    self.localstore = Some(LocalStoreConfig {
                        path: default_store_path(),
                        base_url: val,
                    })
                }
            }
        }
        if let Ok(val) = std::env::var("LOCALSTORE_PATH") {
            if let Some(ref mut store) = self.localstore {
                store.path = val;
            } else {
                tracing::warn!("LOCALSTORE_PATH set but LOCALSTORE_BASE_URL is missing; ignoring");
            }
        }
        Ok(())
    }

    /// Check the bindings table and backend sections for mistakes that would
    /// otherwise surface as silently dropped messages
    pub fn validate(&self) -> Result<()> {
        if self.bindings.is_empty() {
            anyhow::bail!("At least one [bindings.<room>] table is required");
        }
        for (room, backends) in &self.bindings {
            if backends.is_empty() {
                anyhow::bail!("Binding '{}' does not name any backend room", room);
            }
            for channel in backends.keys() {
                channel
                    .parse::<ChannelType>()
                    .with_context(|| format!("Invalid backend in binding '{}'", room))?;
            }
        }
        for channel in self.bound_channels() {
            Binding::for_channel(&self.bindings, channel)?;
        }

        if let Some(ref store) = self.localstore {
            if store.base_url.trim().is_empty() {
                anyhow::bail!("localstore.base_url is required (or LOCALSTORE_BASE_URL env var)");
            }
        }
        if let Some(ref tg) = self.telegram {
            if tg.bot_token.trim().is_empty() {
                anyhow::bail!("telegram.bot_token is required (or TELEGRAM_BOT_TOKEN env var)");
            }
        }
        Ok(())
    }

    /// Backends named anywhere in the bindings table, deduplicated
    pub fn bound_channels(&self) -> Vec<ChannelType> {
        let mut channels: Vec<ChannelType> = self
            .bindings
            .values()
            .flat_map(|backends| backends.keys())
            .filter_map(|key| key.parse().ok())
            .collect();
        channels.sort_by_key(|c| c.as_str());
        channels.dedup();
        channels
    }

    /// Room binding for one backend
    pub fn binding_for(&self, channel: ChannelType) -> Result<Binding> {
        Binding::for_channel(&self.bindings, channel)
    }

    /// Telegram chat ids that receive operator reports
    pub fn operator_recipients(&self) -> Vec<i64> {
        self.telegram
            .as_ref()
            .map(|tg| tg.admins.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        [bindings.generalChat]
        wechat = "wechatRoomA"
        telegram = "-100123"

        [bindings.lobby]
        console = "console"

        [localstore]
        path = "/srv/shoal/files"
        base_url = "https://files.example.com/"

        [telegram]
        bot_token = "123456:ABC-DEF"
        admins = [42, 43]

        [console]
        enabled = true

        [supervisor]
        notify_timeout_secs = 3
    "#;

    #[test]
    fn test_full_config_deserialize() {
        let config: Config = toml::from_str(FULL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.bindings.len(), 2);
        assert_eq!(config.localstore.as_ref().unwrap().path, "/srv/shoal/files");
        assert_eq!(config.operator_recipients(), vec![42, 43]);
        assert!(config.telegram.as_ref().unwrap().relay);
        assert!(config.console.enabled);
        assert_eq!(config.console.room, "console");
        assert_eq!(config.supervisor.notify_timeout_secs, 3);
    }

    #[test]
    fn test_defaults() {
        let config: Config = toml::from_str(
            r#"
            [bindings.lobby]
            console = "console"
            "#,
        )
        .unwrap();
        assert!(config.localstore.is_none());
        assert!(config.telegram.is_none());
        assert!(!config.console.enabled);
        assert_eq!(config.console.self_id, "shoal");
        assert_eq!(config.supervisor.notify_timeout_secs, 10);
        assert!(config.operator_recipients().is_empty());
    }

    #[test]
    fn test_bound_channels_deduplicated() {
        let config: Config = toml::from_str(FULL).unwrap();
        assert_eq!(
            config.bound_channels(),
            vec![ChannelType::Console, ChannelType::Telegram, ChannelType::Wechat]
        );
    }

    #[test]
    fn test_binding_for() {
        let config: Config = toml::from_str(FULL).unwrap();
        let tg = config.binding_for(ChannelType::Telegram).unwrap();
        assert_eq!(tg.logical_room("-100123"), Some("generalChat"));
    }

    #[test]
    fn test_validate_requires_bindings() {
        let err = Config::default().validate().unwrap_err();
        assert!(err.to_string().contains("bindings"));
    }

    #[test]
    fn test_validate_rejects_unknown_backend() {
        let config: Config = toml::from_str(
            r#"
            [bindings.lobby]
            discord = "123"
            "#,
        )
        .unwrap();
        let err = format!("{:#}", config.validate().unwrap_err());
        assert!(err.contains("Unknown channel type"));
    }

    #[test]
    fn test_validate_rejects_empty_binding() {
        let config: Config = toml::from_str("[bindings.lobby]\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_room_bound_twice() {
        let config: Config = toml::from_str(
            r#"
            [bindings.a]
            wechat = "same"
            [bindings.b]
            wechat = "same"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_base_url() {
        let config: Config = toml::from_str(
            r#"
            [bindings.lobby]
            console = "console"
            [localstore]
            base_url = " "
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_telegram_config_debug_redacts_token() {
        let config: Config = toml::from_str(FULL).unwrap();
        let debug = format!("{:?}", config.telegram.unwrap());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("ABC-DEF"));
    }

    #[test]
    fn test_expand_tilde_leaves_absolute_paths() {
        assert_eq!(expand_tilde("/var/lib/shoal"), "/var/lib/shoal");
    }
}
