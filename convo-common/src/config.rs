//! Configuration management for Convo services.
//!
//! All services share one configuration file at `~/.convo/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (CONVO_* prefix, plus WhatsApp credentials)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `CONVO_CHANNELS_PORT` → network.port
//! - `CONVO_BIND_ADDRESS` → network.bind
//! - `CONVO_LOG_LEVEL` → observability.log_level
//! - `CONVO_REDIS_URL` → store.redis.url (and store.backend = redis)
//! - `CONVO_SESSION_TIMEOUT_MS` → session.timeout_ms
//! - `WHATSAPP_ACCESS_TOKEN` → channels.whatsapp.access_token
//! - `WHATSAPP_APP_SECRET` → channels.whatsapp.app_secret

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".convo"),
        |dirs| dirs.home_dir().join(".convo"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Network Configuration
// ============================================================================

/// Bind address and port for the webhook server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Bind address. Default "127.0.0.1" (local only).
    #[serde(default = "default_bind_address")]
    pub bind: String,

    /// HTTP port for webhooks.
    #[serde(default = "default_channels_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: default_bind_address(),
            port: default_channels_port(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_channels_port() -> u16 {
    4431
}

// ============================================================================
// Session Configuration
// ============================================================================

/// Session lifetime and expiry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sliding TTL applied to every session write, in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,

    /// Inactivity threshold after which a session is cleared, in milliseconds.
    #[serde(default = "default_session_timeout_ms")]
    pub timeout_ms: u64,

    /// Namespace prepended to participant ids to form store keys.
    #[serde(default = "default_session_key_prefix")]
    pub key_prefix: String,

    /// Interval between sweeps of the in-memory fallback tier, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
            timeout_ms: default_session_timeout_ms(),
            key_prefix: default_session_key_prefix(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

/// Must exceed the inactivity threshold: an idle record has to survive in
/// the primary until the timeout check reads it.
fn default_session_ttl_secs() -> u64 {
    900
}

fn default_session_timeout_ms() -> u64 {
    600_000
}

fn default_session_key_prefix() -> String {
    "session:".into()
}

fn default_sweep_interval_secs() -> u64 {
    60
}

// ============================================================================
// Store Configuration
// ============================================================================

/// Primary store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store (single instance, development and tests).
    #[default]
    Memory,
    /// Redis with TTL-based expiry.
    Redis,
}

/// Session store configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Which backend serves as the primary tier.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis settings (used when backend is redis).
    #[serde(default)]
    pub redis: RedisStoreConfig,
}

/// Redis connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisStoreConfig {
    /// Redis URL (redis://host:port/db).
    #[serde(default)]
    pub url: Option<String>,

    /// Per-command timeout in milliseconds.
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,

    /// Initial connection timeout in seconds.
    #[serde(default = "default_redis_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_ms: default_redis_timeout_ms(),
            connect_timeout_secs: default_redis_connect_timeout_secs(),
        }
    }
}

fn default_redis_timeout_ms() -> u64 {
    500
}

fn default_redis_connect_timeout_secs() -> u64 {
    5
}

// ============================================================================
// Deferred Task Configuration
// ============================================================================

/// Background execution settings for slow handler work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredConfig {
    /// Delay before a scheduled task starts, in milliseconds.
    #[serde(default = "default_deferred_delay_ms")]
    pub delay_ms: u64,

    /// Capacity of the task queue.
    #[serde(default = "default_deferred_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_deferred_delay_ms(),
            queue_capacity: default_deferred_queue_capacity(),
        }
    }
}

fn default_deferred_delay_ms() -> u64 {
    250
}

fn default_deferred_queue_capacity() -> usize {
    256
}

// ============================================================================
// Channels Configuration
// ============================================================================

/// Messaging channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    /// WhatsApp Business Cloud API configuration
    #[serde(default)]
    pub whatsapp: Option<WhatsAppConfig>,
}

/// WhatsApp channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    /// WhatsApp Business API phone number ID
    pub phone_number_id: String,
    /// WhatsApp Business API access token
    pub access_token: String,
    /// Webhook verify token
    #[serde(default)]
    pub verify_token: Option<String>,
    /// App secret for X-Hub-Signature-256 verification
    #[serde(default)]
    pub app_secret: Option<String>,
    /// Allowed phone numbers (E.164 format). Use "*" to allow everyone.
    #[serde(default = "default_allowed_numbers")]
    pub allowed_numbers: Vec<String>,
    /// Graph API base URL
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base: String,
}

fn default_allowed_numbers() -> Vec<String> {
    vec!["*".into()]
}

fn default_whatsapp_api_base() -> String {
    "https://graph.facebook.com/v18.0".into()
}

// ============================================================================
// Providers Configuration
// ============================================================================

/// Catalog, payment, and enrollment backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Base URL of the providers API
    #[serde(default = "default_providers_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_providers_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            endpoint: default_providers_endpoint(),
            timeout_secs: default_providers_timeout_secs(),
        }
    }
}

fn default_providers_endpoint() -> String {
    "http://127.0.0.1:4400/api/v1".into()
}

fn default_providers_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration shared by all Convo services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub deferred: DeferredConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("CONVO_CHANNELS_PORT") {
            if let Ok(p) = port.parse() {
                self.network.port = p;
            }
        }

        if let Some(bind) = lookup("CONVO_BIND_ADDRESS") {
            self.network.bind = bind;
        }

        if let Some(level) = lookup("CONVO_LOG_LEVEL") {
            self.observability.log_level = level;
        }

        if let Some(url) = lookup("CONVO_REDIS_URL") {
            self.store.backend = StoreBackend::Redis;
            self.store.redis.url = Some(url);
        }

        if let Some(timeout) = lookup("CONVO_SESSION_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse() {
                self.session.timeout_ms = ms;
            }
        }

        if let Some(whatsapp) = self.channels.whatsapp.as_mut() {
            if let Some(token) = lookup("WHATSAPP_ACCESS_TOKEN") {
                whatsapp.access_token = token;
            }
            if let Some(secret) = lookup("WHATSAPP_APP_SECRET") {
                whatsapp.app_secret = Some(secret);
            }
        }
    }

    /// Socket address string for the webhook server.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.port, 4431);
        assert_eq!(config.session.ttl_secs, 900);
        assert_eq!(config.session.timeout_ms, 600_000);
        assert_eq!(config.session.key_prefix, "session:");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.deferred.delay_ms, 250);
        assert!(config.channels.whatsapp.is_none());
        assert_eq!(config.bind_addr(), "127.0.0.1:4431");
    }

    #[test]
    fn test_load_from_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "session": {{ "timeout_ms": 1000 }},
                "store": {{ "backend": "redis", "redis": {{ "url": "redis://10.0.0.1:6379" }} }},
                "channels": {{
                    "whatsapp": {{
                        "enabled": true,
                        "phone_number_id": "123",
                        "access_token": "tok"
                    }}
                }}
            }}"#
        )
        .unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.session.timeout_ms, 1000);
        assert_eq!(config.session.ttl_secs, 900);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis.url.as_deref(), Some("redis://10.0.0.1:6379"));
        assert_eq!(config.store.redis.timeout_ms, 500);

        let whatsapp = config.channels.whatsapp.unwrap();
        assert_eq!(whatsapp.allowed_numbers, vec!["*".to_string()]);
        assert_eq!(whatsapp.api_base, "https://graph.facebook.com/v18.0");
    }

    #[test]
    fn test_load_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CONVO_CHANNELS_PORT", "8080"),
            ("CONVO_REDIS_URL", "redis://cache:6379"),
            ("CONVO_SESSION_TIMEOUT_MS", "5000"),
            ("WHATSAPP_APP_SECRET", "shh"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.channels.whatsapp = Some(WhatsAppConfig {
            enabled: true,
            phone_number_id: "123".into(),
            access_token: "tok".into(),
            verify_token: None,
            app_secret: None,
            allowed_numbers: vec!["*".into()],
            api_base: default_whatsapp_api_base(),
        });
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.network.port, 8080);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.session.timeout_ms, 5000);
        assert_eq!(
            config.channels.whatsapp.unwrap().app_secret.as_deref(),
            Some("shh")
        );
    }

    #[test]
    fn test_env_override_ignores_bad_port() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "CONVO_CHANNELS_PORT").then(|| "nope".to_string()));
        assert_eq!(config.network.port, 4431);
    }
}
