//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Channels listed here seed the in-memory backend used by the gateway binary.

use crate::msg::Channel;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Outgoing send settings.
    #[serde(default)]
    pub send: SendConfig,

    /// Configured channels (uuid, type code, sending address, provider settings).
    #[serde(default)]
    pub channels: Vec<Channel>,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendConfig {
    /// Per provider call timeout in seconds (default 30). Overridden by RELAY_SEND_TIMEOUT_SECS.
    #[serde(default = "default_send_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_send_timeout_secs() -> u64 {
    30
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_send_timeout_secs(),
        }
    }
}

/// Resolve the send timeout: env RELAY_SEND_TIMEOUT_SECS overrides config.
pub fn resolve_send_timeout(config: &Config) -> Duration {
    send_timeout_from(std::env::var("RELAY_SEND_TIMEOUT_SECS").ok(), config)
}

fn send_timeout_from(env: Option<String>, config: &Config) -> Duration {
    let secs = env
        .and_then(|s| match s.trim().parse::<u64>() {
            Ok(n) if n > 0 => Some(n),
            _ => {
                log::warn!("ignoring invalid RELAY_SEND_TIMEOUT_SECS '{}'", s);
                None
            }
        })
        .unwrap_or(config.send.timeout_secs);
    Duration::from_secs(secs.max(1))
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::home_dir()
            .map(|h| h.join(".relay").join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    })
}

/// Load config from the given path, the default path, or RELAY_CONFIG_PATH. Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
