//! Environment-driven configuration

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use bridge_core::gateway::{DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_STALE_AFTER};
use bridge_core::task::DEFAULT_HISTORY_CAPACITY;
use bridge_core::{BridgeError, TimeoutPolicy};
use thiserror::Error;

pub const DEFAULT_HTTP_PORT: u16 = 3055;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid timeout table: {0}")]
    Policy(#[from] BridgeError),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: IpAddr,
    /// REST API and plain WebSocket links
    pub http_port: u16,
    /// Socket.IO links; this is the port the plugin is told to use
    pub socket_port: u16,
    pub policy: TimeoutPolicy,
    pub history_capacity: usize,
    pub keepalive_interval: Duration,
    pub stale_after: Duration,
    pub cors: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: DEFAULT_HTTP_PORT,
            socket_port: bridge_core::coordinator::DEFAULT_SOCKET_PORT,
            policy: TimeoutPolicy::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            cors: true,
        }
    }
}

impl BridgeConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let default_timeout_ms = parse_var(&lookup, "BRIDGE_DEFAULT_TIMEOUT_MS", defaults.policy.default_ms)?;
        if default_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "BRIDGE_DEFAULT_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }
        let mut policy = defaults.policy.with_default_ms(default_timeout_ms);
        if let Some(path) = lookup("BRIDGE_TIMEOUTS_FILE").filter(|p| !p.trim().is_empty()) {
            let path = PathBuf::from(path.trim());
            let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            policy = policy.merge_json(&raw)?;
        }

        let keepalive_ms = parse_var(
            &lookup,
            "BRIDGE_KEEPALIVE_INTERVAL_MS",
            defaults.keepalive_interval.as_millis() as u64,
        )?;
        if keepalive_ms == 0 {
            return Err(ConfigError::InvalidValue {
                name: "BRIDGE_KEEPALIVE_INTERVAL_MS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            bind_addr: parse_var(&lookup, "BRIDGE_BIND_ADDR", defaults.bind_addr)?,
            http_port: parse_var(&lookup, "BRIDGE_HTTP_PORT", defaults.http_port)?,
            socket_port: parse_var(&lookup, "BRIDGE_SOCKET_PORT", defaults.socket_port)?,
            policy,
            history_capacity: parse_var(&lookup, "BRIDGE_HISTORY_CAPACITY", defaults.history_capacity)?,
            keepalive_interval: Duration::from_millis(keepalive_ms),
            stale_after: Duration::from_millis(parse_var(
                &lookup,
                "BRIDGE_STALE_AFTER_MS",
                defaults.stale_after.as_millis() as u64,
            )?),
            cors: flag_var(&lookup, "BRIDGE_CORS", defaults.cors),
        })
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port)
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.socket_port)
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        _ => Ok(default),
    }
}

fn flag_var<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        None => default,
    }
}
