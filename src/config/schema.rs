//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files; the
//! field names follow the JSON document the proxy has always read
//! (`proxy.lhost`, `block.hosts`, `redirect`, `cache`).

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port assumed when a host has none.
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listen address and admission cap.
    pub proxy: ListenerConfig,

    /// Client and site block lists.
    pub block: BlockConfig,

    /// Host redirection table, in declaration order.
    #[serde(with = "redirect_table")]
    pub redirect: Vec<RedirectRule>,

    /// Serve and revalidate cached responses.
    pub cache: bool,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Configuration reload settings.
    pub reload: ReloadConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// IPv4 address to bind.
    pub lhost: String,

    /// Port to bind.
    pub lport: u16,

    /// Maximum concurrent client connections (backpressure).
    pub max_connections: usize,
}

impl ListenerConfig {
    /// `lhost:lport`, ready for parsing as a socket address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.lhost, self.lport)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            lhost: "127.0.0.1".to_string(),
            lport: 8080,
            max_connections: 1024,
        }
    }
}

/// Block lists.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BlockConfig {
    /// Client address prefixes (matched against `ip:port`).
    pub hosts: Vec<String>,

    /// Exact hostnames that may not be proxied.
    pub sites: Vec<String>,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Origin connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Deadline for one origin exchange: writing the request and reading the
    /// full response.
    pub request_secs: u64,

    /// How long a client may take to deliver its complete request.
    pub idle_secs: u64,

    /// How long shutdown waits for open connections to finish.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            idle_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

/// Configuration reload settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Reload when the file changes on disk.
    pub watch: bool,

    /// Also reload on a fixed timer (0 disables it).
    pub interval_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            watch: true,
            interval_secs: 0,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostPortError {
    #[error("empty host in {0:?}")]
    EmptyHost(String),
    #[error("invalid port in {0:?}")]
    InvalidPort(String),
}

/// A `host[:port]` pair; the port defaults to 80.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl FromStr for HostPort {
    type Err = HostPortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = match s.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| HostPortError::InvalidPort(s.to_string()))?;
                (host, port)
            }
            None => (s, DEFAULT_HTTP_PORT),
        };
        if host.is_empty() {
            return Err(HostPortError::EmptyHost(s.to_string()));
        }
        Ok(Self::new(host, port))
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One redirect table entry: requests for `from` are sent to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectRule {
    pub from: HostPort,
    pub to: HostPort,
}

/// Serde adapter keeping the redirect object's document order.
mod redirect_table {
    use std::fmt;

    use serde::de::{self, MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    use super::RedirectRule;

    pub fn serialize<S: Serializer>(rules: &[RedirectRule], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(rules.len()))?;
        for rule in rules {
            map.serialize_entry(&rule.from.to_string(), &rule.to.to_string())?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<RedirectRule>, D::Error> {
        struct TableVisitor;

        impl<'de> Visitor<'de> for TableVisitor {
            type Value = Vec<RedirectRule>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of \"host:port\" to \"host:port\"")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut rules = Vec::new();
                while let Some((from, to)) = access.next_entry::<String, String>()? {
                    rules.push(RedirectRule {
                        from: from.parse().map_err(de::Error::custom)?,
                        to: to.parse().map_err(de::Error::custom)?,
                    });
                }
                Ok(rules)
            }
        }

        deserializer.deserialize_map(TableVisitor)
    }
}
