//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid)
//! - Reject block entries that would match everything
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("proxy.lhost {0:?} is not an IPv4 address")]
    InvalidListenHost(String),
    #[error("proxy.lport must be non-zero")]
    ZeroListenPort,
    #[error("proxy.max_connections must be non-zero")]
    ZeroMaxConnections,
    #[error("timeouts.connect_secs must be non-zero")]
    ZeroConnectTimeout,
    #[error("timeouts.request_secs must be non-zero")]
    ZeroRequestTimeout,
    #[error("timeouts.idle_secs must be non-zero")]
    ZeroIdleTimeout,
    #[error("block.{0} contains an empty entry")]
    EmptyBlockEntry(&'static str),
    #[error("observability.metrics_address {0:?} is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.proxy.lhost.parse::<Ipv4Addr>().is_err() {
        errors.push(ValidationError::InvalidListenHost(config.proxy.lhost.clone()));
    }
    if config.proxy.lport == 0 {
        errors.push(ValidationError::ZeroListenPort);
    }
    if config.proxy.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroConnectTimeout);
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::ZeroIdleTimeout);
    }
    // An empty prefix would block every client.
    if config.block.hosts.iter().any(|h| h.is_empty()) {
        errors.push(ValidationError::EmptyBlockEntry("hosts"));
    }
    if config.block.sites.iter().any(|s| s.is_empty()) {
        errors.push(ValidationError::EmptyBlockEntry("sites"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
