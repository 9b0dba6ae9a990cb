//! Client and site block lists.
//!
//! # Design Decisions
//! - Client match is a plain string prefix on `ip:port`, so `10.0.0.` blocks
//!   a whole /24 and `1.2.3.4` blocks one address on every port
//! - Site match is exact and case-sensitive on the hostname, port stripped

use crate::config::BlockConfig;

/// The blocked-client prefix matching `peer`, if any.
pub fn blocked_client<'a>(block: &'a BlockConfig, peer: &str) -> Option<&'a str> {
    block
        .hosts
        .iter()
        .find(|prefix| peer.starts_with(prefix.as_str()))
        .map(String::as_str)
}

/// The blocked site equal to `hostname`, if any.
pub fn blocked_site<'a>(block: &'a BlockConfig, hostname: &str) -> Option<&'a str> {
    block
        .sites
        .iter()
        .find(|site| site.as_str() == hostname)
        .map(String::as_str)
}
