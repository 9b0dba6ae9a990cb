//! Host redirection.
//!
//! A rule `a.com:80 -> b.com:8080` sends every request whose target resolves
//! to `a.com:80` to `b.com:8080` instead, rewriting both the target and the
//! `Host` header. Ports default to 80 on both sides.
//!
//! Rules are checked in declaration order and the first match wins, so the
//! outcome never depends on map iteration order.

use crate::config::{HostPort, RedirectRule, DEFAULT_HTTP_PORT};
use crate::http::headers::HOST;
use crate::http::HttpRequest;

/// The first rule whose source equals `authority`.
pub fn find_redirect<'a>(rules: &'a [RedirectRule], authority: &HostPort) -> Option<&'a RedirectRule> {
    rules.iter().find(|rule| rule.from == *authority)
}

/// Rewrite `request` according to the first matching rule.
pub fn apply_redirect<'a>(rules: &'a [RedirectRule], request: &mut HttpRequest) -> Option<&'a RedirectRule> {
    let authority = request.target.authority(DEFAULT_HTTP_PORT);
    let rule = find_redirect(rules, &authority)?;

    request.target.set_authority(&rule.to);
    request.headers.insert(HOST.to_string(), rule.to.to_string());
    Some(rule)
}
