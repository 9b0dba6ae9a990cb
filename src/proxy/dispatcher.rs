//! Per-connection request pipeline.
//!
//! # Stages
//! ```text
//! Accepted → (client filter) → Parsing → (site filter) → Filtered
//!     → Redirected → Tunneling | CacheCheck → Forwarding
//!     → Responded → Closed
//!
//! Rejected is reachable from the client filter, a parse failure or the
//! site filter, and goes straight to Responded.
//! ```
//!
//! # Design Decisions
//! - Stages are plain sequential calls; no trait objects
//! - One configuration snapshot per connection
//! - Every path ends in client teardown
//! - Reading the request is bounded by `timeouts.idle_secs`; an origin
//!   exchange by `timeouts.request_secs`

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::cache::{cachable, serve_from_cache, CacheOutcome, ResponseCache};
use crate::config::{ProxyConfig, DEFAULT_HTTP_PORT};
use crate::http::{messages, CodecError, HttpRequest, HttpResponse};
use crate::net::Connection;
use crate::observability::metrics;
use crate::policy::{apply_redirect, blocked_client, blocked_site};
use crate::proxy::tunnel;
use crate::proxy::upstream::{force_http10, Upstream};

/// Where a connection is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Accepted,
    Parsing,
    Rejected,
    Filtered,
    Redirected,
    Tunneling,
    CacheCheck,
    Forwarding,
    Responded,
    Closed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Accepted => "accepted",
            Stage::Parsing => "parsing",
            Stage::Rejected => "rejected",
            Stage::Filtered => "filtered",
            Stage::Redirected => "redirected",
            Stage::Tunneling => "tunneling",
            Stage::CacheCheck => "cache_check",
            Stage::Forwarding => "forwarding",
            Stage::Responded => "responded",
            Stage::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Drives one client connection from accept to teardown.
pub struct Dispatcher {
    client: Arc<Connection>,
    config: Arc<ProxyConfig>,
    cache: ResponseCache,
    upstream: Upstream,
    stage: Stage,
}

impl Dispatcher {
    pub fn new(client: Arc<Connection>, config: Arc<ProxyConfig>, cache: ResponseCache, upstream: Upstream) -> Self {
        Self {
            client,
            config,
            cache,
            upstream,
            stage: Stage::Accepted,
        }
    }

    /// Run the pipeline to completion. The client connection is closed on return.
    pub async fn run(mut self) {
        tracing::info!(connection_id = %self.client.id(), peer = self.client.peer(), "Client connected");
        let config = Arc::clone(&self.config);

        if let Some(prefix) = blocked_client(&config.block, self.client.peer()) {
            tracing::info!(peer = self.client.peer(), prefix, "Client blocked");
            metrics::record_policy_rejection("client_blocked");
            self.reject(403, "Forbidden", messages::CLIENT_BLOCKED).await;
            return self.close().await;
        }

        self.advance(Stage::Parsing);
        let start = Instant::now();
        let idle = config.timeouts.idle();
        let parsed = match tokio::time::timeout(idle, HttpRequest::read_from(&self.client)).await {
            Ok(parsed) => parsed,
            Err(_) => Err(CodecError::Timeout(idle)),
        };
        let mut request = match parsed {
            Ok(request) => request,
            Err(e) => {
                self.parse_failed(e).await;
                return self.close().await;
            }
        };
        tracing::info!(
            connection_id = %self.client.id(),
            method = %request.method,
            target_uri = request.target.raw(),
            "Request parsed"
        );

        if let Some(site) = blocked_site(&config.block, &request.target.host) {
            tracing::info!(connection_id = %self.client.id(), site, "Site blocked");
            metrics::record_policy_rejection("site_blocked");
            self.reject(403, "Forbidden", messages::SITE_BLOCKED).await;
            return self.close().await;
        }
        self.advance(Stage::Filtered);

        if let Some(rule) = apply_redirect(&config.redirect, &mut request) {
            tracing::info!(
                connection_id = %self.client.id(),
                from = %rule.from,
                to = %rule.to,
                "Request redirected"
            );
        }
        self.advance(Stage::Redirected);

        if request.is_connect() {
            self.advance(Stage::Tunneling);
            let status = tunnel::open(&self.client, &self.upstream, &request).await;
            self.advance(Stage::Responded);
            metrics::record_request("CONNECT", status, start);
            return self.close().await;
        }

        let (status, method) = self.respond(request).await;
        metrics::record_request(method, status, start);
        self.close().await;
    }

    /// Cache check then forward. Returns the status sent and the method.
    async fn respond(&mut self, request: HttpRequest) -> (u16, &'static str) {
        let method = method_label(&request.method);

        if self.config.cache && cachable(&request) {
            self.advance(Stage::CacheCheck);
            match serve_from_cache(&self.cache, &self.upstream, &request).await {
                CacheOutcome::NotModified(response) | CacheOutcome::Refreshed(response) => {
                    self.send(&response).await;
                    return (response.status, method);
                }
                CacheOutcome::Failed(_) => {
                    self.reject(502, "Bad Gateway", messages::SERVER_UNAVAILABLE).await;
                    return (502, method);
                }
                CacheOutcome::Miss | CacheOutcome::Unreachable => {}
            }
        }

        self.advance(Stage::Forwarding);
        match self.forward(&request).await {
            Some(response) => {
                self.send(&response).await;
                if self.config.cache && cachable(&request) {
                    self.cache.put(request.target.raw(), response.clone());
                }
                (response.status, method)
            }
            None => {
                self.reject(502, "Bad Gateway", messages::SERVER_UNAVAILABLE).await;
                (502, method)
            }
        }
    }

    /// One HTTP/1.0 exchange with the origin named by the (possibly redirected) target.
    async fn forward(&self, request: &HttpRequest) -> Option<HttpResponse> {
        let mut outbound = request.clone();
        force_http10(&mut outbound);

        let authority = outbound.target.authority(DEFAULT_HTTP_PORT);
        let origin = match self.upstream.dial(&authority).await {
            Ok(origin) => origin,
            Err(e) => {
                tracing::warn!(connection_id = %self.client.id(), origin = %authority, error = %e, "Origin unreachable");
                return None;
            }
        };

        let result = self.upstream.exchange(&origin, &outbound).await;
        origin.teardown().await;
        match result {
            Ok(response) => {
                tracing::info!(
                    connection_id = %self.client.id(),
                    origin = %authority,
                    status = response.status,
                    body_bytes = response.body.len(),
                    "Forwarded"
                );
                Some(response)
            }
            Err(e) => {
                tracing::warn!(connection_id = %self.client.id(), origin = %authority, error = %e, "Forward failed");
                None
            }
        }
    }

    async fn parse_failed(&mut self, error: CodecError) {
        if let CodecError::Timeout(after) = &error {
            tracing::info!(
                connection_id = %self.client.id(),
                timeout_secs = after.as_secs(),
                "Client sent no complete request in time"
            );
            metrics::record_policy_rejection("client_timeout");
            return;
        }
        match error.client_message() {
            Some(message) => {
                tracing::info!(connection_id = %self.client.id(), error = %error, "Rejecting malformed request");
                metrics::record_policy_rejection("invalid_request");
                self.reject(400, "Bad Request", message).await;
            }
            None => {
                tracing::debug!(connection_id = %self.client.id(), error = %error, "Client went away before a request");
            }
        }
    }

    async fn reject(&mut self, status: u16, reason: &str, message: &str) {
        self.advance(Stage::Rejected);
        self.send(&HttpResponse::plain_text(status, reason, message)).await;
    }

    async fn send(&mut self, response: &HttpResponse) {
        if let Err(e) = self.client.write(&response.to_bytes()).await {
            tracing::debug!(connection_id = %self.client.id(), error = %e, "Client write failed");
        }
        self.advance(Stage::Responded);
    }

    async fn close(mut self) {
        self.client.teardown().await;
        self.advance(Stage::Closed);
    }

    fn advance(&mut self, next: Stage) {
        tracing::trace!(connection_id = %self.client.id(), from = %self.stage, to = %next, "Stage");
        self.stage = next;
    }
}

/// Bounded label set for request metrics.
fn method_label(method: &str) -> &'static str {
    match method {
        "GET" => "GET",
        "HEAD" => "HEAD",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "OPTIONS" => "OPTIONS",
        "PATCH" => "PATCH",
        "CONNECT" => "CONNECT",
        _ => "OTHER",
    }
}
