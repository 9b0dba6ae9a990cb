//! Origin server access.
//!
//! Every origin leg is an ordinary [`Connection`] registered in the shared
//! registry; one connection carries exactly one request/response exchange,
//! bounded by the request timeout.

use std::sync::Arc;
use std::time::Duration;

use crate::config::HostPort;
use crate::http::{CodecError, HttpRequest, HttpResponse};
use crate::net::{Connection, ConnectionError, Registry};

/// Version written on every forwarded request.
pub const OUTBOUND_VERSION: &str = "HTTP/1.0";

/// Dials origins and performs single exchanges.
#[derive(Debug, Clone)]
pub struct Upstream {
    registry: Registry,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl Upstream {
    pub fn new(registry: Registry, connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            registry,
            connect_timeout,
            request_timeout,
        }
    }

    /// Open a connection to `authority`.
    pub async fn dial(&self, authority: &HostPort) -> Result<Arc<Connection>, ConnectionError> {
        Connection::dial(
            &authority.host,
            authority.port,
            self.connect_timeout,
            self.registry.clone(),
        )
        .await
    }

    /// Send `request` on `origin` and parse the reply.
    ///
    /// An origin that has not answered completely within the request timeout
    /// is torn down and reported as [`CodecError::Timeout`].
    pub async fn exchange(&self, origin: &Connection, request: &HttpRequest) -> Result<HttpResponse, CodecError> {
        // Bound to a local so the timed-out exchange, and any lock it holds,
        // is dropped before teardown.
        let outcome = tokio::time::timeout(self.request_timeout, send_and_read(origin, request)).await;
        match outcome {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    connection_id = %origin.id(),
                    peer = origin.peer(),
                    timeout_secs = self.request_timeout.as_secs(),
                    "Origin response timed out"
                );
                origin.teardown().await;
                Err(CodecError::Timeout(self.request_timeout))
            }
        }
    }
}

async fn send_and_read(origin: &Connection, request: &HttpRequest) -> Result<HttpResponse, CodecError> {
    origin.write(&request.to_bytes()).await?;
    HttpResponse::read_from(origin, &request.method).await
}

/// Downgrade to HTTP/1.0 so the origin answers without chunking or keep-alive.
pub fn force_http10(request: &mut HttpRequest) {
    request.version = OUTBOUND_VERSION.to_string();
}
