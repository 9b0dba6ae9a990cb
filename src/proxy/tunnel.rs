//! CONNECT tunnels.
//!
//! After the acknowledgement the proxy stops interpreting bytes: two spawned
//! tasks copy chunks client→origin and origin→client. Whichever direction
//! fails first tears down both connections, and the teardown signal unblocks
//! the other direction's pending read.

use std::sync::Arc;

use crate::http::{messages, HttpRequest, HttpResponse};
use crate::net::Connection;
use crate::observability::metrics;
use crate::proxy::upstream::Upstream;

/// Port assumed when a CONNECT target has none.
pub const DEFAULT_TUNNEL_PORT: u16 = 443;

/// Largest chunk moved per read.
pub const RELAY_CHUNK: usize = 8 * 1024;

/// Open a tunnel for `request` and relay until either side closes.
///
/// Returns the status sent to the client: 200 once the tunnel was
/// established, 502 if the origin could not be dialed.
pub async fn open(client: &Arc<Connection>, upstream: &Upstream, request: &HttpRequest) -> u16 {
    let authority = request.target.authority(DEFAULT_TUNNEL_PORT);
    let origin = match upstream.dial(&authority).await {
        Ok(origin) => origin,
        Err(e) => {
            tracing::warn!(connection_id = %client.id(), origin = %authority, error = %e, "Tunnel dial failed");
            let refusal = HttpResponse::plain_text(502, "Bad Gateway", messages::SERVER_UNAVAILABLE);
            let _ = client.write(&refusal.to_bytes()).await;
            return 502;
        }
    };

    if client
        .write(&HttpResponse::connection_established().to_bytes())
        .await
        .is_err()
    {
        origin.teardown().await;
        return 200;
    }
    tracing::info!(connection_id = %client.id(), origin = %authority, "Tunnel established");

    let upload = tokio::spawn(relay(Arc::clone(client), Arc::clone(&origin), "upload"));
    let download = tokio::spawn(relay(Arc::clone(&origin), Arc::clone(client), "download"));
    let (sent, received) = tokio::join!(upload, download);

    tracing::info!(
        connection_id = %client.id(),
        origin = %authority,
        bytes_sent = sent.unwrap_or_default(),
        bytes_received = received.unwrap_or_default(),
        "Tunnel closed"
    );
    200
}

/// Copy `from` into `to` until a read or write fails. Returns bytes copied.
async fn relay(from: Arc<Connection>, to: Arc<Connection>, direction: &'static str) -> u64 {
    let mut copied = 0u64;
    loop {
        let chunk = match from.read_chunk(RELAY_CHUNK).await {
            Ok(chunk) => chunk,
            Err(_) => break,
        };
        if to.write(&chunk).await.is_err() {
            break;
        }
        copied += chunk.len() as u64;
        metrics::record_tunnel_bytes(direction, chunk.len() as u64);
    }

    from.teardown().await;
    to.teardown().await;
    copied
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::http::RequestTarget;
    use crate::net::{ConnectionRole, Registry};

    fn connect_request(target: &str) -> HttpRequest {
        HttpRequest {
            method: "CONNECT".into(),
            target: RequestTarget::parse(target, "CONNECT").unwrap(),
            version: "HTTP/1.1".into(),
            headers: Default::default(),
            body: Vec::new(),
        }
    }

    #[tokio::test]
    async fn unreachable_target_gets_refusal_and_no_relay() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let registry = Registry::new();
        let (near, mut far) = tokio::io::duplex(4096);
        let client = Connection::new(near, "127.0.0.1:4000", ConnectionRole::Client, registry.clone());
        let upstream = Upstream::new(registry.clone(), Duration::from_millis(500), Duration::from_secs(5));

        let status = open(&client, &upstream, &connect_request(&format!("127.0.0.1:{}", port))).await;
        assert_eq!(status, 502);
        assert_eq!(registry.count_role(ConnectionRole::Origin), 0);

        client.teardown().await;
        let mut reply = String::new();
        far.read_to_string(&mut reply).await.unwrap();
        assert!(reply.ends_with("Server is unavailable"));
        assert!(!reply.contains("Connection established"));
    }

    #[tokio::test]
    async fn relays_both_directions_until_client_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            loop {
                let n = socket.read(&mut buf).await.unwrap_or(0);
                if n == 0 || socket.write_all(&buf[..n]).await.is_err() {
                    break;
                }
            }
        });

        let registry = Registry::new();
        let (near, mut far) = tokio::io::duplex(4096);
        let client = Connection::new(near, "127.0.0.1:4000", ConnectionRole::Client, registry.clone());
        let upstream = Upstream::new(registry.clone(), Duration::from_secs(2), Duration::from_secs(5));

        let request = connect_request(&addr.to_string());
        let tunnel = tokio::spawn(async move { open(&client, &upstream, &request).await });

        let ack = b"HTTP/1.1 200 Connection established\r\n\r\n";
        let mut head = vec![0u8; ack.len()];
        far.read_exact(&mut head).await.unwrap();
        assert_eq!(head, ack);

        far.write_all(b"\x16\x03\x01 opaque bytes").await.unwrap();
        let mut echoed = [0u8; 16];
        far.read_exact(&mut echoed).await.unwrap();
        assert_eq!(&echoed, b"\x16\x03\x01 opaque bytes");

        far.shutdown().await.unwrap();
        assert_eq!(tunnel.await.unwrap(), 200);
        assert!(registry.is_empty());
    }
}
