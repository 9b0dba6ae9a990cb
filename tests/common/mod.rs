//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forward_proxy::cache::ResponseCache;
use forward_proxy::config::ProxyConfig;
use forward_proxy::lifecycle::Shutdown;
use forward_proxy::net::{Listener, ListenerError, Registry};
use forward_proxy::ProxyServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A request as an origin saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub head: String,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key == name).then(|| value.trim_start())
        })
    }
}

pub type Requests = Arc<Mutex<Vec<Recorded>>>;

/// Start an origin that answers every request with `respond(request)` and closes.
pub async fn start_origin<F>(respond: F) -> (SocketAddr, Requests)
where
    F: Fn(&Recorded) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests: Requests = Arc::default();
    let seen = requests.clone();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let seen = seen.clone();
            let respond = respond.clone();
            tokio::spawn(async move {
                let Some(request) = read_request(&mut socket).await else {
                    return;
                };
                let reply = respond(&request);
                seen.lock().unwrap().push(request);
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    (addr, requests)
}

/// Start an origin that always returns `body` with status 200.
pub async fn start_static_origin(body: &'static str) -> (SocketAddr, Requests) {
    start_origin(move |_| ok_response(body, &[])).await
}

/// Start a TCP server that echoes every byte back.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    addr
}

/// An address nothing is listening on.
pub fn closed_port_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn ok_response(body: &str, extra_headers: &[(&str, &str)]) -> String {
    let mut out = format!("HTTP/1.0 200 OK\r\nContent-Length: {}\r\n", body.len());
    for (key, value) in extra_headers {
        out.push_str(&format!("{}: {}\r\n", key, value));
    }
    out.push_str("\r\n");
    out.push_str(body);
    out
}

async fn read_request(socket: &mut TcpStream) -> Option<Recorded> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    while !buf.ends_with(b"\r\n\r\n") {
        if socket.read(&mut byte).await.ok()? == 0 {
            return None;
        }
        buf.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&buf[..buf.len() - 4]).into_owned();
    let length = head
        .lines()
        .find_map(|line| line.strip_prefix("Content-Length:"))
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; length];
    socket.read_exact(&mut body).await.ok()?;
    Some(Recorded { head, body })
}

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub cache: ResponseCache,
    pub registry: Registry,
    pub config_updates: mpsc::UnboundedSender<ProxyConfig>,
    shutdown: Shutdown,
    task: JoinHandle<Result<(), ListenerError>>,
}

impl TestProxy {
    pub async fn stop(self) {
        self.shutdown.trigger();
        self.task.await.unwrap().unwrap();
    }
}

/// Config with short timeouts suitable for tests.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.timeouts.connect_secs = 2;
    config.timeouts.shutdown_grace_secs = 1;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = Listener::new(TcpListener::bind("127.0.0.1:0").await.unwrap(), 64);
    let addr = listener.local_addr().unwrap();

    let server = ProxyServer::new(config);
    let cache = server.cache().clone();
    let registry = server.registry().clone();

    let shutdown = Shutdown::new();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(server.run(listener, updates_rx, shutdown.subscribe()));

    TestProxy {
        addr,
        cache,
        registry,
        config_updates,
        shutdown,
        task,
    }
}

/// Write `request` to the proxy and read until it closes the connection.
pub async fn send_raw(proxy: SocketAddr, request: &[u8]) -> String {
    let mut socket = TcpStream::connect(proxy).await.unwrap();
    socket.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), socket.read_to_end(&mut reply))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    String::from_utf8_lossy(&reply).into_owned()
}

/// Split a reply into status line, sorted header lines and body.
pub fn split_reply(reply: &str) -> (String, Vec<String>, String) {
    let (head, body) = reply.split_once("\r\n\r\n").unwrap_or((reply, ""));
    let mut lines = head.split("\r\n").map(str::to_string);
    let status = lines.next().unwrap_or_default();
    let mut headers: Vec<String> = lines.collect();
    headers.sort();
    (status, headers, body.to_string())
}
