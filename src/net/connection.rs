//! Duplex byte connection with serialized reads and writes.
//!
//! # Responsibilities
//! - Own one socket (client-facing or origin) split into read and write halves
//! - Serialize reads and writes independently, so a tunnel can read and write
//!   the same connection from two tasks
//! - Provide delimiter, exact-size, chunk and deadline read primitives
//! - Tear down exactly once and unblock every in-flight operation
//!
//! # Design Decisions
//! - Locks never leave this module; callers only see `read_*` and `write`
//! - Delimiter reads go byte by byte so nothing past the delimiter is consumed
//! - Every fatal I/O error converges on [`Connection::teardown`]

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};

use crate::net::registry::Registry;
use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Chunk size used by bulk reads.
const BULK_READ_SIZE: usize = 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Which side of the proxy a connection faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Accepted from a proxy client.
    Client,
    /// Dialed to an origin server.
    Origin,
}

impl ConnectionRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionRole::Client => "client",
            ConnectionRole::Origin => "origin",
        }
    }
}

/// Errors surfaced by connection operations.
///
/// Every variant except `Dial` means the connection has been torn down.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("connection already closed")]
    Closed,

    #[error("i/o error after {} bytes: {source}", partial.len())]
    Io {
        /// Bytes accumulated before the failure.
        partial: Vec<u8>,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Bytes read before the failure, if any.
    pub fn partial(&self) -> &[u8] {
        match self {
            ConnectionError::Io { partial, .. } => partial,
            _ => &[],
        }
    }
}

/// A duplex byte stream shared between the tasks that serve it.
///
/// Always handled through `Arc<Connection>`. Creating one registers it with
/// the [`Registry`]; [`teardown`](Connection::teardown) or dropping the last
/// handle removes it again.
pub struct Connection {
    id: ConnectionId,
    peer: String,
    role: ConnectionRole,
    reader: Mutex<Option<BoxedReader>>,
    writer: Mutex<Option<BoxedWriter>>,
    /// `true` once teardown has started.
    closed: watch::Sender<bool>,
    registry: Registry,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Wrap a stream and register it.
    pub fn new<S>(stream: S, peer: impl Into<String>, role: ConnectionRole, registry: Registry) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);
        let conn = Arc::new(Self {
            id: ConnectionId::new(),
            peer: peer.into(),
            role,
            reader: Mutex::new(Some(Box::new(read_half))),
            writer: Mutex::new(Some(Box::new(write_half))),
            closed,
            registry,
        });

        conn.registry.register(conn.id, &conn.peer, role);
        metrics::record_connection_opened(role.as_str());
        tracing::debug!(
            connection_id = %conn.id,
            peer = %conn.peer,
            role = role.as_str(),
            "Connection opened"
        );
        conn
    }

    /// Open an origin connection, bounded by `timeout`.
    pub async fn dial(
        host: &str,
        port: u16,
        timeout: Duration,
        registry: Registry,
    ) -> Result<Arc<Self>, ConnectionError> {
        let addr = format!("{}:{}", host, port);
        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ConnectionError::Dial { addr, source }),
            Err(_) => {
                return Err(ConnectionError::Dial {
                    addr,
                    source: io::ErrorKind::TimedOut.into(),
                })
            }
        };
        // Nagle only delays small relay chunks.
        let _ = stream.set_nodelay(true);
        Ok(Self::new(stream, addr, ConnectionRole::Origin, registry))
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address as a string (`ip:port` for accepted sockets).
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn role(&self) -> ConnectionRole {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Read until the buffer ends with `token`, returning it including `token`.
    ///
    /// Reads one byte at a time so no input past the delimiter is consumed.
    /// Accumulating `limit` bytes without seeing `token` counts as an I/O
    /// error.
    pub async fn read_until(&self, token: &[u8], limit: usize) -> Result<Vec<u8>, ConnectionError> {
        let mut buf = Vec::new();
        if token.is_empty() {
            return Ok(buf);
        }

        let outcome = {
            let mut guard = self.reader.lock().await;
            let Some(reader) = guard.as_mut() else {
                return Err(ConnectionError::Closed);
            };
            self.until_closed(fill_until(reader, &mut buf, token, limit)).await
        };

        self.finish_read(outcome, buf).await
    }

    /// Like [`read_until`](Self::read_until) with the trailing `token` stripped.
    pub async fn read_until_clean(&self, token: &[u8], limit: usize) -> Result<Vec<u8>, ConnectionError> {
        let mut buf = self.read_until(token, limit).await?;
        buf.truncate(buf.len() - token.len());
        Ok(buf)
    }

    /// Read exactly `n` bytes.
    pub async fn read_exact(&self, n: usize) -> Result<Vec<u8>, ConnectionError> {
        let mut buf = Vec::with_capacity(n.min(64 * 1024));

        let outcome = {
            let mut guard = self.reader.lock().await;
            let Some(reader) = guard.as_mut() else {
                return Err(ConnectionError::Closed);
            };
            self.until_closed(fill_exact(reader, &mut buf, n)).await
        };

        self.finish_read(outcome, buf).await
    }

    /// Perform a single read of at most `max` bytes.
    ///
    /// End of stream is reported as an error, like any other read failure.
    pub async fn read_chunk(&self, max: usize) -> Result<Vec<u8>, ConnectionError> {
        let mut buf = vec![0u8; max.max(1)];

        let outcome = {
            let mut guard = self.reader.lock().await;
            let Some(reader) = guard.as_mut() else {
                return Err(ConnectionError::Closed);
            };
            self.until_closed(async {
                match reader.read(&mut buf).await? {
                    0 => Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                    n => Ok(n),
                }
            })
            .await
        };

        match outcome {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(source) => self.finish_read(Err(source), Vec::new()).await,
        }
    }

    /// Bulk-read until the deadline passes or the stream fails.
    ///
    /// Returns `(bytes, true)` when the deadline expired; the connection stays
    /// open. Any other stop (error, end of stream, teardown) tears the
    /// connection down and returns `(bytes, false)`.
    pub async fn read_with_deadline(&self, timeout: Duration) -> (Vec<u8>, bool) {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut buf = Vec::new();

        let timed_out = {
            let mut guard = self.reader.lock().await;
            let Some(reader) = guard.as_mut() else {
                return (buf, false);
            };
            let mut chunk = [0u8; BULK_READ_SIZE];
            let outcome = self
                .until_closed(async {
                    loop {
                        match tokio::time::timeout_at(deadline, reader.read(&mut chunk)).await {
                            Err(_) => return Ok(true),
                            Ok(Ok(0)) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
                            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                            Ok(Err(e)) => return Err(e),
                        }
                    }
                })
                .await;
            match outcome {
                Ok(timed_out) => timed_out,
                Err(e) => {
                    tracing::debug!(connection_id = %self.id, error = %e, "Deadline read failed");
                    false
                }
            }
        };

        if !timed_out {
            self.teardown().await;
        }
        (buf, timed_out)
    }

    /// Write all of `data`, returning the number of bytes written.
    pub async fn write(&self, data: &[u8]) -> Result<usize, ConnectionError> {
        let outcome = {
            let mut guard = self.writer.lock().await;
            let Some(writer) = guard.as_mut() else {
                return Err(ConnectionError::Closed);
            };
            self.until_closed(async {
                writer.write_all(data).await?;
                writer.flush().await
            })
            .await
        };

        match outcome {
            Ok(()) => {
                tracing::trace!(connection_id = %self.id, bytes = data.len(), "Wrote to peer");
                Ok(data.len())
            }
            Err(source) => {
                tracing::debug!(connection_id = %self.id, error = %source, "Write failed");
                self.teardown().await;
                Err(ConnectionError::Io {
                    partial: Vec::new(),
                    source,
                })
            }
        }
    }

    /// Close the socket and deregister. Idempotent and safe to race.
    pub async fn teardown(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        let age_ms = match self.registry.remove(self.id) {
            Some(info) => {
                metrics::record_connection_closed(self.role.as_str());
                info.opened_at.elapsed().as_millis() as u64
            }
            None => 0,
        };
        tracing::debug!(
            connection_id = %self.id,
            peer = %self.peer,
            role = self.role.as_str(),
            age_ms,
            "Connection closed"
        );

        // In-flight operations observe the signal above and release their locks.
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        self.reader.lock().await.take();
    }

    /// Run `fut` unless the connection is torn down first.
    async fn until_closed<T>(&self, fut: impl Future<Output = io::Result<T>>) -> io::Result<T> {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            res = fut => res,
            _ = closed.wait_for(|closed| *closed) => Err(io::ErrorKind::ConnectionAborted.into()),
        }
    }

    /// Tear down on failure; called after the read lock is released.
    async fn finish_read(&self, outcome: io::Result<()>, buf: Vec<u8>) -> Result<Vec<u8>, ConnectionError> {
        match outcome {
            Ok(()) => {
                tracing::trace!(connection_id = %self.id, bytes = buf.len(), "Read from peer");
                Ok(buf)
            }
            Err(source) => {
                tracing::debug!(
                    connection_id = %self.id,
                    bytes = buf.len(),
                    error = %source,
                    "Read failed"
                );
                self.teardown().await;
                Err(ConnectionError::Io { partial: buf, source })
            }
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.registry.remove(self.id).is_some() {
            metrics::record_connection_closed(self.role.as_str());
        }
    }
}

async fn fill_until<R>(reader: &mut R, buf: &mut Vec<u8>, token: &[u8], limit: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut byte = [0u8; 1];
    loop {
        if reader.read(&mut byte).await? == 0 {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        buf.push(byte[0]);
        if buf.ends_with(token) {
            return Ok(());
        }
        if buf.len() >= limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "delimiter not found within limit",
            ));
        }
    }
}

async fn fill_exact<R>(reader: &mut R, buf: &mut Vec<u8>, n: usize) -> io::Result<()>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = [0u8; BULK_READ_SIZE];
    while buf.len() < n {
        let want = (n - buf.len()).min(chunk.len());
        match reader.read(&mut chunk[..want]).await? {
            0 => return Err(io::ErrorKind::UnexpectedEof.into()),
            read => buf.extend_from_slice(&chunk[..read]),
        }
    }
    Ok(())
}
