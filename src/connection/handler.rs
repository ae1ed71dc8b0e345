//! Connection Handler Module
//!
//! This module handles individual client connections to CinderKV. Each
//! client gets its own handler task that runs in a loop, reading request
//! lines and sending reply lines.
//!
//! ## Buffer Management
//!
//! Incoming data accumulates in a `BytesMut` buffer. TCP is a stream
//! protocol: a single read may hold half a line or a dozen pipelined
//! commands, so the handler extracts complete `\n`-terminated lines from
//! the buffer and leaves the rest for the next read. A trailing `\r` is
//! stripped, so both `nc` and CRLF clients work.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

use crate::commands::CommandHandler;

/// Maximum size for the read buffer (64 KB)
const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Total commands processed
    pub commands_processed: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: BufWriter<TcpStream>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared across connections)
    commands: CommandHandler,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            commands,
            stats,
        }
    }

    /// Runs the main connection loop.
    ///
    /// Reads request lines, executes them, and sends back replies until
    /// the client disconnects or an error occurs.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::Io(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Drain every complete line already buffered
            while let Some(line) = self.next_line()? {
                trace!(client = %self.addr, line = %line, "Request");

                if let Some(reply) = self.commands.execute(&line) {
                    self.send_reply(&reply).await?;
                    self.stats.command_processed();
                }
            }

            // Need more data
            self.read_more_data().await?;
        }
    }

    /// Extracts the next complete line from the buffer, if any.
    ///
    /// The newline is consumed; an optional trailing `\r` is stripped.
    fn next_line(&mut self) -> Result<Option<String>, ConnectionError> {
        let newline = match self.buffer.iter().position(|&b| b == b'\n') {
            Some(pos) => pos,
            None => return Ok(None),
        };

        let mut line = self.buffer.split_to(newline + 1);
        line.truncate(newline);
        if line.ends_with(b"\r") {
            line.truncate(line.len() - 1);
        }

        match std::str::from_utf8(&line) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(_) => Err(ConnectionError::InvalidUtf8),
        }
    }

    /// Reads more data from the socket into the buffer.
    async fn read_more_data(&mut self) -> Result<(), ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            warn!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            // Connection closed by client
            if self.buffer.is_empty() {
                return Err(ConnectionError::ClientDisconnected);
            } else {
                // Partial line left in the buffer
                return Err(ConnectionError::UnexpectedEof);
            }
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(())
    }

    /// Sends one reply line to the client.
    async fn send_reply(&mut self, reply: &str) -> Result<(), ConnectionError> {
        self.stream.write_all(reply.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        self.stats.bytes_written(reply.len() + 1);
        trace!(client = %self.addr, bytes = reply.len() + 1, "Sent reply");
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client disconnected normally
    #[error("client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial line)
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("buffer size limit exceeded")]
    BufferFull,

    /// Request line was not valid UTF-8
    #[error("request line was not valid UTF-8")]
    InvalidUtf8,
}

/// Handles a client connection to completion.
///
/// Convenience wrapper that creates a [`ConnectionHandler`] and runs it,
/// swallowing routine disconnects.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, commands, stats);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::Io(ref io_err)
                if io_err.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => {
                debug!(client = %addr, error = %e, "Connection ended with error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Store;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, Arc<Store>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(Store::new(0));
        let stats = Arc::new(ConnectionStats::new());

        let store_clone = Arc::clone(&store);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let commands = CommandHandler::standalone(Arc::clone(&store_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, commands, stats));
            }
        });

        (addr, store, stats)
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PING\n").await.unwrap();

        let mut lines = BufReader::new(&mut client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+PONG");
    }

    #[tokio::test]
    async fn test_set_get_over_socket() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = client.split();
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"SET name cinder\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+OK");

        write_half.write_all(b"GET name\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "cinder");

        write_half.write_all(b"GET missing\n").await.unwrap();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "(nil)");
    }

    #[tokio::test]
    async fn test_crlf_lines() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"SET k v\r\nGET k\r\n").await.unwrap();

        let mut lines = BufReader::new(&mut client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+OK");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "v");
    }

    #[tokio::test]
    async fn test_pipelined_commands() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"SET k1 v1\nSET k2 v2\nGET k1\nGET k2\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(&mut client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+OK");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+OK");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "v1");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "v2");
    }

    #[tokio::test]
    async fn test_split_line_across_reads() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"SET na").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.write_all(b"me cinder\n").await.unwrap();

        let mut lines = BufReader::new(&mut client).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "+OK");
    }

    #[tokio::test]
    async fn test_unknown_command_over_socket() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"NOPE\n").await.unwrap();

        let mut lines = BufReader::new(&mut client).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            "ERR unknown command 'NOPE'"
        );
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client.write_all(b"PING\n").await.unwrap();
        let mut buf = [0u8; 64];
        let _ = client.read(&mut buf).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
