//! Connection Handler Module
//!
//! This module handles individual client connections to TreeKV.
//! Each client gets its own handler task that reads a request, executes it
//! and sends the reply.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (TCP handshake)
//!        │
//!        ▼
//! 2. ConnectionHandler spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │  ┌─────────────────────────┐ │
//!    │  │ Read bytes from socket  │◄┼──── incomplete
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Decode command (codec)  │─┼───► ERROR reply, close
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Execute command         │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │  ┌─────────────────────────┐ │
//!    │  │ Send reply              │ │
//!    │  └───────────┬─────────────┘ │
//!    │              ▼               │
//!    │   [keep-alive: loop back]    │
//!    └──────────────────────────────┘
//!        │
//!        ▼
//! 4. Shutdown write half, handler task ends
//! ```
//!
//! By default a connection carries exactly one request. With keep-alive
//! enabled the handler answers pipelined requests in order until the client
//! closes its side.
//!
//! ## Buffer Management
//!
//! We use a BytesMut buffer to accumulate incoming data. This is important
//! because TCP is a stream protocol - we might receive partial commands,
//! or multiple commands in a single read.

use crate::commands::CommandHandler;
use crate::protocol::{Codec, Command, ParseError, Reply};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, error, info, trace, warn};

/// Default maximum size for the read buffer (64 KB)
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024;

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
    /// Requests rejected by the codec
    pub decode_errors: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

/// A point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectionStatsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub commands_processed: u64,
    pub decode_errors: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
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

    pub fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ConnectionStatsSnapshot {
        ConnectionStatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            commands_processed: self.commands_processed.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Per-connection behavior knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Keep reading requests after the first reply
    pub keep_alive: bool,
    /// Give up on a client that sends nothing for this long
    pub read_timeout: Option<Duration>,
    /// Largest request (in bytes) the handler will buffer
    pub max_buffer_size: usize,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            keep_alive: false,
            read_timeout: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

/// Everything a connection needs that is shared with the rest of the server.
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// The command handler (shared across connections)
    pub command_handler: CommandHandler,
    /// Wire profile
    pub codec: Arc<dyn Codec>,
    pub options: ConnectionOptions,
    /// Connection statistics (shared)
    pub stats: Arc<ConnectionStats>,
}

impl ConnectionContext {
    /// Creates a context with default options and fresh statistics.
    pub fn new(command_handler: CommandHandler, codec: Arc<dyn Codec>) -> Self {
        Self {
            command_handler,
            codec,
            options: ConnectionOptions::default(),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn with_options(mut self, options: ConnectionOptions) -> Self {
        self.options = options;
        self
    }
}

/// Handles a single client connection.
///
/// This struct manages the read buffer, decoding, and reply sending
/// for one connected client. It works over any byte stream, which keeps
/// it testable without a socket.
pub struct ConnectionHandler<S> {
    /// The stream for this connection
    stream: BufWriter<S>,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    context: ConnectionContext,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection handler.
    ///
    /// # Arguments
    ///
    /// * `stream` - The byte stream for this connection
    /// * `addr` - The client's socket address
    /// * `context` - Shared handler, codec, options and statistics
    pub fn new(stream: S, addr: SocketAddr, context: ConnectionContext) -> Self {
        context.stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            context,
        }
    }

    /// Runs the connection to completion.
    ///
    /// Returns once the request (or, in keep-alive mode, every request) has
    /// been answered, or when the connection fails. The write half is shut
    /// down before returning either way.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        if let Err(e) = self.stream.shutdown().await {
            trace!(client = %self.addr, error = %e, "Shutdown failed");
        }

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected gracefully"),
            Err(e) => match e {
                ConnectionError::ClientDisconnected => {
                    debug!(client = %self.addr, "Client disconnected")
                }
                ConnectionError::IoError(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        self.context.stats.connection_closed();
        result
    }

    /// The main read-execute-respond loop.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            match self.try_parse_command() {
                Ok(Some(command)) => {
                    self.dispatch(command).await?;
                    if !self.context.options.keep_alive {
                        return Ok(());
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => return Err(self.reject(e).await),
            }

            // Need more data - read from the socket
            if self.read_more_data().await? == 0 {
                return self.finish_at_eof().await;
            }
        }
    }

    /// Attempts to decode a command from the buffer.
    fn try_parse_command(&mut self) -> Result<Option<Command>, ParseError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }

        match self.context.codec.decode(&self.buffer)? {
            Some((command, consumed)) => {
                // Successfully decoded a command - consume the bytes
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(command))
            }
            None => {
                // Incomplete data - need to read more
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
        }
    }

    /// Handles whatever is left in the buffer once the client closed its side.
    async fn finish_at_eof(&mut self) -> Result<(), ConnectionError> {
        loop {
            if self.buffer.iter().all(u8::is_ascii_whitespace) {
                return Err(ConnectionError::ClientDisconnected);
            }

            match self.context.codec.decode_eof(&self.buffer) {
                Ok(Some((command, consumed))) => {
                    let _ = self.buffer.split_to(consumed);
                    self.dispatch(command).await?;
                    if !self.context.options.keep_alive {
                        return Ok(());
                    }
                }
                Ok(None) => {
                    debug!(
                        client = %self.addr,
                        buffered = self.buffer.len(),
                        "Connection closed mid-request"
                    );
                    self.send_best_effort(&Reply::error("incomplete request"))
                        .await;
                    return Err(ConnectionError::UnexpectedEof);
                }
                Err(e) => return Err(self.reject(e).await),
            }
        }
    }

    /// Executes a command and sends its reply.
    async fn dispatch(&mut self, command: Command) -> Result<(), ConnectionError> {
        let reply = self.context.command_handler.execute(command);
        self.context.stats.command_processed();
        self.send_reply(&reply).await
    }

    /// Answers a request the codec rejected and returns the error to end
    /// the connection with.
    async fn reject(&mut self, error: ParseError) -> ConnectionError {
        warn!(client = %self.addr, error = %error, "Parse error");
        self.context.stats.decode_error();
        self.send_best_effort(&Reply::error(error.to_string())).await;
        ConnectionError::ParseError(error)
    }

    /// Reads more data from the socket into the buffer.
    ///
    /// Returns the number of bytes read; zero means the client closed its
    /// write half.
    async fn read_more_data(&mut self) -> Result<usize, ConnectionError> {
        // Check buffer size limit
        if self.buffer.len() >= self.context.options.max_buffer_size {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            self.send_best_effort(&Reply::error("request too large"))
                .await;
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(4096);
        }

        let read_timeout = self.context.options.read_timeout;
        let read = self.stream.get_mut().read_buf(&mut self.buffer);
        let n = match read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| ConnectionError::Timeout(limit))??,
            None => read.await?,
        };

        if n > 0 {
            self.context.stats.bytes_read(n);
            trace!(client = %self.addr, bytes = n, "Read data");
        }

        Ok(n)
    }

    /// Sends a reply to the client.
    async fn send_reply(&mut self, reply: &Reply) -> Result<(), ConnectionError> {
        let bytes = self.context.codec.encode_reply(reply);
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.context.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent reply"
        );
        Ok(())
    }

    /// Sends a reply, ignoring a peer that is already gone.
    async fn send_best_effort(&mut self, reply: &Reply) {
        if let Err(e) = self.send_reply(reply).await {
            debug!(client = %self.addr, error = %e, "Could not send reply");
        }
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The request could not be decoded
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// Client disconnected normally
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Unexpected end of stream (partial command)
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// Buffer size limit exceeded
    #[error("Buffer size limit exceeded")]
    BufferFull,

    /// The client sent nothing within the read timeout
    #[error("No data received within {0:?}")]
    Timeout(Duration),
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion.
///
/// # Arguments
///
/// * `stream` - The stream for this connection
/// * `addr` - The client's socket address
/// * `context` - Shared handler, codec, options and statistics
pub async fn handle_connection<S>(stream: S, addr: SocketAddr, context: ConnectionContext)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let handler = ConnectionHandler::new(stream, addr, context);
    if let Err(e) = handler.run().await {
        match e {
            ConnectionError::ClientDisconnected => {}
            ConnectionError::IoError(ref io_err)
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
    use crate::protocol::{JsonCodec, TextCodec};
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn json_context() -> (ConnectionContext, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));
        (
            ConnectionContext::new(handler, Arc::new(JsonCodec::new())),
            storage,
        )
    }

    fn text_context() -> (ConnectionContext, Arc<StorageEngine>) {
        let storage = Arc::new(StorageEngine::new());
        let handler = CommandHandler::new(Arc::clone(&storage));
        (
            ConnectionContext::new(handler, Arc::new(TextCodec::new())),
            storage,
        )
    }

    fn keep_alive(context: ConnectionContext) -> ConnectionContext {
        context.with_options(ConnectionOptions {
            keep_alive: true,
            ..ConnectionOptions::default()
        })
    }

    async fn create_test_server(
        context: ConnectionContext,
    ) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, client_addr, context.clone()));
            }
        });

        addr
    }

    #[tokio::test]
    async fn test_single_request() {
        let (context, storage) = json_context();
        let mock = Builder::new()
            .read(br#"{"key": "name", "operation": "SET", "value": "Ariz"}"#)
            .write(b"OK\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), context).run().await;
        assert!(result.is_ok());
        assert_eq!(storage.get("name"), Some("Ariz".to_string()));
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let (context, storage) = json_context();
        storage.set("name".into(), "Ariz".into());

        let mock = Builder::new()
            .read(br#"{"key": "na"#)
            .read(br#"me", "operation": "#)
            .read(br#""GET"}"#)
            .write(b"\"Ariz\"\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), context).run().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_reply() {
        let (context, storage) = json_context();
        let stats = Arc::clone(&context.stats);
        let expected = format!(
            "ERROR: {}\n",
            ParseError::UnknownOperation("PUT".into())
        );

        let mock = Builder::new()
            .read(br#"{"key": "k", "operation": "PUT", "value": "v"}"#)
            .write(expected.as_bytes())
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), context).run().await;
        assert!(matches!(
            result,
            Err(ConnectionError::ParseError(ParseError::UnknownOperation(_)))
        ));
        assert!(storage.is_empty());
        assert_eq!(stats.decode_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_partial_request_then_close() {
        let (context, storage) = json_context();
        let (mut client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(ConnectionHandler::new(server, test_addr(), context).run());

        client
            .write_all(br#"{"key": "partial", "operation"#)
            .await
            .unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"ERROR: incomplete request\n");

        let result = task.await.unwrap();
        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_unterminated_text_line_at_eof() {
        let (context, storage) = text_context();
        let (mut client, server) = tokio::io::duplex(1024);
        let task = tokio::spawn(ConnectionHandler::new(server, test_addr(), context).run());

        client.write_all(b"SET key1 value1").await.unwrap();
        client.shutdown().await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"OK\n");

        assert!(task.await.unwrap().is_ok());
        assert_eq!(storage.get("key1"), Some("value1".to_string()));
    }

    #[tokio::test]
    async fn test_close_without_request() {
        let (context, _) = json_context();
        let stats = Arc::clone(&context.stats);
        let mock = Builder::new().read(b"\n").build();

        let result = ConnectionHandler::new(mock, test_addr(), context).run().await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_one_request_per_connection_by_default() {
        let (context, storage) = text_context();
        let mock = Builder::new()
            .read(b"SET a 1\nSET b 2\n")
            .write(b"OK\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), context).run().await;
        assert!(result.is_ok());
        assert_eq!(storage.get("a"), Some("1".to_string()));
        assert_eq!(storage.get("b"), None);
    }

    #[tokio::test]
    async fn test_keep_alive_pipelining() {
        let (context, storage) = text_context();
        let mock = Builder::new()
            .read(b"SET a 1\nGET a\nDEL a\n")
            .write(b"OK\n")
            .write(b"\"1\"\n")
            .write(b"Deleted\n")
            .read(b"GET a\n")
            .write(b"Not Found\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), keep_alive(context))
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_keep_alive_skips_blank_lines() {
        let (context, storage) = text_context();
        let stats = Arc::clone(&context.stats);
        let mock = Builder::new()
            .read(b"SET a 1\n\nGET a\n")
            .write(b"OK\n")
            .write(b"\"1\"\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), keep_alive(context))
            .run()
            .await;
        assert!(matches!(result, Err(ConnectionError::ClientDisconnected)));
        assert_eq!(storage.get("a"), Some("1".to_string()));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
        assert_eq!(stats.decode_errors.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_buffer_limit() {
        let (context, _) = text_context();
        let context = context.with_options(ConnectionOptions {
            max_buffer_size: 8,
            ..ConnectionOptions::default()
        });

        let mock = Builder::new()
            .read(b"SET key a-long-value")
            .write(b"ERROR: request too large\n")
            .build();

        let result = ConnectionHandler::new(mock, test_addr(), context).run().await;
        assert!(matches!(result, Err(ConnectionError::BufferFull)));
    }

    #[tokio::test]
    async fn test_read_timeout() {
        let (context, _) = json_context();
        let context = context.with_options(ConnectionOptions {
            read_timeout: Some(Duration::from_millis(50)),
            ..ConnectionOptions::default()
        });

        // Hold the client end open without writing anything
        let (_client, server) = tokio::io::duplex(1024);

        let result = ConnectionHandler::new(server, test_addr(), context).run().await;
        assert!(matches!(result, Err(ConnectionError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_set_get_over_tcp() {
        let (context, _) = json_context();
        let addr = create_test_server(context).await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(br#"{"key": "name", "operation": "SET", "value": "Ariz"}"#)
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"OK\n");

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(br#"{"key": "name", "operation": "GET"}"#)
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"\"Ariz\"\n");
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (context, _) = json_context();
        let stats = Arc::clone(&context.stats);
        let addr = create_test_server(context).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        // Send a command and wait for the server to close
        client
            .write_all(br#"{"key": "k", "operation": "GET"}"#)
            .await
            .unwrap();
        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(response, b"Not Found\n");

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.commands_processed, 1);
        assert_eq!(snapshot.active_connections, 0);
        assert!(snapshot.bytes_read > 0);
        assert_eq!(snapshot.bytes_written, response.len() as u64);
    }
}
