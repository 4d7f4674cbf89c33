//! TCP Server
//!
//! Binds the listener (probing consecutive ports if the first is taken) and
//! runs the accept loop, spawning one task per client connection.
//!
//! ```text
//!   bind 45234 ──busy──> bind 45235 ──busy──> ... ──> NoPortAvailable
//!        │ ok
//!        ▼
//!   accept loop ──spawn──> ConnectionHandler (one task per client)
//!        │
//!   shutdown future resolves ──> stop accepting
//! ```

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionContext, ConnectionStats};
use crate::storage::StorageEngine;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Errors that can occur while starting the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Every port in the probed range was unavailable
    #[error("no port available on {host} in {first}..={last}")]
    NoPortAvailable {
        host: String,
        first: u16,
        last: u16,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Binds to `host:port`, falling back to the following ports.
///
/// Port 0 asks the OS for an ephemeral port, so only one attempt is made.
pub async fn bind_with_fallback(
    host: &str,
    port: u16,
    tries: u16,
) -> Result<TcpListener, ServerError> {
    let tries = if port == 0 { 1 } else { tries.max(1) };
    let mut last_port = port;
    let mut last_error = None;

    for offset in 0..tries {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        last_port = candidate;

        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                warn!(host = %host, port = candidate, error = %e, "Port unavailable");
                last_error = Some(e);
            }
        }
    }

    Err(ServerError::NoPortAvailable {
        host: host.to_string(),
        first: port,
        last: last_port,
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no port tried")),
    })
}

/// A bound TreeKV server.
pub struct Server {
    listener: TcpListener,
    context: ConnectionContext,
}

impl Server {
    /// Binds the listener according to `config`.
    pub async fn bind(
        config: &ServerConfig,
        storage: Arc<StorageEngine>,
    ) -> Result<Self, ServerError> {
        let listener = bind_with_fallback(&config.host, config.port, config.port_tries).await?;

        let context = ConnectionContext::new(CommandHandler::new(storage), config.protocol.codec())
            .with_options(config.connection_options());

        info!(
            addr = %listener.local_addr()?,
            protocol = %config.protocol,
            keep_alive = config.keep_alive,
            "Listening"
        );

        Ok(Self { listener, context })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Connection statistics, shared with every connection task.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.context.stats)
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        self.context.command_handler.storage()
    }

    /// Runs the accept loop forever.
    pub async fn run(self) {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Runs the accept loop until `shutdown` resolves.
    ///
    /// Connections already accepted keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = accept_loop(&self.listener, &self.context) => {}
            _ = shutdown => {
                info!("Shutdown requested, no longer accepting connections");
            }
        }
    }
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: &TcpListener, context: &ConnectionContext) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }

                // Spawn a task to handle this connection
                tokio::spawn(handle_connection(stream, addr, context.clone()));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
