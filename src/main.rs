//! TreeKV - An In-Memory Key-Value Server Backed by an AVL Tree
//!
//! This is the main entry point for the TreeKV server.
//! It parses the command line, sets up logging, binds the listener and
//! serves clients until SIGINT or SIGTERM.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use treekv::{ProtocolKind, Server, ServerConfig, StorageEngine};

/// TreeKV Server
#[derive(Parser, Debug)]
#[command(name = "treekv")]
#[command(about = "In-memory key-value server backed by an AVL tree")]
#[command(version)]
struct Cli {
    /// Host to bind to
    #[arg(long, env = "TREEKV_HOST", default_value = treekv::DEFAULT_HOST)]
    host: String,

    /// First port to try
    #[arg(short, long, env = "TREEKV_PORT", default_value_t = treekv::DEFAULT_PORT)]
    port: u16,

    /// Number of consecutive ports to try if the first is taken
    #[arg(long, default_value_t = treekv::config::DEFAULT_PORT_TRIES)]
    port_tries: u16,

    /// Wire profile spoken to clients
    #[arg(long, value_enum, default_value_t = ProtocolKind::Json)]
    protocol: ProtocolKind,

    /// Answer several requests per connection instead of one
    #[arg(long)]
    keep_alive: bool,

    /// Close connections idle for this many milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,

    /// Largest request in bytes a connection will buffer
    #[arg(long, default_value_t = treekv::connection::DEFAULT_MAX_BUFFER_SIZE)]
    max_buffer_size: usize,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn config(&self) -> ServerConfig {
        ServerConfig::new()
            .with_host(&self.host)
            .with_port(self.port)
            .with_port_tries(self.port_tries)
            .with_protocol(self.protocol)
            .with_keep_alive(self.keep_alive)
            .with_read_timeout(self.read_timeout_ms.map(Duration::from_millis))
            .with_max_buffer_size(self.max_buffer_size)
    }
}

fn print_banner(addr: std::net::SocketAddr, protocol: ProtocolKind) {
    println!(
        r#"
TreeKV v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Server started on {} ({} protocol)
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        treekv::VERSION,
        addr,
        protocol
    );
}

/// Resolves when SIGINT or (on Unix) SIGTERM arrives.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = tokio::signal::ctrl_c() => "SIGINT (Ctrl+C) received",
                _ = sigterm.recv() => "SIGTERM received",
            },
            Err(e) => {
                tracing::warn!(error = %e, "Failed to register SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                "SIGINT (Ctrl+C) received"
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "SIGINT (Ctrl+C) received"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Set up logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = cli.config();

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized");

    let server = Server::bind(&config, Arc::clone(&storage)).await?;
    let stats = server.stats();

    // Print the banner
    print_banner(server.local_addr()?, config.protocol);

    server
        .run_until(async {
            let reason = shutdown_signal().await;
            info!("{}, stopping server...", reason);
        })
        .await;

    let store = storage.stats();
    let connections = stats.snapshot();
    info!(
        keys = store.keys,
        height = store.height,
        gets = store.get_ops,
        sets = store.set_ops,
        deletes = store.del_ops,
        connections = connections.connections_accepted,
        commands = connections.commands_processed,
        decode_errors = connections.decode_errors,
        "Server shutdown complete"
    );
    Ok(())
}
