//! # TreeKV - An In-Memory Key-Value Server Backed by an AVL Tree
//!
//! TreeKV is a small TCP key-value server written in Rust. Keys and values
//! are strings, and the store is a self-balancing AVL tree shared by every
//! client connection.
//!
//! ## Features
//!
//! - **Balanced Storage**: Every insert and delete rebalances the tree, so
//!   lookups stay logarithmic no matter the insertion order
//! - **Two Wire Profiles**: JSON requests or plain-text command lines
//! - **Async I/O**: Built on Tokio, one task per client connection
//! - **Fault Tolerant**: A malformed or truncated request only affects the
//!   connection that sent it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              TreeKV                                     │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────┐     │
//! │                     │   Codec     │    │      StorageEngine       │     │
//! │                     │ JSON / Text │    │   RwLock<AvlTree>        │     │
//! │                     └─────────────┘    └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use treekv::{Server, ServerConfig, StorageEngine};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(StorageEngine::new());
//!     let server = Server::bind(&ServerConfig::default(), storage).await?;
//!
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` → `OK`
//! - `GET key` → `"value"` or `Not Found`
//! - `DEL key` → `Deleted` or `Not Found`
//!
//! ## Module Overview
//!
//! - [`storage`]: The AVL tree and the thread-safe storage engine
//! - [`protocol`]: Commands, replies and the JSON/text codecs
//! - [`commands`]: Executes commands against the storage engine
//! - [`connection`]: Client connection management
//! - [`server`]: Listener binding and the accept loop
//! - [`config`]: Server configuration

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::CommandHandler;
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionContext, ConnectionStats};
pub use protocol::{Codec, Command, ParseError, ProtocolKind, Reply};
pub use server::{Server, ServerError};
pub use storage::{AvlTree, StorageEngine};

/// The default port TreeKV listens on
pub const DEFAULT_PORT: u16 = 45234;

/// The default host TreeKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of TreeKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
