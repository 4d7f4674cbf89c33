//! Command Handler Module
//!
//! This module implements the command processing layer for TreeKV.
//! It receives decoded commands, executes them against the storage engine,
//! and returns the matching reply.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Codec          │  (protocol module)
//! └────────┬────────┘
//!          │  Command
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```
//!
//! ## Supported Commands
//!
//! - `SET key value` → `OK`
//! - `GET key` → the quoted value, or `Not Found`
//! - `DEL key` → `Deleted`, or `Not Found`

pub mod handler;

// Re-export the main command handler
pub use handler::CommandHandler;
