//! Server Configuration
//!
//! Centralized configuration with sensible defaults. The binary fills this in
//! from command-line flags; tests build it directly with the `with_*`
//! methods.

use crate::connection::{ConnectionOptions, DEFAULT_MAX_BUFFER_SIZE};
use crate::protocol::ProtocolKind;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// How many consecutive ports to try before giving up
pub const DEFAULT_PORT_TRIES: u16 = 10;

/// Main configuration for a TreeKV server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// Host to bind to
    pub host: String,

    /// First port to try
    pub port: u16,

    /// Number of consecutive ports to try, starting at `port`
    pub port_tries: u16,

    // -------------------------------------------------------------------------
    // Connection Configuration
    // -------------------------------------------------------------------------
    /// Wire profile spoken by every connection
    pub protocol: ProtocolKind,

    /// Answer pipelined requests instead of closing after the first reply
    pub keep_alive: bool,

    /// Idle read timeout; `None` waits indefinitely
    pub read_timeout: Option<Duration>,

    /// Largest request (in bytes) a connection will buffer
    pub max_buffer_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            port_tries: DEFAULT_PORT_TRIES,
            protocol: ProtocolKind::default(),
            keep_alive: false,
            read_timeout: None,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the number of ports to probe. Zero is treated as one.
    pub fn with_port_tries(mut self, tries: u16) -> Self {
        self.port_tries = tries.max(1);
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolKind) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_buffer_size(mut self, size: usize) -> Self {
        self.max_buffer_size = size;
        self
    }

    /// The per-connection subset of this configuration.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            keep_alive: self.keep_alive,
            read_timeout: self.read_timeout,
            max_buffer_size: self.max_buffer_size,
        }
    }
}
