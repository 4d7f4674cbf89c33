//! Command Execution
//!
//! Maps each [`Command`] onto the storage engine and builds the [`Reply`].
//!
//! | Command           | Key present         | Key absent  |
//! |-------------------|---------------------|-------------|
//! | `SET key value`   | `OK` (overwrites)   | `OK`        |
//! | `GET key`         | `"value"`           | `Not Found` |
//! | `DEL key`         | `Deleted`           | `Not Found` |

use crate::protocol::{Command, Reply};
use crate::storage::StorageEngine;
use std::sync::Arc;
use tracing::debug;

/// Executes commands against a shared storage engine.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Returns the storage engine this handler writes to.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Executes a command and returns the reply to send back to the client.
    pub fn execute(&self, command: Command) -> Reply {
        debug!(operation = %command.operation(), key = command.key(), "Executing command");

        match command {
            Command::Set { key, value } => self.cmd_set(key, value),
            Command::Get { key } => self.cmd_get(&key),
            Command::Del { key } => self.cmd_del(&key),
        }
    }

    fn cmd_set(&self, key: String, value: String) -> Reply {
        self.storage.set(key, value);
        Reply::Ok
    }

    fn cmd_get(&self, key: &str) -> Reply {
        match self.storage.get(key) {
            Some(value) => Reply::Found(value),
            None => Reply::NotFound,
        }
    }

    fn cmd_del(&self, key: &str) -> Reply {
        if self.storage.delete(key) {
            Reply::Deleted
        } else {
            Reply::NotFound
        }
    }
}
