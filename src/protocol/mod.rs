//! Wire Protocol Implementation
//!
//! This module translates between client bytes and typed commands/replies.
//!
//! ## Overview
//!
//! A server speaks exactly one of two independent profiles, chosen at
//! startup with [`ProtocolKind`]:
//!
//! - **JSON**: `{"key": "k", "operation": "SET", "value": "v"}`
//! - **Text**: `SET k v\n`
//!
//! Replies are newline-terminated lines in both profiles.
//!
//! ## Modules
//!
//! - `types`: `Command`, `Operation` and `Reply`
//! - `codec`: the `Codec` trait, `ParseError` and profile selection
//! - `json`: the JSON profile
//! - `text`: the plain-text profile
//!
//! ## Example
//!
//! ```
//! use treekv::protocol::{Codec, Command, JsonCodec, Reply};
//!
//! let codec = JsonCodec::new();
//! let data = br#"{"key": "name", "operation": "GET"}"#;
//! let (command, consumed) = codec.decode(data).unwrap().unwrap();
//! assert_eq!(command, Command::get("name"));
//! assert_eq!(consumed, data.len());
//!
//! let bytes = codec.encode_reply(&Reply::Found("Ariz".to_string()));
//! assert_eq!(bytes, b"\"Ariz\"\n");
//! ```

pub mod codec;
pub mod json;
pub mod text;
pub mod types;

// Re-export commonly used types for convenience
pub use codec::{Codec, ParseError, ParseResult, ProtocolKind};
pub use json::JsonCodec;
pub use text::TextCodec;
pub use types::{Command, Operation, Reply};
