//! Codec Trait and Decode Errors
//!
//! A [`Codec`] translates between wire bytes and [`Command`]/[`Reply`]
//! values. Two independent profiles implement it:
//!
//! - [`JsonCodec`](super::JsonCodec): `{"key": "k", "operation": "SET", "value": "v"}`
//! - [`TextCodec`](super::TextCodec): `SET k v\n`
//!
//! The server picks one with [`ProtocolKind`]; the profiles never share
//! grammar.
//!
//! ## Incremental Decoding
//!
//! TCP is a stream, so a request can arrive split across several reads.
//! [`Codec::decode`] therefore returns:
//!
//! - `Ok(Some((command, consumed)))` - a complete request, `consumed` bytes used
//! - `Ok(None)` - the request is incomplete, read more bytes
//! - `Err(ParseError)` - the bytes can never form a valid request

use super::types::{Command, Reply};
use super::{JsonCodec, TextCodec};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while decoding a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The bytes are not valid JSON or not a request object
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The request is not valid UTF-8
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// A required field is absent
    #[error("missing field '{0}'")]
    MissingField(&'static str),

    /// The key is an empty string
    #[error("key must not be empty")]
    EmptyKey,

    /// The operation is not SET, GET or DEL
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    /// A text command line contained nothing
    #[error("empty command")]
    EmptyCommand,

    /// GET or DEL was given more than a key
    #[error("unexpected arguments for {operation}: '{extra}'")]
    UnexpectedArguments {
        operation: &'static str,
        extra: String,
    },
}

/// Result type for decoding operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Translates wire bytes into commands and replies into wire bytes.
pub trait Codec: fmt::Debug + Send + Sync {
    /// Attempts to decode one command from the front of `buf`.
    fn decode(&self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>>;

    /// Decodes whatever is left in `buf` once the peer has closed its side.
    ///
    /// Returning `Ok(None)` means the leftover bytes are a truncated request.
    fn decode_eof(&self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        self.decode(buf)
    }

    /// Appends the wire form of `reply` to `buf`.
    fn encode_reply_into(&self, reply: &Reply, buf: &mut Vec<u8>);

    /// Serializes a reply for sending over the wire.
    fn encode_reply(&self, reply: &Reply) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_reply_into(reply, &mut buf);
        buf
    }
}

/// Selects the wire profile a server speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ProtocolKind {
    /// One JSON object per request
    #[default]
    Json,

    /// Whitespace-delimited `SET key value` lines
    Text,
}

impl ProtocolKind {
    /// Creates the codec for this profile.
    pub fn codec(self) -> Arc<dyn Codec> {
        match self {
            ProtocolKind::Json => Arc::new(JsonCodec::new()),
            ProtocolKind::Text => Arc::new(TextCodec::new()),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Json => f.write_str("json"),
            ProtocolKind::Text => f.write_str("text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_kind_selects_codec() {
        let json = ProtocolKind::Json.codec();
        let text = ProtocolKind::Text.codec();

        let (command, _) = json
            .decode(br#"{"key": "k", "operation": "GET"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(command, Command::get("k"));

        let (command, _) = text.decode(b"GET k\n").unwrap().unwrap();
        assert_eq!(command, Command::get("k"));

        // Each profile rejects the other's grammar
        assert!(json.decode(b"GET k\n").is_err());
        assert!(text
            .decode(br#"{"key": "k", "operation": "GET"}"#)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_default_protocol_is_json() {
        assert_eq!(ProtocolKind::default(), ProtocolKind::Json);
        assert_eq!(ProtocolKind::Text.to_string(), "text");
    }

    #[test]
    fn test_parse_error_messages() {
        assert_eq!(
            ParseError::MissingField("key").to_string(),
            "missing field 'key'"
        );
        assert_eq!(
            ParseError::UnknownOperation("PUT".into()).to_string(),
            "unknown operation 'PUT'"
        );
    }
}
