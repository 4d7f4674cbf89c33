//! JSON Wire Profile
//!
//! Each request is a single JSON object:
//!
//! ```text
//! {"key": "key1", "operation": "SET", "value": "value1"}
//! {"key": "key1", "operation": "GET"}
//! {"key": "key1", "operation": "DEL"}
//! ```
//!
//! No delimiter is needed after the object: the closing brace completes the
//! request, so clients that write the object and then wait for the reply work
//! as-is. Whitespace (including newlines) between objects is skipped.
//!
//! A found value is rendered as a JSON string literal, e.g. `"value1"`.

use super::codec::{Codec, ParseError, ParseResult};
use super::types::{reply_text, Command, Operation, Reply};
use serde::Deserialize;

/// The request object as it appears on the wire.
///
/// Every field is optional here so that a missing field is reported as
/// [`ParseError::MissingField`] rather than a generic JSON error.
#[derive(Debug, Deserialize)]
struct WireRequest {
    #[serde(default)]
    key: Option<String>,

    #[serde(default)]
    operation: Option<String>,

    #[serde(default)]
    value: Option<String>,
}

impl WireRequest {
    fn into_command(self) -> ParseResult<Command> {
        let operation: Operation = self
            .operation
            .ok_or(ParseError::MissingField("operation"))?
            .parse()?;
        Command::from_parts(operation, self.key, self.value)
    }
}

/// Codec for the JSON profile.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Codec for JsonCodec {
    fn decode(&self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<WireRequest>();

        match stream.next() {
            // Nothing but whitespace so far
            None => Ok(None),
            Some(Ok(request)) => {
                let consumed = stream.byte_offset();
                Ok(Some((request.into_command()?, consumed)))
            }
            // Truncated object, wait for more bytes
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(ParseError::InvalidJson(e.to_string())),
        }
    }

    fn encode_reply_into(&self, reply: &Reply, buf: &mut Vec<u8>) {
        match reply {
            Reply::Ok => buf.extend_from_slice(reply_text::OK.as_bytes()),
            Reply::Found(value) => {
                let literal = serde_json::Value::from(value.as_str()).to_string();
                buf.extend_from_slice(literal.as_bytes());
            }
            Reply::NotFound => buf.extend_from_slice(reply_text::NOT_FOUND.as_bytes()),
            Reply::Deleted => buf.extend_from_slice(reply_text::DELETED.as_bytes()),
            Reply::Error(reason) => {
                buf.extend_from_slice(reply_text::ERROR_PREFIX.as_bytes());
                buf.extend_from_slice(reason.as_bytes());
            }
        }
        buf.push(reply_text::TERMINATOR);
    }
}
