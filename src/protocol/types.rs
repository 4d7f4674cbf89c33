//! Protocol Data Types
//!
//! This module defines the values that flow through the protocol layer,
//! independent of any wire format:
//!
//! - [`Command`]: one decoded client request (SET, GET or DEL)
//! - [`Reply`]: the outcome of executing a command
//!
//! ## Reply Wire Text
//!
//! Both wire profiles render replies as a single newline-terminated line:
//!
//! ```text
//! OK                 successful SET
//! "value1"           successful GET (quoted value)
//! Not Found          GET or DEL on an absent key
//! Deleted            successful DEL
//! ERROR: <reason>    rejected request
//! ```

use super::codec::{ParseError, ParseResult};
use std::fmt;
use std::str::FromStr;

/// Literal reply text shared by all wire profiles
pub mod reply_text {
    pub const OK: &str = "OK";
    pub const NOT_FOUND: &str = "Not Found";
    pub const DELETED: &str = "Deleted";
    pub const ERROR_PREFIX: &str = "ERROR: ";
    pub const TERMINATOR: u8 = b'\n';
}

/// Wraps a found value in double quotes, escaping `"` and `\`.
pub(crate) fn quoted(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// The three supported operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Set,
    Get,
    Del,
}

impl Operation {
    /// The verb as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Set => "SET",
            Operation::Get => "GET",
            Operation::Del => "DEL",
        }
    }
}

impl FromStr for Operation {
    type Err = ParseError;

    /// Verbs must match exactly; `get` is not `GET`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SET" => Ok(Operation::Set),
            "GET" => Ok(Operation::Get),
            "DEL" => Ok(Operation::Del),
            other => Err(ParseError::UnknownOperation(other.to_string())),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded client request.
///
/// A SET always carries a value and GET/DEL never do, so a command without a
/// required field cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Store `value` under `key`, overwriting any previous value
    Set { key: String, value: String },

    /// Look up `key`
    Get { key: String },

    /// Remove `key`
    Del { key: String },
}

impl Command {
    pub fn set(key: impl Into<String>, value: impl Into<String>) -> Self {
        Command::Set {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn get(key: impl Into<String>) -> Self {
        Command::Get { key: key.into() }
    }

    pub fn del(key: impl Into<String>) -> Self {
        Command::Del { key: key.into() }
    }

    /// Builds a command from loosely-typed request fields.
    ///
    /// The key must be present and non-empty, and SET requires a value. A
    /// value sent with GET or DEL is ignored.
    pub fn from_parts(
        operation: Operation,
        key: Option<String>,
        value: Option<String>,
    ) -> ParseResult<Self> {
        let key = key.ok_or(ParseError::MissingField("key"))?;
        if key.is_empty() {
            return Err(ParseError::EmptyKey);
        }

        Ok(match operation {
            Operation::Set => Command::Set {
                key,
                value: value.ok_or(ParseError::MissingField("value"))?,
            },
            Operation::Get => Command::Get { key },
            Operation::Del => Command::Del { key },
        })
    }

    pub fn operation(&self) -> Operation {
        match self {
            Command::Set { .. } => Operation::Set,
            Command::Get { .. } => Operation::Get,
            Command::Del { .. } => Operation::Del,
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Command::Set { key, .. } | Command::Get { key } | Command::Del { key } => key,
        }
    }

    /// The value carried by a SET.
    pub fn value(&self) -> Option<&str> {
        match self {
            Command::Set { value, .. } => Some(value),
            _ => None,
        }
    }
}

/// The result of executing a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// SET succeeded
    Ok,

    /// GET found a value
    Found(String),

    /// The key does not exist
    NotFound,

    /// DEL removed the key
    Deleted,

    /// The request was rejected
    Error(String),
}

impl Reply {
    /// Creates an error reply.
    pub fn error(reason: impl Into<String>) -> Self {
        Reply::Error(reason.into())
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => f.write_str(reply_text::OK),
            Reply::Found(value) => f.write_str(&quoted(value)),
            Reply::NotFound => f.write_str(reply_text::NOT_FOUND),
            Reply::Deleted => f.write_str(reply_text::DELETED),
            Reply::Error(reason) => write!(f, "{}{}", reply_text::ERROR_PREFIX, reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_from_str() {
        assert_eq!("SET".parse::<Operation>(), Ok(Operation::Set));
        assert_eq!("GET".parse::<Operation>(), Ok(Operation::Get));
        assert_eq!("DEL".parse::<Operation>(), Ok(Operation::Del));
        assert_eq!(
            "get".parse::<Operation>(),
            Err(ParseError::UnknownOperation("get".to_string()))
        );
        assert_eq!(
            "Del".parse::<Operation>(),
            Err(ParseError::UnknownOperation("Del".to_string()))
        );
        assert_eq!(
            "PUT".parse::<Operation>(),
            Err(ParseError::UnknownOperation("PUT".to_string()))
        );
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            Command::from_parts(Operation::Set, Some("k".into()), Some("v".into())),
            Ok(Command::set("k", "v"))
        );
        assert_eq!(
            Command::from_parts(Operation::Get, Some("k".into()), Some("ignored".into())),
            Ok(Command::get("k"))
        );
        assert_eq!(
            Command::from_parts(Operation::Del, None, None),
            Err(ParseError::MissingField("key"))
        );
        assert_eq!(
            Command::from_parts(Operation::Set, Some("k".into()), None),
            Err(ParseError::MissingField("value"))
        );
        assert_eq!(
            Command::from_parts(Operation::Get, Some(String::new()), None),
            Err(ParseError::EmptyKey)
        );
    }

    #[test]
    fn test_command_accessors() {
        let command = Command::set("name", "Ariz");
        assert_eq!(command.operation(), Operation::Set);
        assert_eq!(command.key(), "name");
        assert_eq!(command.value(), Some("Ariz"));

        let command = Command::del("name");
        assert_eq!(command.operation(), Operation::Del);
        assert_eq!(command.value(), None);
    }

    #[test]
    fn test_reply_display() {
        assert_eq!(Reply::Ok.to_string(), "OK");
        assert_eq!(Reply::Found("value1".into()).to_string(), "\"value1\"");
        assert_eq!(Reply::NotFound.to_string(), "Not Found");
        assert_eq!(Reply::Deleted.to_string(), "Deleted");
        assert_eq!(Reply::error("bad").to_string(), "ERROR: bad");
    }

    #[test]
    fn test_found_display_matches_text_reply() {
        use crate::protocol::{Codec, TextCodec};

        let reply = Reply::Found("a\u{1b}\"b\\c".into());
        assert_eq!(reply.to_string(), "\"a\u{1b}\\\"b\\\\c\"");

        // Control characters pass through unescaped, as on the wire
        let mut wire = TextCodec::new().encode_reply(&reply);
        assert_eq!(wire.pop(), Some(b'\n'));
        assert_eq!(wire, reply.to_string().into_bytes());
    }
}
