//! Plain-Text Wire Profile
//!
//! The older line protocol: one whitespace-delimited command per line.
//!
//! ```text
//! SET <key> <value>\n
//! GET <key>\n
//! DEL <key>\n
//! ```
//!
//! The SET value is everything after the key up to the end of the line
//! (surrounding whitespace trimmed), so values may contain spaces. A trailing
//! `\r` before the newline is accepted.
//!
//! A found value is rendered in double quotes, with `"` and `\` escaped.

use super::codec::{Codec, ParseError, ParseResult};
use super::types::{quoted, reply_text, Command, Operation, Reply};

const NEWLINE: u8 = b'\n';

/// Codec for the plain-text profile.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl TextCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Splits off the first whitespace-delimited token.
fn split_token(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(end) => (&s[..end], s[end..].trim_start()),
        None => (s, ""),
    }
}

/// Parses a single line (without its terminator).
fn parse_line(line: &[u8]) -> ParseResult<Command> {
    let line = std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
    let line = line.trim();
    if line.is_empty() {
        return Err(ParseError::EmptyCommand);
    }

    let (verb, rest) = split_token(line);
    let operation: Operation = verb.parse()?;
    let (key, rest) = split_token(rest);
    let key = (!key.is_empty()).then(|| key.to_string());

    match operation {
        Operation::Set => {
            let value = (!rest.is_empty()).then(|| rest.to_string());
            Command::from_parts(operation, key, value)
        }
        Operation::Get | Operation::Del => {
            if !rest.is_empty() {
                return Err(ParseError::UnexpectedArguments {
                    operation: operation.as_str(),
                    extra: rest.to_string(),
                });
            }
            Command::from_parts(operation, key, None)
        }
    }
}

impl Codec for TextCodec {
    /// Blank lines between commands are skipped and counted as consumed.
    fn decode(&self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        let mut start = 0;
        while let Some(offset) = buf[start..].iter().position(|&b| b == NEWLINE) {
            let end = start + offset;
            let line = &buf[start..end];
            if line.iter().all(u8::is_ascii_whitespace) {
                start = end + 1;
                continue;
            }

            let command = parse_line(line)?;
            return Ok(Some((command, end + 1)));
        }

        Ok(None)
    }

    /// A final line without a newline is still a complete command.
    fn decode_eof(&self, buf: &[u8]) -> ParseResult<Option<(Command, usize)>> {
        match self.decode(buf)? {
            Some(decoded) => Ok(Some(decoded)),
            None if buf.is_empty() => Ok(None),
            None => Ok(Some((parse_line(buf)?, buf.len()))),
        }
    }

    fn encode_reply_into(&self, reply: &Reply, buf: &mut Vec<u8>) {
        match reply {
            Reply::Ok => buf.extend_from_slice(reply_text::OK.as_bytes()),
            Reply::Found(value) => buf.extend_from_slice(quoted(value).as_bytes()),
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
