//! Command and response values
//!
//! Immutable payloads exchanged with the instrument. A text command carries
//! no line terminator; the transport appends it on the wire.

/// One command payload, never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// ASCII command line (the transport appends the newline)
    Text(String),
    /// Raw byte payload, answered by a bounded binary buffer
    Raw(Vec<u8>),
}

impl Command {
    /// Build a text command from anything string-like.
    pub fn text(line: impl Into<String>) -> Self {
        Command::Text(line.into())
    }

    /// Bytes exactly as written to the wire.
    pub fn wire_bytes(&self) -> Vec<u8> {
        match self {
            Command::Text(line) => {
                let mut bytes = line.as_bytes().to_vec();
                bytes.push(b'\n');
                bytes
            }
            Command::Raw(bytes) => bytes.clone(),
        }
    }
}

/// One reply, consumed by exactly one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Decoded reply line, terminator stripped
    Line(String),
    /// Raw byte buffer
    Raw(Vec<u8>),
}

impl Response {
    /// The reply line, if this was a text response.
    pub fn as_line(&self) -> Option<&str> {
        match self {
            Response::Line(line) => Some(line),
            Response::Raw(_) => None,
        }
    }
}
