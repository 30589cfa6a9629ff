//! Serial Protocol Communication
//!
//! Implements the instrument's line-oriented text protocol: newline-terminated
//! ASCII commands, one reply line per command, with a literal `OK` expected
//! from mutating operations. A raw byte exchange is available for the few
//! binary interactions the firmware supports.
//!
//! All traffic flows through the [`Dispatcher`], which owns the transport and
//! guarantees that exactly one exchange is in flight at any instant.

pub mod command;
mod dispatcher;
mod error;
pub mod serial;
pub mod transport;

pub use command::{Command, Response};
pub use dispatcher::Dispatcher;
pub use error::ProtocolError;
pub use serial::{list_ports, PortInfo};
pub use transport::{ConnectionState, SerialTransport, Transport};

/// Fixed baud rate for the instrument link
pub const BAUD_RATE: u32 = 115_200;

/// Read/write timeout for a single exchange in milliseconds
pub const EXCHANGE_TIMEOUT_MS: u64 = 5000;

/// Delay after opening the port before the first exchange, giving the
/// device firmware time to initialize
pub const SETTLE_DELAY_MS: u64 = 500;

/// Upper bound on a raw (binary) response
pub const MAX_RAW_RESPONSE: usize = 256;
