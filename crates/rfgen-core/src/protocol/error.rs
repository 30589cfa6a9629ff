//! Protocol errors

use thiserror::Error;

/// Errors surfaced by the device protocol layer.
///
/// `Timeout` is an expected, retryable outcome: the device stayed silent but
/// the link itself is still usable. `TransportFault` means the link is likely
/// gone and retrying without reconnecting will not help.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Operation attempted while the channel is closed
    #[error("device not connected")]
    NotConnected,

    /// The device stayed silent for the whole exchange window
    #[error("device did not answer within the timeout window")]
    Timeout,

    /// I/O-level failure; the link is likely gone
    #[error("transport fault: {0}")]
    TransportFault(String),

    /// Client-side input rejected before any bytes were written
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The device answered a mutating command with something other than `OK`
    #[error("device rejected {operation}: {reply}")]
    DeviceRejected {
        /// The client operation the device refused
        operation: &'static str,
        /// Verbatim diagnostic text from the device
        reply: String,
    },

    /// A reply that should have carried a typed value did not parse
    #[error("unparsable reply: {0}")]
    Parse(String),
}
