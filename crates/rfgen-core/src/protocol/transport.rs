//! Transport channel
//!
//! Owns the physical serial connection and the single exchange primitive:
//! write one command, read one reply. The transport has no knowledge of the
//! command vocabulary; that lives in the client modules.
//!
//! Connection state is owned exclusively here. Nothing else in the crate
//! mutates or caches the port handle.

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use tracing::{debug, warn};

use super::command::{Command, Response};
use super::error::ProtocolError;
use super::serial::{clear_buffers, configure_port, open_port};
use super::{EXCHANGE_TIMEOUT_MS, MAX_RAW_RESPONSE, SETTLE_DELAY_MS};

/// Interval between availability checks while waiting for reply bytes
const POLL_MS: u64 = 2;

/// Gap that ends a raw (binary) response once at least one byte has arrived
const RAW_INTER_BYTE_MS: u64 = 50;

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Port opened, settle delay in progress
    Connecting,
    /// Connected and ready for exchanges
    Connected,
}

/// Seam between the dispatcher and the physical link.
///
/// `exchange` blocks the calling thread until a reply arrives or the fixed
/// window lapses; the dispatcher confines those calls to its own I/O thread.
pub trait Transport: Send {
    /// Current connection state; the only source of truth for connectedness.
    fn state(&self) -> ConnectionState;

    /// Open and configure the link. Returns `false` on any failure rather
    /// than propagating an error; the state stays `Disconnected`.
    fn open(&mut self, port_name: &str) -> bool;

    /// Close the link. Idempotent; safe to call when already closed.
    fn close(&mut self);

    /// Write one command and read one reply. A silent device yields
    /// `Err(Timeout)` and leaves the channel usable; calling this on a
    /// closed channel is a contract violation reported as `NotConnected`.
    fn exchange(&mut self, command: &Command) -> Result<Response, ProtocolError>;
}

/// Transport over a real serial port.
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    state: ConnectionState,
}

impl SerialTransport {
    /// Create an unconnected transport.
    pub fn new() -> Self {
        Self {
            port: None,
            state: ConnectionState::Disconnected,
        }
    }
}

impl Default for SerialTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SerialTransport {
    fn state(&self) -> ConnectionState {
        self.state
    }

    fn open(&mut self, port_name: &str) -> bool {
        if self.port.is_some() {
            self.close();
        }
        self.state = ConnectionState::Connecting;

        let mut port = match open_port(port_name) {
            Ok(port) => port,
            Err(e) => {
                warn!(port = port_name, error = %e, "failed to open serial port");
                self.state = ConnectionState::Disconnected;
                return false;
            }
        };
        if let Err(e) = configure_port(port.as_mut()) {
            warn!(port = port_name, error = %e, "failed to configure serial port");
            self.state = ConnectionState::Disconnected;
            return false;
        }

        // Let the device firmware finish booting before the first exchange,
        // then drop whatever it printed while coming up.
        std::thread::sleep(Duration::from_millis(SETTLE_DELAY_MS));
        if let Err(e) = clear_buffers(port.as_mut()) {
            warn!(port = port_name, error = %e, "failed to clear serial buffers");
            self.state = ConnectionState::Disconnected;
            return false;
        }

        debug!(port = port_name, "serial link open");
        self.port = Some(port);
        self.state = ConnectionState::Connected;
        true
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("serial link closed");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn exchange(&mut self, command: &Command) -> Result<Response, ProtocolError> {
        let port = self.port.as_mut().ok_or(ProtocolError::NotConnected)?;

        // Stale bytes from an aborted exchange would desynchronize the
        // reply correlation; drop them before writing.
        clear_buffers(port.as_mut())?;

        let payload = command.wire_bytes();
        port.write_all(&payload)
            .map_err(|e| ProtocolError::TransportFault(e.to_string()))?;

        match command {
            Command::Text(line) => {
                debug!(command = %line, "exchange");
                let reply = read_line(port.as_mut())?;
                debug!(reply = %reply, "exchange complete");
                Ok(Response::Line(reply))
            }
            Command::Raw(bytes) => {
                debug!(len = bytes.len(), "raw exchange");
                let reply = read_raw(port.as_mut())?;
                debug!(len = reply.len(), "raw exchange complete");
                Ok(Response::Raw(reply))
            }
        }
    }
}

/// Read until the line terminator or the exchange window lapses.
///
/// Uses `bytes_to_read` polling so a silent device never parks the thread in
/// a blocking read for the full window at a time.
fn read_line(port: &mut dyn SerialPort) -> Result<String, ProtocolError> {
    let deadline = Instant::now() + Duration::from_millis(EXCHANGE_TIMEOUT_MS);
    let mut line: Vec<u8> = Vec::new();
    let mut buf = [0u8; 64];

    loop {
        if Instant::now() >= deadline {
            return Err(ProtocolError::Timeout);
        }

        let available = port
            .bytes_to_read()
            .map_err(|e| ProtocolError::TransportFault(e.to_string()))?
            as usize;
        if available == 0 {
            std::thread::sleep(Duration::from_millis(POLL_MS));
            continue;
        }

        let want = available.min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(0) => return Err(ProtocolError::TransportFault("link closed".into())),
            Ok(n) => {
                for &byte in &buf[..n] {
                    if byte == b'\n' {
                        if line.last() == Some(&b'\r') {
                            line.pop();
                        }
                        return Ok(String::from_utf8_lossy(&line).into_owned());
                    }
                    line.push(byte);
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(ProtocolError::TransportFault(e.to_string())),
        }
    }
}

/// Read a binary reply: up to [`MAX_RAW_RESPONSE`] bytes, ended by an
/// inter-byte gap once data has started flowing, bounded by the exchange
/// window overall.
fn read_raw(port: &mut dyn SerialPort) -> Result<Vec<u8>, ProtocolError> {
    let deadline = Instant::now() + Duration::from_millis(EXCHANGE_TIMEOUT_MS);
    let gap = Duration::from_millis(RAW_INTER_BYTE_MS);
    let mut response: Vec<u8> = Vec::new();
    let mut buf = [0u8; MAX_RAW_RESPONSE];
    let mut last_data = Instant::now();

    loop {
        if Instant::now() >= deadline {
            if response.is_empty() {
                return Err(ProtocolError::Timeout);
            }
            return Ok(response);
        }

        let available = port
            .bytes_to_read()
            .map_err(|e| ProtocolError::TransportFault(e.to_string()))?
            as usize;

        if available == 0 {
            if !response.is_empty() && last_data.elapsed() > gap {
                return Ok(response);
            }
            std::thread::sleep(Duration::from_millis(POLL_MS));
            continue;
        }

        let want = available.min(MAX_RAW_RESPONSE - response.len());
        match port.read(&mut buf[..want]) {
            Ok(0) => return Err(ProtocolError::TransportFault("link closed".into())),
            Ok(n) => {
                response.extend_from_slice(&buf[..n]);
                last_data = Instant::now();
                if response.len() >= MAX_RAW_RESPONSE {
                    return Ok(response);
                }
            }
            Err(ref e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(e) => return Err(ProtocolError::TransportFault(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let transport = SerialTransport::new();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn exchange_on_closed_channel_is_a_contract_violation() {
        let mut transport = SerialTransport::new();
        let result = transport.exchange(&Command::text("SYS:IDN?"));
        assert_eq!(result, Err(ProtocolError::NotConnected));
    }

    #[test]
    fn open_failure_is_observable_not_fatal() {
        let mut transport = SerialTransport::new();
        assert!(!transport.open("/dev/nonexistent-rfgen-port"));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn close_is_idempotent() {
        let mut transport = SerialTransport::new();
        transport.close();
        transport.close();
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }
}
