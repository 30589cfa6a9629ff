//! Command dispatcher
//!
//! The single serialization point for the transport. A dedicated I/O thread
//! owns the [`Transport`]; callers submit requests over a queue and await the
//! reply. Requests are served strictly in submission order, so two logical
//! callers (say, a program command and a telemetry tick) can never interleave
//! bytes on the wire: each exchange fully completes before the next begins.
//!
//! A long exchange therefore delays whatever is queued behind it by up to one
//! timeout window. That is the accepted cost of sharing one physical link.

use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::command::{Command, Response};
use super::error::ProtocolError;
use super::serial::{self, PortInfo};
use super::transport::{ConnectionState, SerialTransport, Transport};

/// Queue depth for pending requests; senders backpressure when full
const QUEUE_DEPTH: usize = 32;

enum Request {
    Open {
        port_name: String,
        reply: oneshot::Sender<bool>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    State {
        reply: oneshot::Sender<ConnectionState>,
    },
    Exchange {
        command: Command,
        reply: oneshot::Sender<Result<Response, ProtocolError>>,
    },
}

/// Handle to the I/O thread that owns the transport.
///
/// Cloning is cheap; every clone feeds the same queue. When the last handle
/// is dropped the queue closes and the I/O thread releases the port and
/// exits.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Request>,
}

impl Dispatcher {
    /// Spawn the dispatcher over a real serial transport.
    pub fn new() -> Self {
        Self::with_transport(Box::new(SerialTransport::new()))
    }

    /// Spawn the dispatcher over a caller-supplied transport. Tests use this
    /// to substitute a scripted channel.
    pub fn with_transport(transport: Box<dyn Transport>) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let spawned = thread::Builder::new()
            .name("rfgen-io".into())
            .spawn(move || io_loop(transport, rx));
        if let Err(e) = spawned {
            // The receiver died with the failed spawn, so every request on
            // this handle fails as NotConnected instead of panicking.
            warn!(error = %e, "failed to spawn dispatcher I/O thread");
        }
        Self { tx }
    }

    /// Open the link to the named port. Returns `false` on failure; the
    /// error detail is logged by the transport.
    pub async fn connect(&self, port_name: &str) -> bool {
        let (reply, rx) = oneshot::channel();
        let request = Request::Open {
            port_name: port_name.to_string(),
            reply,
        };
        if self.tx.send(request).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// Close the link. Safe to call when already closed.
    pub async fn disconnect(&self) {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Request::Close { reply }).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Current connection state as reported by the transport.
    pub async fn state(&self) -> ConnectionState {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(Request::State { reply }).await.is_err() {
            return ConnectionState::Disconnected;
        }
        rx.await.unwrap_or(ConnectionState::Disconnected)
    }

    /// Whether the link is open and ready for exchanges.
    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Submit one exchange and await its reply.
    pub async fn send(&self, command: Command) -> Result<Response, ProtocolError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Request::Exchange { command, reply })
            .await
            .map_err(|_| ProtocolError::NotConnected)?;
        rx.await.map_err(|_| ProtocolError::NotConnected)?
    }

    /// Send a text command line and expect a text reply.
    pub async fn send_line(&self, line: &str) -> Result<String, ProtocolError> {
        match self.send(Command::text(line)).await? {
            Response::Line(reply) => Ok(reply),
            Response::Raw(_) => Err(ProtocolError::Parse("expected a text reply".into())),
        }
    }

    /// Send raw bytes and expect a raw reply.
    pub async fn send_raw(&self, bytes: Vec<u8>) -> Result<Vec<u8>, ProtocolError> {
        match self.send(Command::Raw(bytes)).await? {
            Response::Raw(reply) => Ok(reply),
            Response::Line(_) => Err(ProtocolError::Parse("expected a raw reply".into())),
        }
    }

    /// Snapshot of available serial ports. Pure query, bypasses the queue.
    pub fn list_ports() -> Vec<PortInfo> {
        serial::list_ports()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn io_loop(mut transport: Box<dyn Transport>, mut rx: mpsc::Receiver<Request>) {
    debug!("dispatcher I/O thread started");
    while let Some(request) = rx.blocking_recv() {
        match request {
            Request::Open { port_name, reply } => {
                let _ = reply.send(transport.open(&port_name));
            }
            Request::Close { reply } => {
                transport.close();
                let _ = reply.send(());
            }
            Request::State { reply } => {
                let _ = reply.send(transport.state());
            }
            Request::Exchange { command, reply } => {
                // A caller that gave up waiting still gets its exchange run
                // to completion here; the send below just goes nowhere.
                let _ = reply.send(transport.exchange(&command));
            }
        }
    }
    transport.close();
    debug!("dispatcher I/O thread stopped");
}
