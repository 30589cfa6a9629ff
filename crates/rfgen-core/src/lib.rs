//! # rfgen Core Library
//!
//! Protocol layer for controlling a benchtop RF signal generator over a
//! point-to-point serial link.

#![warn(missing_docs)]

//!
//! This library provides:
//! - Serial transport with a single command/response exchange primitive
//! - A dispatcher that serializes concurrent callers onto one physical link
//! - The device's program vocabulary (step upload, run/pause/stop)
//! - A background telemetry poller with a latest-sample cache and event fan-out
//! - Direct RF control (frequency, power, output state, calibration)
//!
//! ## Example
//!
//! ```rust,ignore
//! use rfgen_core::prelude::*;
//!
//! let dispatcher = Dispatcher::new();
//! if dispatcher.connect("/dev/ttyACM0").await {
//!     let programs = ProgramClient::new(dispatcher.clone());
//!     programs.create("sweep1").await?;
//!     programs.run().await?;
//! }
//! ```

pub mod monitor;
pub mod program;
pub mod protocol;
pub mod rf;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::monitor::{Monitor, TelemetrySample};
    pub use crate::program::{ProgramClient, ProgramStep};
    pub use crate::protocol::{
        Command, ConnectionState, Dispatcher, ProtocolError, Response,
    };
    pub use crate::rf::RfClient;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
