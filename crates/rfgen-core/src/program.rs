//! Program protocol client
//!
//! Implements the device's `PROG:` vocabulary on top of the dispatcher:
//! named, device-resident programs made of sweep steps. The device is the
//! source of truth; this client keeps no copy of uploaded steps.
//!
//! Mutating operations expect a literal `OK` reply. Anything else comes back
//! as [`ProtocolError::DeviceRejected`] carrying the verbatim device text.
//! Nothing here retries automatically; retry policy belongs to the caller.

use serde::{Deserialize, Serialize};

use crate::protocol::{Dispatcher, ProtocolError};

/// One sweep step of a device-resident program.
///
/// Identity is positional within the named program. Frequencies are sent as
/// whole Hz with the fractional part truncated, not rounded; callers that
/// care about sub-Hz precision must round before building the step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgramStep {
    /// Sweep start frequency in Hz
    pub start_hz: f64,
    /// Sweep stop frequency in Hz
    pub stop_hz: f64,
    /// Ramp time from start to stop, in seconds
    pub ramp_secs: f64,
    /// Dwell time at the stop frequency, in seconds
    pub dwell_secs: f64,
    /// Output power in dBm
    pub power_dbm: i32,
}

/// Client for program lifecycle and step upload.
#[derive(Clone)]
pub struct ProgramClient {
    dispatcher: Dispatcher,
}

fn validate_name(name: &str) -> Result<(), ProtocolError> {
    if name.trim().is_empty() {
        return Err(ProtocolError::InvalidArgument(
            "program name cannot be empty".into(),
        ));
    }
    Ok(())
}

fn step_command(name: &str, step: &ProgramStep) -> String {
    format!(
        "PROG:STEP {} {} {} {} {} {}",
        name,
        step.start_hz as i64,
        step.stop_hz as i64,
        step.ramp_secs,
        step.dwell_secs,
        step.power_dbm
    )
}

impl ProgramClient {
    /// Create a client over the given dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    async fn expect_ok(
        &self,
        operation: &'static str,
        command: String,
    ) -> Result<(), ProtocolError> {
        let reply = self.dispatcher.send_line(&command).await?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(ProtocolError::DeviceRejected { operation, reply })
        }
    }

    /// Create a new named program on the device.
    pub async fn create(&self, name: &str) -> Result<(), ProtocolError> {
        validate_name(name)?;
        self.expect_ok("create", format!("PROG:NEW {name}")).await
    }

    /// Delete a program from the device.
    pub async fn delete(&self, name: &str) -> Result<(), ProtocolError> {
        validate_name(name)?;
        self.expect_ok("delete", format!("PROG:DEL {name}")).await
    }

    /// Persist a program to device storage.
    pub async fn save(&self, name: &str) -> Result<(), ProtocolError> {
        validate_name(name)?;
        self.expect_ok("save", format!("PROG:SAVE {name}")).await
    }

    /// Load a program from device storage.
    pub async fn load(&self, name: &str) -> Result<(), ProtocolError> {
        validate_name(name)?;
        self.expect_ok("load", format!("PROG:LOAD {name}")).await
    }

    /// Start executing the loaded program.
    pub async fn run(&self) -> Result<(), ProtocolError> {
        self.expect_ok("run", "PROG:RUN".to_string()).await
    }

    /// Pause the running program.
    pub async fn pause(&self) -> Result<(), ProtocolError> {
        self.expect_ok("pause", "PROG:PAUSE".to_string()).await
    }

    /// Stop the running program.
    pub async fn stop(&self) -> Result<(), ProtocolError> {
        self.expect_ok("stop", "PROG:STOP".to_string()).await
    }

    /// Append a step to the named program.
    pub async fn add_step(&self, name: &str, step: &ProgramStep) -> Result<(), ProtocolError> {
        validate_name(name)?;
        self.expect_ok("add_step", step_command(name, step)).await
    }

    /// Remove all steps from the named program.
    pub async fn clear_steps(&self, name: &str) -> Result<(), ProtocolError> {
        validate_name(name)?;
        self.expect_ok("clear_steps", format!("PROG:CLEAR {name}"))
            .await
    }

    /// Execution status, verbatim from the device.
    pub async fn status(&self) -> Result<String, ProtocolError> {
        self.dispatcher.send_line("PROG:STATUS?").await
    }

    /// Program listing, verbatim from the device.
    pub async fn list(&self) -> Result<String, ProtocolError> {
        self.dispatcher.send_line("PROG:LIST?").await
    }
}
