//! Direct RF control
//!
//! One-line commands for frequency, power, and output state, plus device
//! identification and calibration persistence. Range enforcement (10 MHz to
//! 6 GHz, -20 to +15 dBm) is the device's job; an out-of-range value comes
//! back as a rejection diagnostic, not a client-side error.

use crate::protocol::{Dispatcher, ProtocolError};

/// Client for immediate RF output control.
#[derive(Clone)]
pub struct RfClient {
    dispatcher: Dispatcher,
}

impl RfClient {
    /// Create a client over the given dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    async fn expect_ok(
        &self,
        operation: &'static str,
        command: &str,
    ) -> Result<(), ProtocolError> {
        let reply = self.dispatcher.send_line(command).await?;
        if reply == "OK" {
            Ok(())
        } else {
            Err(ProtocolError::DeviceRejected {
                operation,
                reply,
            })
        }
    }

    /// Set the output frequency in Hz.
    pub async fn set_frequency(&self, hz: u64) -> Result<(), ProtocolError> {
        self.expect_ok("set_frequency", &format!("RF:FREQ {hz}"))
            .await
    }

    /// Read back the output frequency in Hz.
    pub async fn frequency(&self) -> Result<u64, ProtocolError> {
        let reply = self.dispatcher.send_line("RF:FREQ?").await?;
        reply
            .trim()
            .parse()
            .map_err(|_| ProtocolError::Parse(format!("bad frequency reply: {reply:?}")))
    }

    /// Set the output power in dBm.
    pub async fn set_power(&self, dbm: i32) -> Result<(), ProtocolError> {
        self.expect_ok("set_power", &format!("RF:POWER {dbm}")).await
    }

    /// Read back the output power in dBm.
    pub async fn power(&self) -> Result<i32, ProtocolError> {
        let reply = self.dispatcher.send_line("RF:POWER?").await?;
        reply
            .trim()
            .parse()
            .map_err(|_| ProtocolError::Parse(format!("bad power reply: {reply:?}")))
    }

    /// Switch the RF output on or off.
    pub async fn set_output(&self, on: bool) -> Result<(), ProtocolError> {
        let command = if on { "RF:OUTPUT ON" } else { "RF:OUTPUT OFF" };
        self.expect_ok("set_output", command).await
    }

    /// Whether the RF output is currently enabled.
    pub async fn output(&self) -> Result<bool, ProtocolError> {
        let reply = self.dispatcher.send_line("RF:OUTPUT?").await?;
        match reply.trim() {
            "ON" => Ok(true),
            "OFF" => Ok(false),
            other => Err(ProtocolError::Parse(format!("bad output reply: {other:?}"))),
        }
    }

    /// Device identification string, verbatim.
    pub async fn identify(&self) -> Result<String, ProtocolError> {
        self.dispatcher.send_line("SYS:IDN?").await
    }

    /// Reboot the device. The link usually needs reopening afterwards.
    pub async fn reset(&self) -> Result<(), ProtocolError> {
        self.expect_ok("reset", "SYS:RESET").await
    }

    /// Begin a calibration run.
    pub async fn calibration_start(&self) -> Result<(), ProtocolError> {
        self.expect_ok("calibration_start", "CAL:START").await
    }

    /// Persist calibration data to device FRAM.
    pub async fn calibration_save(&self) -> Result<(), ProtocolError> {
        self.expect_ok("calibration_save", "CAL:SAVE").await
    }
}
