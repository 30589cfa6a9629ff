//! Serial port handling
//!
//! Port enumeration and low-level open/configure helpers for the instrument
//! link. Link parameters are fixed: 115200 baud, 8-N-1, no flow control.

use std::time::Duration;

use serialport::{SerialPort, SerialPortInfo, SerialPortType};

use super::{ProtocolError, BAUD_RATE, EXCHANGE_TIMEOUT_MS};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyACM0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let (vid, pid, product, serial_number) = match info.port_type {
            SerialPortType::UsbPort(usb) => {
                (Some(usb.vid), Some(usb.pid), usb.product, usb.serial_number)
            }
            _ => (None, None, None, None),
        };

        Self {
            name: info.port_name,
            vid,
            pid,
            product,
            serial_number,
        }
    }
}

/// Sort key so that ttyACM* ports come first (numeric suffix order), then
/// ttyUSB*, then everything else by name. CDC-ACM is where the instrument's
/// USB interface shows up, so those are the likeliest candidates.
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let base = name.rsplit('/').next().unwrap_or(name);
    let suffix_num = |prefix: &str| {
        base.strip_prefix(prefix)
            .map(|rest| rest.parse::<usize>().unwrap_or(usize::MAX))
    };
    if let Some(num) = suffix_num("ttyACM") {
        (0, num, base.to_string())
    } else if let Some(num) = suffix_num("ttyUSB") {
        (1, num, base.to_string())
    } else {
        (2, 0, base.to_string())
    }
}

/// Snapshot of available serial ports in deterministic order. No side
/// effects on the link.
pub fn list_ports() -> Vec<PortInfo> {
    let mut ports: Vec<PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(PortInfo::from)
        .collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Open a serial port at the fixed link rate.
///
/// The per-call timeout matches the exchange window; reads are additionally
/// bounded by the exchange deadline in the transport.
pub fn open_port(name: &str) -> Result<Box<dyn SerialPort>, ProtocolError> {
    serialport::new(name, BAUD_RATE)
        .timeout(Duration::from_millis(EXCHANGE_TIMEOUT_MS))
        .open()
        .map_err(|e| ProtocolError::TransportFault(e.to_string()))
}

/// Configure a port for instrument communication: 8 data bits, no parity,
/// one stop bit, no flow control.
pub fn configure_port(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.set_data_bits(serialport::DataBits::Eight)
        .map_err(|e| ProtocolError::TransportFault(e.to_string()))?;
    port.set_parity(serialport::Parity::None)
        .map_err(|e| ProtocolError::TransportFault(e.to_string()))?;
    port.set_stop_bits(serialport::StopBits::One)
        .map_err(|e| ProtocolError::TransportFault(e.to_string()))?;
    port.set_flow_control(serialport::FlowControl::None)
        .map_err(|e| ProtocolError::TransportFault(e.to_string()))?;
    Ok(())
}

/// Clear both serial buffers.
pub fn clear_buffers(port: &mut dyn SerialPort) -> Result<(), ProtocolError> {
    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| ProtocolError::TransportFault(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports_does_not_panic() {
        let ports = list_ports();
        for port in &ports {
            println!("Found port: {} - {:?}", port.name, port.product);
        }
    }

    #[test]
    fn likely_instrument_ports_lead_the_listing() {
        // A typical bench machine: onboard UART, a USB-serial adapter or
        // two, and the generator itself on CDC-ACM.
        let mut names = vec![
            "/dev/ttyS0",
            "/dev/ttyUSB2",
            "/dev/ttyACM1",
            "/dev/rfcomm0",
            "/dev/ttyACM0",
            "/dev/ttyUSB0",
        ];
        names.sort_by_key(|n| port_sort_key(n));
        assert_eq!(
            names,
            vec![
                "/dev/ttyACM0",
                "/dev/ttyACM1",
                "/dev/ttyUSB0",
                "/dev/ttyUSB2",
                "/dev/rfcomm0",
                "/dev/ttyS0",
            ]
        );
    }

    #[test]
    fn numeric_suffixes_sort_numerically_not_lexically() {
        let mut names = vec!["/dev/ttyACM10", "/dev/ttyACM9", "/dev/ttyACM2"];
        names.sort_by_key(|n| port_sort_key(n));
        assert_eq!(names, vec!["/dev/ttyACM2", "/dev/ttyACM9", "/dev/ttyACM10"]);
    }
}
