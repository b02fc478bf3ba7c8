//! Serial port transport
//!
//! Line transport over a USB or RS-232 serial device, used for the gantry's
//! G-code controller.

use super::{Communicator, ConnectionDriver, ConnectionParams};
use cellkit_core::{ConnectionError, Result};
use std::io::{self, Read, Write};
use std::time::Duration;

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM10")
    pub port_name: String,

    /// Port description (e.g., "USB FTDI Serial Port")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

impl SerialPortInfo {
    pub fn new(port_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            description: description.into(),
            manufacturer: None,
            vid: None,
            pid: None,
        }
    }
}

/// List serial ports that look like machine controllers
///
/// Keeps `COM*` on Windows, `/dev/ttyUSB*` and `/dev/ttyACM*` on Linux,
/// `/dev/cu.usbserial-*` and `/dev/cu.usbmodem*` on macOS.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        ConnectionError::Io {
            reason: format!("Failed to enumerate ports: {}", e),
        }
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_controller_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo::new(&port.port_name, describe(port));
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
                info.manufacturer = usb.manufacturer.clone();
            }
            info
        })
        .collect())
}

fn is_controller_port(port_name: &str) -> bool {
    if let Some(num) = port_name.strip_prefix("COM") {
        return !num.is_empty() && num.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial-")
        || port_name.starts_with("/dev/cu.usbmodem")
}

fn describe(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb) => format!(
            "USB {} {}",
            usb.manufacturer.as_deref().unwrap_or("Device"),
            usb.product.as_deref().unwrap_or("Serial Port")
        ),
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

/// Map a transport I/O failure into the connection taxonomy
pub(crate) fn io_error(err: io::Error, timeout_ms: u64) -> ConnectionError {
    match err.kind() {
        io::ErrorKind::TimedOut => ConnectionError::Timeout { timeout_ms },
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => ConnectionError::ConnectionLost {
            reason: err.to_string(),
        },
        _ => ConnectionError::Io {
            reason: err.to_string(),
        },
    }
}

/// Serial transport backed by the `serialport` crate
#[derive(Default)]
pub struct SerialCommunicator {
    port: Option<Box<dyn serialport::SerialPort>>,
    timeout_ms: u64,
}

impl SerialCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port.as_mut().ok_or_else(|| {
            ConnectionError::ConnectionLost {
                reason: "serial port is closed".to_string(),
            }
            .into()
        })
    }
}

impl std::fmt::Debug for SerialCommunicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialCommunicator")
            .field("open", &self.port.is_some())
            .field("timeout_ms", &self.timeout_ms)
            .finish()
    }
}

impl Communicator for SerialCommunicator {
    fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        if params.driver != ConnectionDriver::Serial {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("serial transport cannot open a {} endpoint", params.driver),
            }
            .into());
        }
        if params.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be non-zero".to_string(),
            }
            .into());
        }

        self.port = None;
        let port = serialport::new(&params.port, params.baud_rate)
            .timeout(Duration::from_millis(params.timeout_ms))
            .open()
            .map_err(|e| {
                tracing::warn!("Failed to open serial port {}: {}", params.port, e);
                ConnectionError::FailedToOpen {
                    port: params.port.clone(),
                    reason: e.to_string(),
                }
            })?;

        self.timeout_ms = params.timeout_ms;
        self.port = Some(port);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        // Dropping the handle closes the device
        self.port = None;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.port.is_some()
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let timeout_ms = self.timeout_ms;
        let port = self.port_mut()?;
        port.write_all(data)
            .and_then(|_| port.flush())
            .map_err(|e| io_error(e, timeout_ms))?;
        Ok(data.len())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let timeout_ms = self.timeout_ms;
        let port = self.port_mut()?;
        let waiting = port.bytes_to_read().map_err(|e| ConnectionError::Io {
            reason: e.to_string(),
        })? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; waiting];
        let n = port.read(&mut buf).map_err(|e| io_error(e, timeout_ms))?;
        buf.truncate(n);
        Ok(buf)
    }

    fn clear_input(&mut self) -> Result<()> {
        let port = self.port_mut()?;
        port.clear(serialport::ClearBuffer::Input)
            .map_err(|e| ConnectionError::Io {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
