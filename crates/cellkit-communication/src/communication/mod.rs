//! Device transports
//!
//! A [`Communicator`] is one exclusive, line-oriented byte stream to a
//! machine. Concrete transports:
//! - [`serial::SerialCommunicator`] for USB/RS-232 controllers
//! - [`tcp::TcpCommunicator`] for controllers behind a serial-to-network bridge
//! - [`simulated::SimulatedTinyG`] for running without hardware
//!
//! [`channel::DeviceChannel`] wraps one communicator per machine and
//! serializes every exchange on it.

pub mod channel;
pub mod serial;
pub mod simulated;
pub mod tcp;

use cellkit_core::Result;
use serde::{Deserialize, Serialize};

pub use channel::{CommunicatorFactory, DeviceChannel};
pub use serial::{list_ports, SerialCommunicator, SerialPortInfo};
pub use simulated::{SimulatedTinyG, SimulatorState};
pub use tcp::TcpCommunicator;

/// Transport kind selected by a connection descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionDriver {
    /// Serial/USB port
    #[default]
    Serial,
    /// Raw TCP stream
    Tcp,
    /// In-process simulator
    Simulated,
}

impl std::fmt::Display for ConnectionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serial => write!(f, "serial"),
            Self::Tcp => write!(f, "tcp"),
            Self::Simulated => write!(f, "simulated"),
        }
    }
}

/// Per-machine transport descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionParams {
    /// Transport kind
    pub driver: ConnectionDriver,
    /// Serial device path (e.g. "/dev/ttyUSB0", "COM10")
    pub port: String,
    /// Serial baud rate
    pub baud_rate: u32,
    /// Host for TCP transports
    pub host: String,
    /// TCP port
    pub tcp_port: u16,
    /// Transport read/write timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            host: "127.0.0.1".to_string(),
            tcp_port: 8000,
            timeout_ms: 3000,
        }
    }
}

impl ConnectionParams {
    /// Serial descriptor
    pub fn serial(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            driver: ConnectionDriver::Serial,
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    /// TCP descriptor
    pub fn tcp(host: impl Into<String>, tcp_port: u16) -> Self {
        Self {
            driver: ConnectionDriver::Tcp,
            host: host.into(),
            tcp_port,
            ..Self::default()
        }
    }

    /// Simulator descriptor
    pub fn simulated() -> Self {
        Self {
            driver: ConnectionDriver::Simulated,
            port: "sim".to_string(),
            ..Self::default()
        }
    }

    /// Human-readable endpoint for logs and errors
    pub fn endpoint(&self) -> String {
        match self.driver {
            ConnectionDriver::Serial => format!("{}@{}", self.port, self.baud_rate),
            ConnectionDriver::Tcp => format!("{}:{}", self.host, self.tcp_port),
            ConnectionDriver::Simulated => "simulator".to_string(),
        }
    }
}

/// Low-level, synchronous line transport
///
/// Implementations must not block on `receive`: it returns whatever bytes
/// are already buffered, or an empty vector.
pub trait Communicator: Send {
    /// Open the transport
    fn connect(&mut self, params: &ConnectionParams) -> Result<()>;

    /// Close the transport; closing a closed transport is a no-op
    fn disconnect(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Write raw bytes
    fn send(&mut self, data: &[u8]) -> Result<usize>;

    /// Read whatever is currently buffered
    fn receive(&mut self) -> Result<Vec<u8>>;

    /// Discard stale input before a new exchange
    fn clear_input(&mut self) -> Result<()> {
        while !self.receive()?.is_empty() {}
        Ok(())
    }
}

/// Communicator that is never connected, used before the first connect
#[derive(Debug, Default)]
pub struct NoOpCommunicator;

impl NoOpCommunicator {
    pub fn new() -> Self {
        Self
    }
}

impl Communicator for NoOpCommunicator {
    fn connect(&mut self, _params: &ConnectionParams) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn send(&mut self, _data: &[u8]) -> Result<usize> {
        Ok(0)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Build a fresh transport for a descriptor
pub fn communicator_for(params: &ConnectionParams) -> Box<dyn Communicator> {
    match params.driver {
        ConnectionDriver::Serial => Box::new(SerialCommunicator::new()),
        ConnectionDriver::Tcp => Box::new(TcpCommunicator::new()),
        ConnectionDriver::Simulated => Box::new(SimulatedTinyG::new()),
    }
}
