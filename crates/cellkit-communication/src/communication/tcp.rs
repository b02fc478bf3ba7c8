//! TCP stream transport
//!
//! Same line framing as the serial transport, carried over a socket. Used
//! when a controller sits behind a serial-to-network bridge.

use super::serial::io_error;
use super::{Communicator, ConnectionDriver, ConnectionParams};
use cellkit_core::{ConnectionError, Result};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct TcpCommunicator {
    stream: Option<TcpStream>,
    timeout_ms: u64,
}

impl TcpCommunicator {
    pub fn new() -> Self {
        Self::default()
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or_else(|| {
            ConnectionError::ConnectionLost {
                reason: "socket is closed".to_string(),
            }
            .into()
        })
    }
}

impl Communicator for TcpCommunicator {
    fn connect(&mut self, params: &ConnectionParams) -> Result<()> {
        if params.driver != ConnectionDriver::Tcp {
            return Err(ConnectionError::InvalidParameters {
                reason: format!("tcp transport cannot open a {} endpoint", params.driver),
            }
            .into());
        }

        self.stream = None;
        let endpoint = params.endpoint();
        let timeout = Duration::from_millis(params.timeout_ms.max(1));
        let failed = |reason: String| ConnectionError::FailedToOpen {
            port: endpoint.clone(),
            reason,
        };

        let addr = (params.host.as_str(), params.tcp_port)
            .to_socket_addrs()
            .map_err(|e| failed(e.to_string()))?
            .next()
            .ok_or_else(|| failed("host did not resolve".to_string()))?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            tracing::warn!("Failed to connect to {}: {}", endpoint, e);
            failed(e.to_string())
        })?;
        stream
            .set_write_timeout(Some(timeout))
            .and_then(|_| stream.set_nonblocking(true))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| failed(e.to_string()))?;

        self.timeout_ms = params.timeout_ms;
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Write all of `data`, giving up after the connection timeout
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        let timeout_ms = self.timeout_ms;
        let deadline = Instant::now() + Duration::from_millis(timeout_ms.max(1));
        let stream = self.stream_mut()?;
        let mut written = 0;
        while written < data.len() {
            match stream.write(&data[written..]) {
                Ok(0) => {
                    return Err(ConnectionError::ConnectionLost {
                        reason: "peer closed the socket".to_string(),
                    }
                    .into())
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        tracing::warn!(
                            "Peer stopped reading, {} of {} bytes written",
                            written,
                            data.len()
                        );
                        return Err(ConnectionError::Timeout { timeout_ms }.into());
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => return Err(io_error(e, timeout_ms).into()),
            }
        }
        Ok(written)
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        let timeout_ms = self.timeout_ms;
        let stream = self.stream_mut()?;
        let mut out = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            match stream.read(&mut buf) {
                Ok(0) => {
                    if out.is_empty() {
                        return Err(ConnectionError::ConnectionLost {
                            reason: "peer closed the socket".to_string(),
                        }
                        .into());
                    }
                    break;
                }
                Ok(n) => out.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(io_error(e, timeout_ms).into()),
            }
        }
        Ok(out)
    }
}
