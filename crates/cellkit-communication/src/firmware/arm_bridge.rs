//! Collaborative arm bridge client
//!
//! The arm is driven through a small bridge process next to its controller.
//! Each request is one JSON object on one line over TCP, answered by one
//! JSON line:
//!
//! ```text
//! >> {"command":"set_angles","angles":[0,0,0,0,0,0],"speed":50}
//! << {"status":"ok"}
//! ```

use cellkit_core::{ConnectionError, ControllerError, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Number of arm joints
pub const JOINTS: usize = 6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArmConfig {
    pub host: String,
    pub port: u16,
    pub timeout_ms: u64,
    /// Joint speed, 1 to 100
    pub speed: u32,
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            host: "10.163.187.60".to_string(),
            port: 8000,
            timeout_ms: 3000,
            speed: 50,
        }
    }
}

impl ArmConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum ArmRequest {
    SetAngle {
        #[serde(rename = "jointIndex")]
        joint_index: usize,
        #[serde(rename = "deltaValue")]
        delta_value: f64,
        speed: u32,
    },
    SetAngles {
        angles: [f64; JOINTS],
        speed: u32,
    },
    GetPosition,
}

#[derive(Debug, Clone, Deserialize)]
struct ArmReply {
    status: String,
    #[serde(default)]
    angles: Option<Vec<f64>>,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the arm bridge
///
/// Requests on one client are serialized, mirroring the gantry channel.
#[derive(Debug)]
pub struct ArmClient {
    name: String,
    config: ArmConfig,
    io_lock: Mutex<()>,
    connected: AtomicBool,
}

impl ArmClient {
    pub fn new(name: impl Into<String>, config: ArmConfig) -> Self {
        Self {
            name: name.into(),
            config,
            io_lock: Mutex::new(()),
            connected: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ArmConfig {
        &self.config
    }

    /// Whether the last exchange with the bridge succeeded
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Probe the bridge with a position query
    pub async fn connect(&self) -> Result<[f64; JOINTS]> {
        let angles = self.get_position().await?;
        tracing::info!("{}: bridge reachable at {}", self.name, self.config.endpoint());
        Ok(angles)
    }

    /// Move all joints to absolute angles in degrees
    pub async fn set_angles(&self, angles: [f64; JOINTS], speed: u32) -> Result<()> {
        self.request(&ArmRequest::SetAngles { angles, speed }).await?;
        Ok(())
    }

    /// Move one joint by a relative angle
    pub async fn set_angle(&self, joint_index: usize, delta_value: f64, speed: u32) -> Result<()> {
        if joint_index >= JOINTS {
            return Err(ControllerError::CommandRejected {
                reason: format!("joint index {} out of range", joint_index),
            }
            .into());
        }
        self.request(&ArmRequest::SetAngle {
            joint_index,
            delta_value,
            speed,
        })
        .await?;
        Ok(())
    }

    /// Current joint angles in degrees
    pub async fn get_position(&self) -> Result<[f64; JOINTS]> {
        let reply = self.request(&ArmRequest::GetPosition).await?;
        let angles = reply.angles.ok_or_else(|| ProtocolError::MalformedResponse {
            reason: "position reply carries no angles".to_string(),
        })?;
        <[f64; JOINTS]>::try_from(angles.as_slice()).map_err(|_| {
            ProtocolError::MalformedResponse {
                reason: format!("expected {} angles, got {}", JOINTS, angles.len()),
            }
            .into()
        })
    }

    async fn request(&self, request: &ArmRequest) -> Result<ArmReply> {
        let _io = self.io_lock.lock().await;
        let result = self.exchange(request).await;
        self.connected.store(
            !matches!(&result, Err(e) if e.is_connection_error()),
            Ordering::SeqCst,
        );
        result
    }

    async fn exchange(&self, request: &ArmRequest) -> Result<ArmReply> {
        let timeout_ms = self.config.timeout_ms;
        let window = Duration::from_millis(timeout_ms);
        let endpoint = self.config.endpoint();

        let mut line = serde_json::to_string(request)?;
        tracing::debug!("{} >> {}", self.name, line);
        line.push('\n');

        let mut stream = tokio::time::timeout(window, TcpStream::connect(&endpoint))
            .await
            .map_err(|_| ConnectionError::Timeout { timeout_ms })?
            .map_err(|e| ConnectionError::FailedToOpen {
                port: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let io = async {
            stream.write_all(line.as_bytes()).await?;
            let mut reader = BufReader::new(&mut stream);
            let mut reply = String::new();
            reader.read_line(&mut reply).await?;
            Ok::<_, std::io::Error>(reply)
        };
        let raw = tokio::time::timeout(window, io)
            .await
            .map_err(|_| ConnectionError::Timeout { timeout_ms })?
            .map_err(|e| ConnectionError::ConnectionLost {
                reason: e.to_string(),
            })?;
        tracing::debug!("{} << {}", self.name, raw.trim());

        if raw.trim().is_empty() {
            return Err(ConnectionError::ConnectionLost {
                reason: "bridge closed without replying".to_string(),
            }
            .into());
        }
        let reply: ArmReply =
            serde_json::from_str(raw.trim()).map_err(|e| ProtocolError::MalformedResponse {
                reason: e.to_string(),
            })?;
        if reply.status != "ok" {
            return Err(ControllerError::CommandRejected {
                reason: reply
                    .message
                    .clone()
                    .unwrap_or_else(|| format!("bridge answered '{}'", reply.status)),
            }
            .into());
        }
        Ok(reply)
    }
}
