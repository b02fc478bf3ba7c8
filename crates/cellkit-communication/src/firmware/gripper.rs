//! Servo gripper client
//!
//! The gripper's servo sits behind a microcontroller serving two HTTP GET
//! endpoints: `/cmd?arg0=..&arg1=..&arg2=..&arg3=..` for op-codes and
//! `/readSTS` for a loosely formatted status page.

use cellkit_core::{ConnectionError, ControllerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// `arg0` selecting the active servo id
const CMD_SELECT_ID: u32 = 0;
/// `arg0` for mode and motion op-codes
const CMD_CONTROL: u32 = 1;

const OP_OPEN: u32 = 1;
const OP_STOP: u32 = 2;
const OP_CLOSE: u32 = 6;
const OP_SPEED_UP: u32 = 7;
const OP_SPEED_DOWN: u32 = 8;
const OP_MODE_SERVO: u32 = 12;
const OP_MODE_MOTOR: u32 = 13;

/// Labels on the status page, in page order
const STATUS_LABELS: [&str; 11] = [
    "Active ID:",
    "Position:",
    "Device Mode:",
    "Voltage:",
    "Load:",
    "Speed:",
    "Temper:",
    "Speed Set:",
    "ID to Set:",
    "Mode:",
    "Torque",
];

const NUMERIC_LABELS: [&str; 6] = ["Position", "Voltage", "Load", "Speed", "Temper", "Speed Set"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GripperConfig {
    pub base_url: String,
    pub timeout_ms: u64,
    pub servo_id: u32,
    /// Default motor run time for open/close
    pub run_time_s: f64,
}

impl Default for GripperConfig {
    fn default() -> Self {
        Self {
            base_url: "http://192.168.4.1".to_string(),
            timeout_ms: 5000,
            servo_id: 1,
            run_time_s: 2.0,
        }
    }
}

/// One status value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusValue {
    Number(f64),
    Text(String),
}

/// Parsed status page, keyed by snake-cased label (`speed_set`, `device_mode`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GripperStatus {
    pub fields: BTreeMap<String, StatusValue>,
}

impl GripperStatus {
    /// Parse the `/readSTS` page
    ///
    /// Each label's value runs up to the next label found after it. Parsed
    /// sections are cut out before the next label is searched, so `Mode:`
    /// does not match inside `Device Mode:`. Numeric labels fall back to text
    /// when the value does not parse.
    pub fn parse(raw: &str) -> Self {
        let mut fields = BTreeMap::new();
        let mut text = raw.replace("<p>", " ");

        for (i, label) in STATUS_LABELS.iter().enumerate() {
            let Some(start) = text.find(label) else {
                continue;
            };
            let after = start + label.len();
            let end = STATUS_LABELS[i + 1..]
                .iter()
                .find_map(|next| text[after..].find(next).map(|idx| after + idx))
                .unwrap_or(text.len());

            let value = text[after..end].trim().to_string();
            let bare = label.trim_end_matches(':');
            let key = bare.replace(' ', "_").to_lowercase();
            let parsed = if NUMERIC_LABELS.contains(&bare) {
                value
                    .parse::<f64>()
                    .map(StatusValue::Number)
                    .unwrap_or(StatusValue::Text(value))
            } else {
                StatusValue::Text(value)
            };
            fields.insert(key, parsed);
            text.replace_range(start..end, "");
        }

        Self { fields }
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.fields.get(key) {
            Some(StatusValue::Number(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.fields.get(key) {
            Some(StatusValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Servo operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServoMode {
    Servo,
    Motor,
}

impl ServoMode {
    fn op_code(self) -> u32 {
        match self {
            Self::Servo => OP_MODE_SERVO,
            Self::Motor => OP_MODE_MOTOR,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Servo => "servo",
            Self::Motor => "motor",
        }
    }
}

#[derive(Debug)]
pub struct GripperClient {
    name: String,
    config: GripperConfig,
    http: reqwest::Client,
    connected: AtomicBool,
}

impl GripperClient {
    pub fn new(name: impl Into<String>, config: GripperConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .no_proxy()
            .build()
            .map_err(|e| ConnectionError::InvalidParameters {
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: name.into(),
            config,
            http,
            connected: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GripperConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get(&self, path: &str, query: &[(&str, u32)]) -> Result<String> {
        let result = async {
            let response = self
                .http
                .get(self.url(path))
                .query(query)
                .send()
                .await
                .and_then(|r| r.error_for_status())
                .map_err(|e| self.http_error(e))?;
            response.text().await.map_err(|e| self.http_error(e))
        }
        .await;
        self.connected.store(result.is_ok(), Ordering::SeqCst);
        result.map_err(Into::into)
    }

    fn http_error(&self, err: reqwest::Error) -> ConnectionError {
        if err.is_timeout() {
            ConnectionError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }
        } else if err.is_connect() {
            ConnectionError::FailedToOpen {
                port: self.config.base_url.clone(),
                reason: err.to_string(),
            }
        } else {
            ConnectionError::Io {
                reason: err.to_string(),
            }
        }
    }

    /// Send one op-code frame
    pub async fn send_command(&self, arg0: u32, arg1: u32, arg2: u32, arg3: u32) -> Result<String> {
        tracing::debug!("{} >> cmd {} {} {} {}", self.name, arg0, arg1, arg2, arg3);
        self.get(
            "cmd",
            &[("arg0", arg0), ("arg1", arg1), ("arg2", arg2), ("arg3", arg3)],
        )
        .await
    }

    pub async fn get_status(&self) -> Result<GripperStatus> {
        let raw = self.get("readSTS", &[]).await?;
        let status = GripperStatus::parse(&raw);
        if status.is_empty() {
            tracing::warn!("{}: status page carried no known labels", self.name);
        }
        Ok(status)
    }

    pub async fn select_id(&self, servo_id: u32) -> Result<()> {
        self.send_command(CMD_SELECT_ID, servo_id, 0, 0).await?;
        Ok(())
    }

    pub async fn set_mode(&self, mode: ServoMode) -> Result<()> {
        self.send_command(CMD_CONTROL, mode.op_code(), 0, 0).await?;
        Ok(())
    }

    /// Select the configured servo and put it in motor mode
    pub async fn connect(&self) -> Result<GripperStatus> {
        let pause = Duration::from_millis(200);
        self.select_id(self.config.servo_id).await?;
        tokio::time::sleep(pause).await;
        self.set_mode(ServoMode::Motor).await?;
        tokio::time::sleep(pause).await;

        let status = self.get_status().await?;
        let mode = status.text("mode").unwrap_or_default().to_lowercase();
        if mode != ServoMode::Motor.label() {
            return Err(ControllerError::CommandRejected {
                reason: format!("servo reports mode '{}'", mode),
            }
            .into());
        }
        tracing::info!("{}: servo {} in motor mode", self.name, self.config.servo_id);
        Ok(status)
    }

    /// Run the motor with `op` for `duration`, then stop it
    async fn run_motor_for(&self, op: u32, duration: Duration) -> Result<()> {
        self.send_command(CMD_CONTROL, op, 0, 0).await?;
        tokio::time::sleep(duration).await;
        self.send_command(CMD_CONTROL, OP_STOP, 0, 0).await?;
        Ok(())
    }

    pub async fn open(&self, duration: Duration) -> Result<()> {
        tracing::info!("{}: open for {:?}", self.name, duration);
        self.run_motor_for(OP_OPEN, duration).await
    }

    pub async fn close(&self, duration: Duration) -> Result<()> {
        tracing::info!("{}: close for {:?}", self.name, duration);
        self.run_motor_for(OP_CLOSE, duration).await
    }

    pub async fn speed_up(&self) -> Result<()> {
        self.send_command(CMD_CONTROL, OP_SPEED_UP, 0, 0).await?;
        Ok(())
    }

    pub async fn speed_down(&self) -> Result<()> {
        self.send_command(CMD_CONTROL, OP_SPEED_DOWN, 0, 0).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const PAGE: &str = "<p>Active ID: 1<p>Position: 2048<p>Device Mode: motor\
        <p>Voltage: 7.4<p>Load: 0<p>Speed: 0<p>Temper: 31<p>Speed Set: 1000\
        <p>ID to Set: 1<p>Mode: motor<p>Torque on";

    /// Minimal HTTP responder serving `body` to each request, recording request lines
    async fn http_peer(
        body: &'static str,
        requests: usize,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let task = tokio::spawn(async move {
            let mut lines = Vec::new();
            for _ in 0..requests {
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = sock.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                }
                let request = String::from_utf8_lossy(&buf);
                lines.push(request.lines().next().unwrap_or_default().to_string());
                let reply = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                sock.write_all(reply.as_bytes()).await.unwrap();
            }
            lines
        });
        (base, task)
    }

    #[test]
    fn test_parse_status_page() {
        let status = GripperStatus::parse(PAGE);
        assert_eq!(status.text("active_id"), Some("1"));
        assert_eq!(status.number("position"), Some(2048.0));
        assert_eq!(status.text("device_mode"), Some("motor"));
        assert_eq!(status.number("voltage"), Some(7.4));
        assert_eq!(status.number("speed"), Some(0.0));
        assert_eq!(status.number("speed_set"), Some(1000.0));
        assert_eq!(status.text("mode"), Some("motor"));
        assert_eq!(status.text("torque"), Some("on"));
    }

    #[test]
    fn test_parse_status_tolerates_garbage() {
        assert!(GripperStatus::parse("").is_empty());
        let status = GripperStatus::parse("Position: ??? Load: 3");
        assert_eq!(status.text("position"), Some("???"));
        assert_eq!(status.number("load"), Some(3.0));
    }

    #[tokio::test]
    async fn test_command_query_string() {
        let (base, server) = http_peer("OK", 1).await;
        let gripper = GripperClient::new(
            "gripper",
            GripperConfig {
                base_url: base,
                ..GripperConfig::default()
            },
        )
        .unwrap();

        gripper.speed_up().await.unwrap();
        assert!(gripper.is_connected());
        let lines = server.await.unwrap();
        assert_eq!(lines[0], "GET /cmd?arg0=1&arg1=7&arg2=0&arg3=0 HTTP/1.1");
    }

    #[tokio::test]
    async fn test_close_runs_then_stops() {
        let (base, server) = http_peer("OK", 2).await;
        let gripper = GripperClient::new(
            "gripper",
            GripperConfig {
                base_url: base,
                ..GripperConfig::default()
            },
        )
        .unwrap();

        gripper.close(Duration::from_millis(5)).await.unwrap();
        let lines = server.await.unwrap();
        assert!(lines[0].contains("arg1=6"));
        assert!(lines[1].contains("arg1=2"));
    }

    #[tokio::test]
    async fn test_connect_checks_motor_mode() {
        let (base, _server) = http_peer(PAGE, 3).await;
        let gripper = GripperClient::new(
            "gripper",
            GripperConfig {
                base_url: base,
                ..GripperConfig::default()
            },
        )
        .unwrap();
        let status = gripper.connect().await.unwrap();
        assert_eq!(status.text("mode"), Some("motor"));
    }
}
