//! In-process TinyG simulator
//!
//! Interprets the G-code subset the gantry driver emits and answers status
//! queries in the controller's plain-text format. Lets the cell run without
//! hardware attached and gives driver tests a deterministic peer.

use super::{Communicator, ConnectionParams};
use cellkit_core::{thread_safe, ConnectionError, Position, Result, ThreadSafe};

const SOFT_RESET: u8 = 0x18;

/// Observable simulator state
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorState {
    /// Machine position as the controller sees it
    pub position: Position,
    /// `G90` when true, `G91` when false
    pub absolute: bool,
    /// Auxiliary output driven by `M8`/`M9`
    pub aux_on: bool,
    /// Last programmed feed rate
    pub feed_rate: f64,
    /// `Run`, `Hold` or `Ready`
    pub machine_state: String,
    /// Every line and realtime byte received, in order
    pub received: Vec<String>,
    /// Number of soft resets seen
    pub resets: usize,
}

impl Default for SimulatorState {
    fn default() -> Self {
        Self {
            position: Position::default(),
            absolute: true,
            aux_on: false,
            feed_rate: 0.0,
            machine_state: "Ready".to_string(),
            received: Vec::new(),
            resets: 0,
        }
    }
}

impl SimulatorState {
    /// Received lines that are motion or mode commands
    pub fn gcode_lines(&self) -> Vec<&str> {
        self.received
            .iter()
            .map(String::as_str)
            .filter(|l| l.starts_with('G') || l.starts_with('M') || l.starts_with('$'))
            .collect()
    }
}

/// Simulated controller speaking the TinyG text protocol
#[derive(Debug)]
pub struct SimulatedTinyG {
    state: ThreadSafe<SimulatorState>,
    connected: bool,
    line_buf: String,
    outbox: Vec<u8>,
}

impl Default for SimulatedTinyG {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTinyG {
    pub fn new() -> Self {
        Self::with_state(thread_safe(SimulatorState::default()))
    }

    /// Share state with the caller so it can be inspected after the fact
    pub fn with_state(state: ThreadSafe<SimulatorState>) -> Self {
        Self {
            state,
            connected: false,
            line_buf: String::new(),
            outbox: Vec::new(),
        }
    }

    pub fn state(&self) -> ThreadSafe<SimulatorState> {
        self.state.clone()
    }

    fn reply(&mut self, line: &str) {
        self.outbox.extend_from_slice(line.as_bytes());
        self.outbox.push(b'\n');
    }

    fn realtime(&mut self, byte: u8) {
        let mut state = self.state.lock();
        state.received.push((byte as char).to_string());
        let answer = match byte {
            SOFT_RESET => {
                state.resets += 1;
                state.absolute = true;
                state.aux_on = false;
                state.machine_state = "Ready".to_string();
                "SYSTEM READY"
            }
            b'!' => {
                state.machine_state = "Hold".to_string();
                "ok"
            }
            _ => {
                state.machine_state = "Run".to_string();
                "ok"
            }
        };
        drop(state);
        self.reply(answer);
    }

    fn execute(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let mut state = self.state.lock();
        state.received.push(line.to_string());

        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let axes: Vec<(char, f64)> = words.filter_map(parse_word).collect();

        let mut replies: Vec<String> = Vec::new();
        match command {
            "G90" => state.absolute = true,
            "G91" => state.absolute = false,
            "G92" => {
                for &(axis, value) in &axes {
                    set_axis(&mut state.position, axis, value);
                }
            }
            "G0" | "G1" => {
                let absolute = state.absolute;
                for &(axis, value) in &axes {
                    if axis == 'F' {
                        state.feed_rate = value;
                    } else if absolute {
                        set_axis(&mut state.position, axis, value);
                    } else {
                        let current = axis_value(&state.position, axis);
                        set_axis(&mut state.position, axis, current + value);
                    }
                }
            }
            "M8" => state.aux_on = true,
            "M9" => state.aux_on = false,
            "$H" => state.position = Position::default(),
            "?" => {
                let p = state.position;
                replies.push(format!("X position: {:.3} mm", p.x));
                replies.push(format!("Y position: {:.3} mm", p.y));
                replies.push(format!("Z position: {:.3} mm", p.z));
                replies.push(format!("A position: {:.3} deg", p.a));
                replies.push(format!("Feed rate: {:.3} mm/min", state.feed_rate));
                replies.push("Velocity: 0.000 mm/min".to_string());
                replies.push(format!("Machine state: {}", state.machine_state));
            }
            other => {
                tracing::debug!("simulator ignoring '{}'", other);
            }
        }
        drop(state);

        replies.push("ok".to_string());
        for reply in replies {
            self.reply(&reply);
        }
    }
}

fn parse_word(word: &str) -> Option<(char, f64)> {
    let mut chars = word.chars();
    let axis = chars.next()?.to_ascii_uppercase();
    let value = chars.as_str().parse().ok()?;
    Some((axis, value))
}

fn axis_value(pos: &Position, axis: char) -> f64 {
    match axis {
        'X' => pos.x,
        'Y' => pos.y,
        'Z' => pos.z,
        'A' => pos.a,
        _ => 0.0,
    }
}

fn set_axis(pos: &mut Position, axis: char, value: f64) {
    match axis {
        'X' => pos.x = value,
        'Y' => pos.y = value,
        'Z' => pos.z = value,
        'A' => pos.a = value,
        _ => {}
    }
}

impl Communicator for SimulatedTinyG {
    fn connect(&mut self, _params: &ConnectionParams) -> Result<()> {
        self.connected = true;
        self.line_buf.clear();
        self.outbox.clear();
        tracing::info!("Simulated TinyG attached");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, data: &[u8]) -> Result<usize> {
        if !self.connected {
            return Err(ConnectionError::ConnectionLost {
                reason: "simulator is detached".to_string(),
            }
            .into());
        }

        for &byte in data {
            match byte {
                SOFT_RESET | b'!' | b'~' if self.line_buf.is_empty() => self.realtime(byte),
                b'\n' => {
                    let line = std::mem::take(&mut self.line_buf);
                    self.execute(&line);
                }
                b'\r' => {}
                _ => self.line_buf.push(byte as char),
            }
        }
        Ok(data.len())
    }

    fn receive(&mut self) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(ConnectionError::ConnectionLost {
                reason: "simulator is detached".to_string(),
            }
            .into());
        }
        Ok(std::mem::take(&mut self.outbox))
    }
}
