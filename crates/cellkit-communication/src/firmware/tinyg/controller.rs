//! TinyG gantry controller
//!
//! Stateful driver for the four-axis gantry. Owns the machine's
//! [`DeviceChannel`], the tracked tool end, the tool holders and the named
//! locations. All wire traffic goes through the channel, so commands from
//! concurrent callers are serialized per machine.

use super::motion::{MotionHandle, MotionTracker};
use super::status_parser::StatusParser;
use crate::communication::{ConnectionParams, DeviceChannel};
use cellkit_core::{
    thread_safe_rw, ControllerError, Holder, Location, Position, Result, ThreadSafeRw, ToolEnd,
    Waypoint,
};
use cellkit_planner::PathPlanner;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const SOFT_RESET: u8 = 0x18;
const FEED_HOLD: u8 = b'!';
const CYCLE_START: u8 = b'~';

/// Dwell times and speed for the tool-change sequence, in seconds and mm/min
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolChangeConfig {
    /// Settle after reaching the approach pose
    pub approach_dwell_s: f64,
    /// Settle after seating
    pub seat_dwell_s: f64,
    /// How long the latch output stays energized
    pub unlock_s: f64,
    /// Settle after the latch cycles
    pub release_dwell_s: f64,
    /// Feed rate for every tool-change move
    pub speed: f64,
}

impl Default for ToolChangeConfig {
    fn default() -> Self {
        Self {
            approach_dwell_s: 10.0,
            seat_dwell_s: 3.0,
            unlock_s: 1.0,
            release_dwell_s: 1.0,
            speed: 2000.0,
        }
    }
}

impl ToolChangeConfig {
    /// All dwells zero, for simulators and tests
    pub fn immediate() -> Self {
        Self {
            approach_dwell_s: 0.0,
            seat_dwell_s: 0.0,
            unlock_s: 0.0,
            release_dwell_s: 0.0,
            ..Self::default()
        }
    }
}

/// Gantry driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    /// Wait between writing a line and draining replies
    pub settle_ms: u64,
    /// Wait after a soft reset
    pub reset_settle_ms: u64,
    /// Feed rate used when a caller gives none
    pub default_speed: f64,
    pub tool_change: ToolChangeConfig,
}

impl Default for GantryConfig {
    fn default() -> Self {
        Self {
            settle_ms: 50,
            reset_settle_ms: 200,
            default_speed: 2000.0,
            tool_change: ToolChangeConfig::default(),
        }
    }
}

impl GantryConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

pub(crate) fn seconds(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// Last reported motion status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GantryStatus {
    pub feed_rate: f64,
    pub velocity: f64,
    pub machine_state: Option<String>,
}

/// Everything the driver tracks about the gantry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GantryState {
    pub toolend: ToolEnd,
    #[serde(default)]
    pub holders: Vec<Holder>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(skip)]
    pub status: GantryStatus,
}

impl GantryState {
    pub fn holder(&self, name: &str) -> Option<&Holder> {
        self.holders.iter().find(|h| h.name == name)
    }

    pub fn holder_mut(&mut self, name: &str) -> Option<&mut Holder> {
        self.holders.iter_mut().find(|h| h.name == name)
    }

    /// Every place a tool id is recorded: holders by name, plus "toolend"
    pub fn tool_locations(&self, tool: &str) -> Vec<String> {
        let mut places: Vec<String> = self
            .holders
            .iter()
            .filter(|h| h.tool.as_deref() == Some(tool))
            .map(|h| h.name.clone())
            .collect();
        if self.toolend.tool.as_deref() == Some(tool) {
            places.push("toolend".to_string());
        }
        places
    }
}

/// Status snapshot returned by [`GantryController::get_info`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GantryInfo {
    pub connected: bool,
    pub in_motion: bool,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub a: f64,
    pub feed_rate: f64,
    pub velocity: f64,
    pub machine_state: Option<String>,
    pub tool: Option<String>,
}

/// Coarse driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GantryMachineState {
    Disconnected,
    Idle,
    InMotion,
}

/// Called with the new state after every bookkeeping change
pub type StateListener = Arc<dyn Fn(&GantryState) + Send + Sync>;

type Listeners = Arc<RwLock<HashMap<String, StateListener>>>;

/// Hand a snapshot to every listener; no state lock is held during the calls
fn notify_listeners(state: &ThreadSafeRw<GantryState>, listeners: &Listeners) {
    let snapshot = state.read().clone();
    let listeners: Vec<StateListener> = listeners.read().values().cloned().collect();
    for listener in listeners {
        listener(&snapshot);
    }
}

pub struct GantryController {
    name: String,
    pub(crate) channel: Arc<DeviceChannel>,
    pub(crate) config: GantryConfig,
    pub(crate) state: ThreadSafeRw<GantryState>,
    motion: Arc<MotionTracker>,
    listeners: Listeners,
    /// Serializes whole attach/detach sequences
    pub(crate) tool_change_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for GantryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GantryController")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("state", &*self.state.read())
            .finish()
    }
}

/// Axis words shared by move and set-position commands
fn axis_words(p: &Position) -> String {
    format!("X{:.3} Y{:.3} Z{:.3} A{:.3}", p.x, p.y, p.z, p.a)
}

impl GantryController {
    pub fn new(name: impl Into<String>, config: GantryConfig) -> Self {
        let name = name.into();
        let channel = DeviceChannel::new(name.clone());
        Self::with_channel(name, config, channel)
    }

    /// Driver over a caller-built channel
    pub fn with_channel(name: impl Into<String>, config: GantryConfig, channel: DeviceChannel) -> Self {
        Self {
            name: name.into(),
            channel: Arc::new(channel),
            config,
            state: thread_safe_rw(GantryState::default()),
            motion: Arc::new(MotionTracker::new()),
            listeners: Arc::new(RwLock::new(HashMap::new())),
            tool_change_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Builder-style persisted state
    pub fn with_state(self, state: GantryState) -> Self {
        *self.state.write() = state;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &GantryConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    pub fn is_in_motion(&self) -> bool {
        self.motion.is_in_motion()
    }

    pub fn machine_state(&self) -> GantryMachineState {
        if !self.is_connected() {
            GantryMachineState::Disconnected
        } else if self.is_in_motion() {
            GantryMachineState::InMotion
        } else {
            GantryMachineState::Idle
        }
    }

    /// Copy of the tracked state
    pub fn snapshot(&self) -> GantryState {
        self.state.read().clone()
    }

    pub fn toolend(&self) -> ToolEnd {
        self.state.read().toolend.clone()
    }

    pub fn holders(&self) -> Vec<Holder> {
        self.state.read().holders.clone()
    }

    pub fn locations(&self) -> Vec<Location> {
        self.state.read().locations.clone()
    }

    /// Register a state listener under a key, replacing any previous one
    pub fn subscribe(&self, key: impl Into<String>, listener: StateListener) {
        self.listeners.write().insert(key.into(), listener);
    }

    pub fn unsubscribe(&self, key: &str) {
        self.listeners.write().remove(key);
    }

    pub(crate) fn notify_state_change(&self) {
        notify_listeners(&self.state, &self.listeners);
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(ControllerError::NotConnected {
                machine: self.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Open the channel and resync the controller origin to the tracked position
    pub async fn connect(&self, params: &ConnectionParams) -> Result<()> {
        self.channel.connect(params).await?;
        let position = self.state.read().toolend.position;
        self.channel
            .send(&format!("G92 {}", axis_words(&position)), self.config.settle())
            .await?;
        tracing::info!("{}: origin resynced to {}", self.name, position);
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.channel.disconnect().await
    }

    /// Send a raw line and return whatever replies arrived
    pub async fn send_command(&self, line: &str, settle: Option<Duration>) -> Result<Vec<String>> {
        self.ensure_connected()?;
        self.channel
            .send(line, settle.unwrap_or_else(|| self.config.settle()))
            .await
    }

    /// Query and merge controller status
    ///
    /// Channel failures degrade to a disconnected report built from the last
    /// known values instead of an error.
    pub async fn get_info(&self) -> GantryInfo {
        let reply = match self.channel.send("?", self.config.settle()).await {
            Ok(lines) => Some(lines),
            Err(e) => {
                tracing::warn!("{}: status query failed: {}", self.name, e);
                None
            }
        };

        let (info, moved) = {
            let mut state = self.state.write();
            let before = state.toolend.position;
            if let Some(lines) = &reply {
                let report = StatusParser::parse_reply(lines);
                state.toolend.position = report.merge_position(state.toolend.position);
                if let Some(feed) = report.feed_rate {
                    state.status.feed_rate = feed;
                }
                if let Some(velocity) = report.velocity {
                    state.status.velocity = velocity;
                }
                if report.machine_state.is_some() {
                    state.status.machine_state = report.machine_state;
                }
            }

            let p = state.toolend.position;
            let info = GantryInfo {
                connected: reply.is_some(),
                in_motion: self.is_in_motion(),
                x: p.x,
                y: p.y,
                z: p.z,
                a: p.a,
                feed_rate: state.status.feed_rate,
                velocity: state.status.velocity,
                machine_state: state.status.machine_state.clone(),
                tool: state.toolend.tool.clone(),
            };
            (info, p != before)
        };

        if moved {
            self.notify_state_change();
        }
        info
    }

    /// Absolute move on a background task
    ///
    /// Returns as soon as the task is spawned. The tracked position is
    /// updated once the controller has taken the move command.
    pub fn goto(&self, target: Position, speed: f64) -> Result<MotionHandle> {
        self.ensure_connected()?;

        let channel = self.channel.clone();
        let state = self.state.clone();
        let settle = self.config.settle();
        let guard = self.motion.begin();
        let name = self.name.clone();
        let listeners = self.listeners.clone();

        let task = tokio::spawn(async move {
            let _guard = guard;
            channel.send("G90", settle).await?;
            channel
                .send(&format!("G1 {} F{:.0}", axis_words(&target), speed), settle)
                .await?;
            state.write().toolend.position = target;
            notify_listeners(&state, &listeners);
            tracing::debug!("{}: reached {}", name, target);
            Ok(target)
        });
        self.motion.track(&task);

        tracing::info!("{}: goto {} F{:.0}", self.name, target, speed);
        Ok(MotionHandle::new(task))
    }

    /// Relative move; returns once the command has been sent
    pub async fn step(&self, delta: Position, speed: f64) -> Result<Position> {
        self.ensure_connected()?;
        let settle = self.config.settle();
        let _guard = self.motion.begin();

        self.channel.send("G91", settle).await?;
        self.channel
            .send(&format!("G1 {} F{:.0}", axis_words(&delta), speed), settle)
            .await?;

        let position = {
            let mut state = self.state.write();
            state.toolend.position = state.toolend.position.offset_by(&delta);
            state.toolend.position
        };
        self.notify_state_change();
        tracing::info!("{}: step {} -> {}", self.name, delta, position);
        Ok(position)
    }

    /// Energize the latch output for `duration`, then release it
    pub async fn unlock(&self, duration: Duration) -> Result<()> {
        self.ensure_connected()?;
        let settle = self.config.settle();
        self.channel.send("M8", settle).await?;
        tokio::time::sleep(duration).await;
        self.channel.send("M9", settle).await?;
        tracing::debug!("{}: latch cycled for {:?}", self.name, duration);
        Ok(())
    }

    /// Abort in-flight moves and soft-reset the controller
    ///
    /// The tracked position is left as is.
    pub async fn reset(&self) -> Result<()> {
        self.ensure_connected()?;
        let aborted = self.motion.abort_all();
        if aborted > 0 {
            tracing::warn!("{}: aborted {} in-flight move(s)", self.name, aborted);
        }
        self.channel.send_realtime(SOFT_RESET).await?;
        tokio::time::sleep(Duration::from_millis(self.config.reset_settle_ms)).await;
        tracing::info!("{}: soft reset", self.name);
        Ok(())
    }

    /// Declare the current machine position (`G92`)
    pub async fn set_position(&self, position: Position) -> Result<()> {
        self.ensure_connected()?;
        self.channel
            .send(&format!("G92 {}", axis_words(&position)), self.config.settle())
            .await?;
        self.state.write().toolend.position = position;
        self.notify_state_change();
        Ok(())
    }

    pub async fn feed_hold(&self) -> Result<()> {
        self.ensure_connected()?;
        self.channel.send_realtime(FEED_HOLD).await
    }

    pub async fn cycle_start(&self) -> Result<()> {
        self.ensure_connected()?;
        self.channel.send_realtime(CYCLE_START).await
    }

    /// Home all axes; the tracked position returns to the origin
    pub async fn home(&self) -> Result<()> {
        self.ensure_connected()?;
        self.channel.send("$H", self.config.settle()).await?;
        self.state.write().toolend.position = Position::default();
        self.notify_state_change();
        tracing::info!("{}: homed", self.name);
        Ok(())
    }

    /// Replace the named locations
    pub fn edit_locations(&self, locations: Vec<Location>) -> Vec<Location> {
        self.state.write().locations = locations.clone();
        self.notify_state_change();
        locations
    }

    /// Replace the holder table
    pub fn set_holders(&self, holders: Vec<Holder>) {
        self.state.write().holders = holders;
        self.notify_state_change();
    }

    /// Absolute move to a named location
    pub fn goto_location(&self, name: &str, speed: f64) -> Result<MotionHandle> {
        let target = self
            .state
            .read()
            .locations
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.position)
            .ok_or_else(|| ControllerError::UnknownLocation {
                name: name.to_string(),
            })?;
        self.goto(target, speed)
    }

    /// Plan an obstacle-free route from the current position and follow it
    ///
    /// Nothing is sent if planning fails. Each waypoint move is awaited
    /// before the next is issued; the A axis is held.
    pub async fn travel(
        &self,
        goal: Waypoint,
        speed: f64,
        planner: &PathPlanner,
    ) -> Result<Vec<Waypoint>> {
        self.ensure_connected()?;
        let start = self.state.read().toolend.position;
        let route = planner.plan(start.waypoint(), goal)?;

        tracing::info!("{}: travel along {} waypoints", self.name, route.len());
        for wp in &route {
            self.goto(start.with_waypoint(*wp), speed)?.wait().await?;
        }
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::{Communicator, SimulatedTinyG, SimulatorState};
    use cellkit_core::{thread_safe, ThreadSafe};

    fn sim_gantry() -> (GantryController, ThreadSafe<SimulatorState>) {
        let sim = thread_safe(SimulatorState::default());
        let shared = sim.clone();
        let channel = DeviceChannel::with_factory(
            "gantry",
            Arc::new(move |_: &ConnectionParams| -> Box<dyn Communicator> {
                Box::new(SimulatedTinyG::with_state(shared.clone()))
            }),
        );
        let config = GantryConfig {
            settle_ms: 0,
            reset_settle_ms: 0,
            ..GantryConfig::default()
        };
        (GantryController::with_channel("gantry", config, channel), sim)
    }

    #[test]
    fn test_axis_words_format() {
        assert_eq!(
            axis_words(&Position::new(1.0, -2.5, 30.0, 90.0)),
            "X1.000 Y-2.500 Z30.000 A90.000"
        );
    }

    #[tokio::test]
    async fn test_commands_require_connection() {
        let (gantry, _) = sim_gantry();
        assert_eq!(gantry.machine_state(), GantryMachineState::Disconnected);
        assert!(gantry.goto(Position::default(), 1000.0).unwrap_err().is_not_connected());
        assert!(gantry
            .step(Position::default(), 1000.0)
            .await
            .unwrap_err()
            .is_not_connected());

        let info = gantry.get_info().await;
        assert!(!info.connected);
    }

    #[tokio::test]
    async fn test_connect_resyncs_origin() {
        let (gantry, sim) = sim_gantry();
        let gantry = gantry.with_state(GantryState {
            toolend: ToolEnd::new(Position::new(5.0, 6.0, 7.0, 0.0)),
            ..GantryState::default()
        });
        gantry.connect(&ConnectionParams::simulated()).await.unwrap();

        let sim = sim.lock();
        assert_eq!(sim.received[0], "G92 X5.000 Y6.000 Z7.000 A0.000");
        assert_eq!(sim.position, Position::new(5.0, 6.0, 7.0, 0.0));
    }

    #[tokio::test]
    async fn test_motion_notifies_listeners() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let (gantry, _) = sim_gantry();
        gantry.connect(&ConnectionParams::simulated()).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let last = thread_safe(Position::default());
        let (counter, seen) = (calls.clone(), last.clone());
        gantry.subscribe(
            "count",
            Arc::new(move |state: &GantryState| {
                counter.fetch_add(1, Ordering::SeqCst);
                *seen.lock() = state.toolend.position;
            }),
        );

        let target = Position::new(10.0, 20.0, 0.0, 0.0);
        gantry.goto(target, 1000.0).unwrap().wait().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*last.lock(), target);

        gantry.step(Position::new(0.0, 5.0, 0.0, 0.0), 1000.0).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*last.lock(), Position::new(10.0, 25.0, 0.0, 0.0));

        gantry.home().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*last.lock(), Position::default());
    }
}
