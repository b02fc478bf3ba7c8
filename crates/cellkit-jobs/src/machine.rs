//! Machine registry and action dispatch
//!
//! Machines are a closed set of kinds. Each driver type implements
//! [`MachineActions`] for its own action enum, and [`Machine`] routes a
//! job's action name to the right driver without any runtime reflection.

use crate::actions::{
    decode, ArmAction, GantryAction, GripperAction, HolderParams, JointParams, LocationParams,
    MachineKind, MoveParams, RunTimeParams, TravelParams, UnlockParams,
};
use async_trait::async_trait;
use cellkit_communication::{ArmClient, GantryController, GripperClient};
use cellkit_core::{ControllerError, JobError, Position, Result, Waypoint};
use cellkit_planner::PathPlanner;
use parking_lot::RwLock;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

fn duration_s(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

/// Fixed set of operations a machine kind offers to jobs
#[async_trait]
pub trait MachineActions: Send + Sync {
    type Action: FromStr<Err = String> + fmt::Display + Copy + Send + Sync;

    fn kind(&self) -> MachineKind;

    fn is_connected(&self) -> bool;

    /// Run one action to completion and report its result as JSON
    async fn perform(
        &self,
        action: Self::Action,
        params: &Map<String, Value>,
        planner: &PathPlanner,
    ) -> Result<Value>;
}

#[async_trait]
impl MachineActions for GantryController {
    type Action = GantryAction;

    fn kind(&self) -> MachineKind {
        MachineKind::Gantry
    }

    fn is_connected(&self) -> bool {
        GantryController::is_connected(self)
    }

    async fn perform(
        &self,
        action: GantryAction,
        params: &Map<String, Value>,
        planner: &PathPlanner,
    ) -> Result<Value> {
        let name = action.name();
        let default_speed = self.config().default_speed;
        match action {
            GantryAction::Goto => {
                let p: MoveParams = decode(name, params)?;
                let target = Position::new(p.x, p.y, p.z, p.a);
                let reached = self
                    .goto(target, p.speed.unwrap_or(default_speed))?
                    .wait()
                    .await?;
                Ok(serde_json::to_value(reached)?)
            }
            GantryAction::Step => {
                let p: MoveParams = decode(name, params)?;
                let delta = Position::new(p.x, p.y, p.z, p.a);
                let reached = self.step(delta, p.speed.unwrap_or(default_speed)).await?;
                Ok(serde_json::to_value(reached)?)
            }
            GantryAction::Unlock => {
                let p: UnlockParams = decode(name, params)?;
                let seconds = p
                    .duration_s
                    .unwrap_or(self.config().tool_change.unlock_s);
                self.unlock(duration_s(seconds)).await?;
                Ok(Value::Null)
            }
            GantryAction::Attach => {
                let p: HolderParams = decode(name, params)?;
                let holder = p.holder.ok_or_else(|| JobError::InvalidParams {
                    action: name.to_string(),
                    reason: "missing field `holder`".to_string(),
                })?;
                if !self.attach(&holder).await? {
                    return Err(ControllerError::CommandRejected {
                        reason: format!("no tool to attach from '{}'", holder),
                    }
                    .into());
                }
                Ok(json!({"tool": self.toolend().tool}))
            }
            GantryAction::Detach => {
                let p: HolderParams = decode(name, params)?;
                if !self.detach(p.holder.as_deref()).await? {
                    return Err(ControllerError::CommandRejected {
                        reason: "no empty holder to detach into".to_string(),
                    }
                    .into());
                }
                Ok(Value::Null)
            }
            GantryAction::Travel => {
                let p: TravelParams = decode(name, params)?;
                let route = self
                    .travel(
                        Waypoint::new(p.x, p.y, p.z),
                        p.speed.unwrap_or(default_speed),
                        planner,
                    )
                    .await?;
                Ok(serde_json::to_value(route)?)
            }
            GantryAction::GotoLocation => {
                let p: LocationParams = decode(name, params)?;
                let reached = self
                    .goto_location(&p.name, p.speed.unwrap_or(default_speed))?
                    .wait()
                    .await?;
                Ok(serde_json::to_value(reached)?)
            }
            GantryAction::Reset => {
                self.reset().await?;
                Ok(Value::Null)
            }
            GantryAction::Home => {
                self.home().await?;
                Ok(Value::Null)
            }
        }
    }
}

#[async_trait]
impl MachineActions for ArmClient {
    type Action = ArmAction;

    fn kind(&self) -> MachineKind {
        MachineKind::Arm
    }

    fn is_connected(&self) -> bool {
        ArmClient::is_connected(self)
    }

    async fn perform(
        &self,
        action: ArmAction,
        params: &Map<String, Value>,
        _planner: &PathPlanner,
    ) -> Result<Value> {
        let p: JointParams = decode(action.name(), params)?;
        let speed = p.speed.unwrap_or(self.config().speed);
        let target = match action {
            ArmAction::Goto => p.angles(),
            ArmAction::Step => {
                let mut angles = self.get_position().await?;
                for (angle, delta) in angles.iter_mut().zip(p.angles()) {
                    *angle += delta;
                }
                angles
            }
        };
        self.set_angles(target, speed).await?;
        Ok(json!({"angles": target}))
    }
}

#[async_trait]
impl MachineActions for GripperClient {
    type Action = GripperAction;

    fn kind(&self) -> MachineKind {
        MachineKind::Gripper
    }

    fn is_connected(&self) -> bool {
        GripperClient::is_connected(self)
    }

    async fn perform(
        &self,
        action: GripperAction,
        params: &Map<String, Value>,
        _planner: &PathPlanner,
    ) -> Result<Value> {
        match action {
            GripperAction::Open | GripperAction::Close => {
                let p: RunTimeParams = decode(action.name(), params)?;
                let run = duration_s(p.time_s.unwrap_or(self.config().run_time_s));
                if action == GripperAction::Open {
                    self.open(run).await?;
                } else {
                    self.close(run).await?;
                }
            }
            GripperAction::SpeedUp => self.speed_up().await?,
            GripperAction::SpeedDown => self.speed_down().await?,
        }
        Ok(Value::Null)
    }
}

async fn dispatch<M: MachineActions + ?Sized>(
    driver: &M,
    machine: &str,
    action: &str,
    params: &Map<String, Value>,
    planner: &PathPlanner,
) -> Result<Value> {
    let parsed = action
        .parse::<M::Action>()
        .map_err(|action| JobError::UnknownAction {
            machine: machine.to_string(),
            action,
        })?;
    let shown = Value::Object(params.clone());
    tracing::info!("{}: {} {}", machine, parsed, shown);
    driver.perform(parsed, params, planner).await
}

/// A registered machine
#[derive(Debug, Clone)]
pub enum Machine {
    Gantry(Arc<GantryController>),
    Arm(Arc<ArmClient>),
    Gripper(Arc<GripperClient>),
}

impl Machine {
    pub fn kind(&self) -> MachineKind {
        match self {
            Self::Gantry(_) => MachineKind::Gantry,
            Self::Arm(_) => MachineKind::Arm,
            Self::Gripper(_) => MachineKind::Gripper,
        }
    }

    pub fn is_connected(&self) -> bool {
        match self {
            Self::Gantry(g) => g.is_connected(),
            Self::Arm(a) => a.is_connected(),
            Self::Gripper(g) => g.is_connected(),
        }
    }

    /// Resolve an action name for this machine and run it
    pub async fn run(
        &self,
        name: &str,
        action: &str,
        params: &Map<String, Value>,
        planner: &PathPlanner,
    ) -> Result<Value> {
        match self {
            Self::Gantry(g) => dispatch(g.as_ref(), name, action, params, planner).await,
            Self::Arm(a) => dispatch(a.as_ref(), name, action, params, planner).await,
            Self::Gripper(g) => dispatch(g.as_ref(), name, action, params, planner).await,
        }
    }
}

/// Name-keyed set of machines plus the planner used for routed moves
#[derive(Debug, Default)]
pub struct MachineRegistry {
    machines: RwLock<BTreeMap<String, Machine>>,
    planner: RwLock<PathPlanner>,
}

impl MachineRegistry {
    pub fn new(planner: PathPlanner) -> Self {
        Self {
            machines: RwLock::new(BTreeMap::new()),
            planner: RwLock::new(planner),
        }
    }

    /// Register or replace a machine under `name`
    pub fn register(&self, name: impl Into<String>, machine: Machine) {
        let name = name.into();
        tracing::info!("Registered {} machine '{}'", machine.kind(), name);
        self.machines.write().insert(name, machine);
    }

    pub fn unregister(&self, name: &str) -> Option<Machine> {
        self.machines.write().remove(name)
    }

    pub fn get(&self, name: &str) -> Result<Machine> {
        self.machines.read().get(name).cloned().ok_or_else(|| {
            JobError::UnknownMachine {
                machine: name.to_string(),
            }
            .into()
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.machines.read().keys().cloned().collect()
    }

    /// Connection flag of every machine
    pub fn health(&self) -> BTreeMap<String, bool> {
        self.machines
            .read()
            .iter()
            .map(|(name, machine)| (name.clone(), machine.is_connected()))
            .collect()
    }

    pub fn planner(&self) -> PathPlanner {
        self.planner.read().clone()
    }

    pub fn set_planner(&self, planner: PathPlanner) {
        *self.planner.write() = planner;
    }

    /// Canonical parameters for `action` on the named machine
    pub fn default_params(&self, machine: &str, action: &str) -> Result<Map<String, Value>> {
        let kind = self.get(machine)?.kind();
        kind.template(action).ok_or_else(|| {
            JobError::UnknownAction {
                machine: machine.to_string(),
                action: action.to_string(),
            }
            .into()
        })
    }

    /// Run an action on a registered machine
    pub async fn execute(
        &self,
        machine: &str,
        action: &str,
        params: &Map<String, Value>,
    ) -> Result<Value> {
        let target = self.get(machine)?;
        let planner = self.planner();
        target.run(machine, action, params, &planner).await
    }
}
