//! Action names, parameter shapes and templates per machine kind
//!
//! Every machine kind has a closed set of actions. A job's action string is
//! parsed into one of these enums and its parameter object is decoded into
//! the matching typed struct before anything reaches a driver.

use cellkit_core::JobError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of machine a registry entry drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineKind {
    Gantry,
    Arm,
    Gripper,
}

impl MachineKind {
    /// Action names this kind accepts
    pub fn actions(self) -> Vec<&'static str> {
        match self {
            Self::Gantry => GantryAction::ALL.iter().map(|a| a.name()).collect(),
            Self::Arm => ArmAction::ALL.iter().map(|a| a.name()).collect(),
            Self::Gripper => GripperAction::ALL.iter().map(|a| a.name()).collect(),
        }
    }

    /// Canonical parameter template for an action, if the kind has it
    pub fn template(self, action: &str) -> Option<Map<String, Value>> {
        let value = match self {
            Self::Gantry => action.parse::<GantryAction>().ok()?.template(),
            Self::Arm => action.parse::<ArmAction>().ok()?.template(),
            Self::Gripper => action.parse::<GripperAction>().ok()?.template(),
        };
        match value {
            Value::Object(map) => Some(map),
            _ => Some(Map::new()),
        }
    }
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Gantry => "gantry",
            Self::Arm => "arm",
            Self::Gripper => "gripper",
        };
        write!(f, "{}", s)
    }
}

/// Gantry actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GantryAction {
    Goto,
    Step,
    Unlock,
    Attach,
    Detach,
    Travel,
    GotoLocation,
    Reset,
    Home,
}

impl GantryAction {
    pub const ALL: [Self; 9] = [
        Self::Goto,
        Self::Step,
        Self::Unlock,
        Self::Attach,
        Self::Detach,
        Self::Travel,
        Self::GotoLocation,
        Self::Reset,
        Self::Home,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Goto => "goto",
            Self::Step => "step",
            Self::Unlock => "unlock",
            Self::Attach => "attach",
            Self::Detach => "detach",
            Self::Travel => "travel",
            Self::GotoLocation => "gotoLocation",
            Self::Reset => "reset",
            Self::Home => "home",
        }
    }

    pub fn template(self) -> Value {
        match self {
            Self::Goto => json!({"x": 0, "y": 0, "z": 0, "a": 0, "speed": 2000}),
            Self::Step => json!({"x": 0, "y": 0, "z": 0, "a": 0, "speed": 1000}),
            Self::Unlock => json!({"duration_s": 1}),
            Self::Attach => json!({"holder": "holder1"}),
            Self::Travel => json!({"x": 0, "y": 0, "z": 0, "speed": 2000}),
            Self::GotoLocation => json!({"name": "", "speed": 2000}),
            Self::Detach | Self::Reset | Self::Home => json!({}),
        }
    }
}

impl FromStr for GantryAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for GantryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Arm actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArmAction {
    /// Absolute joint angles
    Goto,
    /// Joint angles relative to the current reading
    Step,
}

impl ArmAction {
    pub const ALL: [Self; 2] = [Self::Goto, Self::Step];

    pub fn name(self) -> &'static str {
        match self {
            Self::Goto => "goto",
            Self::Step => "step",
        }
    }

    pub fn template(self) -> Value {
        json!({"j1": 0, "j2": 0, "j3": 0, "j4": 0, "j5": 0, "j6": 0})
    }
}

impl FromStr for ArmAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for ArmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Gripper actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GripperAction {
    Open,
    Close,
    SpeedUp,
    SpeedDown,
}

impl GripperAction {
    pub const ALL: [Self; 4] = [Self::Open, Self::Close, Self::SpeedUp, Self::SpeedDown];

    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::SpeedUp => "speedUp",
            Self::SpeedDown => "speedDown",
        }
    }

    pub fn template(self) -> Value {
        match self {
            Self::Open | Self::Close => json!({"time_s": 2}),
            Self::SpeedUp | Self::SpeedDown => json!({}),
        }
    }
}

impl FromStr for GripperAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl fmt::Display for GripperAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Four-axis move; `r` is accepted for the rotary axis
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MoveParams {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(alias = "r")]
    pub a: f64,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TravelParams {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub speed: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct UnlockParams {
    pub duration_s: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HolderParams {
    pub holder: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationParams {
    pub name: String,
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Six joint angles in degrees
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct JointParams {
    pub j1: f64,
    pub j2: f64,
    pub j3: f64,
    pub j4: f64,
    pub j5: f64,
    pub j6: f64,
    pub speed: Option<u32>,
}

impl JointParams {
    pub fn angles(&self) -> [f64; 6] {
        [self.j1, self.j2, self.j3, self.j4, self.j5, self.j6]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RunTimeParams {
    pub time_s: Option<f64>,
}

/// Decode a job's parameter object into an action's typed parameters
pub fn decode<T: DeserializeOwned>(action: &str, params: &Map<String, Value>) -> Result<T, JobError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| JobError::InvalidParams {
        action: action.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn test_action_names_parse() {
        for action in GantryAction::ALL {
            assert_eq!(action.name().parse::<GantryAction>(), Ok(action));
        }
        assert_eq!("speedUp".parse::<GripperAction>(), Ok(GripperAction::SpeedUp));
        assert_eq!("fly".parse::<GantryAction>(), Err("fly".to_string()));
        assert!("open".parse::<ArmAction>().is_err());
    }

    #[test]
    fn test_templates_decode_into_their_params() {
        let step = MachineKind::Gantry.template("step").unwrap();
        let params: MoveParams = decode("step", &step).unwrap();
        assert_eq!(params.speed, Some(1000.0));

        let goto = MachineKind::Arm.template("goto").unwrap();
        let joints: JointParams = decode("goto", &goto).unwrap();
        assert_eq!(joints.angles(), [0.0; 6]);

        assert_eq!(MachineKind::Gripper.template("speedDown"), Some(Map::new()));
        assert_eq!(MachineKind::Gripper.template("goto"), None);
    }

    #[test]
    fn test_rotary_alias() {
        let params: MoveParams = decode("step", &map(json!({"x": 1, "r": 90}))).unwrap();
        assert_eq!(params.a, 90.0);
        assert_eq!(params.speed, None);
    }

    #[test]
    fn test_bad_params_are_reported() {
        let err = decode::<MoveParams>("goto", &map(json!({"x": "far"}))).unwrap_err();
        assert!(matches!(err, JobError::InvalidParams { ref action, .. } if action == "goto"));

        let err = decode::<LocationParams>("gotoLocation", &Map::new()).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_kind_lists_actions() {
        assert_eq!(MachineKind::Arm.actions(), vec!["goto", "step"]);
        assert!(MachineKind::Gantry.actions().contains(&"attach"));
    }
}
