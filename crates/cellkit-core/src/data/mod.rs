//! Machine data model
//!
//! Positions, poses and the tool-holding fixtures of the gantry.
//! All types serialize with `serde` in the same shape as the persisted
//! factory file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Add;

/// Four-axis gantry position in millimeters (A is the rotary axis)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    /// X-axis position
    pub x: f64,
    /// Y-axis position
    pub y: f64,
    /// Z-axis position
    pub z: f64,
    /// Rotary A-axis position
    #[serde(default)]
    pub a: f64,
}

impl Position {
    /// Create a new four-axis position
    pub fn new(x: f64, y: f64, z: f64, a: f64) -> Self {
        Self { x, y, z, a }
    }

    /// The XYZ part of this position as a waypoint
    pub fn waypoint(&self) -> Waypoint {
        Waypoint::new(self.x, self.y, self.z)
    }

    /// Move the XYZ part to a waypoint, keeping A
    pub fn with_waypoint(&self, wp: Waypoint) -> Self {
        Self {
            x: wp.x,
            y: wp.y,
            z: wp.z,
            a: self.a,
        }
    }

    /// Component-wise sum, used for relative steps
    pub fn offset_by(&self, delta: &Position) -> Self {
        Self {
            x: self.x + delta.x,
            y: self.y + delta.y,
            z: self.z + delta.z,
            a: self.a + delta.a,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "X{:.3} Y{:.3} Z{:.3} A{:.3}",
            self.x, self.y, self.z, self.a
        )
    }
}

/// A single point of a planned route, in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Waypoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Projection onto the XY plane
    pub fn xy(&self) -> (f64, f64) {
        (self.x, self.y)
    }
}

impl From<(f64, f64, f64)> for Waypoint {
    fn from((x, y, z): (f64, f64, f64)) -> Self {
        Self { x, y, z }
    }
}

/// Six degree-of-freedom pose
///
/// Poses compose by component-wise addition, which is how end-effector
/// offsets are applied on top of a machine pose. Only `Pose + Pose` is
/// defined.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    #[serde(default)]
    pub yaw: f64,
    #[serde(default)]
    pub pitch: f64,
    #[serde(default)]
    pub roll: f64,
}

impl Pose {
    /// Create a pose from all six components
    pub fn new(x: f64, y: f64, z: f64, yaw: f64, pitch: f64, roll: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw,
            pitch,
            roll,
        }
    }

    /// Create a pose with zero orientation
    pub fn translation(x: f64, y: f64, z: f64) -> Self {
        Self::new(x, y, z, 0.0, 0.0, 0.0)
    }

    /// All six components in (x, y, z, yaw, pitch, roll) order
    pub fn components(&self) -> (f64, f64, f64, f64, f64, f64) {
        (self.x, self.y, self.z, self.yaw, self.pitch, self.roll)
    }
}

impl Add for Pose {
    type Output = Pose;

    fn add(self, other: Pose) -> Pose {
        Pose {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
            yaw: self.yaw + other.yaw,
            pitch: self.pitch + other.pitch,
            roll: self.roll + other.roll,
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pose({}, {}, {}, {}, {}, {})",
            self.x, self.y, self.z, self.yaw, self.pitch, self.roll
        )
    }
}

/// The gantry's moving mounting point
///
/// Tracks the last confirmed position and the tool currently mounted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ToolEnd {
    #[serde(flatten)]
    pub position: Position,
    /// Mounted tool id, if any
    #[serde(default)]
    pub tool: Option<String>,
    /// Holder the mounted tool was taken from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holder: Option<String>,
}

impl ToolEnd {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            tool: None,
            holder: None,
        }
    }

    pub fn has_tool(&self) -> bool {
        self.tool.is_some()
    }

    /// Builder-style tool assignment
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }
}

/// A parking fixture for a detachable tool
///
/// `out` is the approach pose in front of the holder, `seat` the pose at
/// which the tool sits in the holder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holder {
    pub name: String,
    pub out: Position,
    #[serde(rename = "in")]
    pub seat: Position,
    /// Parked tool id, if any
    #[serde(default)]
    pub tool: Option<String>,
}

impl Holder {
    pub fn new(name: impl Into<String>, out: Position, seat: Position) -> Self {
        Self {
            name: name.into(),
            out,
            seat,
            tool: None,
        }
    }

    /// Builder-style tool assignment
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tool.is_none()
    }
}

/// A named, user-taught gantry position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(flatten)]
    pub position: Position,
}

impl Location {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pose_addition() {
        let machine = Pose::new(30.0, 0.0, 0.0, 90.0, 0.0, 0.0);
        let offset = Pose::translation(0.0, 5.0, -12.5);
        let sum = machine + offset;
        assert_eq!(sum.components(), (30.0, 5.0, -12.5, 90.0, 0.0, 0.0));
    }

    #[test]
    fn test_position_waypoint_round() {
        let pos = Position::new(1.0, 2.0, 3.0, 45.0);
        let moved = pos.with_waypoint(Waypoint::new(4.0, 5.0, 6.0));
        assert_eq!(moved, Position::new(4.0, 5.0, 6.0, 45.0));
        assert_eq!(pos.waypoint().xy(), (1.0, 2.0));
    }

    #[test]
    fn test_holder_serializes_seat_as_in() {
        let holder = Holder::new(
            "holder1",
            Position::new(10.0, 20.0, 30.0, 0.0),
            Position::new(10.0, 35.0, 30.0, 0.0),
        )
        .with_tool("gripper");
        let json = serde_json::to_value(&holder).unwrap();
        assert_eq!(json["in"]["y"], 35.0);
        assert_eq!(json["tool"], "gripper");

        let back: Holder = serde_json::from_value(json).unwrap();
        assert_eq!(back, holder);
    }

    #[test]
    fn test_toolend_flattens_position() {
        let json = serde_json::json!({"x": 1.0, "y": 2.0, "z": 3.0, "a": 0.0, "tool": null});
        let toolend: ToolEnd = serde_json::from_value(json).unwrap();
        assert_eq!(toolend.position, Position::new(1.0, 2.0, 3.0, 0.0));
        assert!(toolend.tool.is_none());
    }
}
