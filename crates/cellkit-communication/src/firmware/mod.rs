//! Machine drivers
//!
//! One module per machine kind in the cell:
//! - `tinyg`: the G-code gantry
//! - `arm_bridge`: the collaborative arm behind its TCP/JSON bridge
//! - `gripper`: the HTTP servo gripper

pub mod arm_bridge;
pub mod gripper;
pub mod tinyg;

pub use arm_bridge::{ArmClient, ArmConfig};
pub use gripper::{GripperClient, GripperConfig, GripperStatus};
