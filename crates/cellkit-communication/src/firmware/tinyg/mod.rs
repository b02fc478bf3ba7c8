//! TinyG gantry driver
//!
//! - [`controller`]: connection, status and motion commands
//! - [`motion`]: background move tracking
//! - [`status_parser`]: plain-text `?` reply parsing
//! - [`tool_change`]: attach/detach sequence over tool holders

pub mod controller;
pub mod motion;
pub mod status_parser;
pub mod tool_change;

pub use controller::{
    GantryConfig, GantryController, GantryInfo, GantryMachineState, GantryState, GantryStatus,
    StateListener, ToolChangeConfig,
};
pub use motion::{MotionHandle, MotionTracker};
pub use status_parser::{StatusField, StatusParser, StatusReport};
pub use tool_change::ToolChangeStep;
