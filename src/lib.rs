//! # CellKit
//!
//! Controller for a small pick-and-place cell: a four-axis gantry driven by
//! G-code over serial, a six-joint arm behind a TCP/JSON bridge and a servo
//! gripper behind an HTTP microcontroller.
//!
//! ## Architecture
//!
//! CellKit is organized as a workspace with multiple crates:
//!
//! 1. **cellkit-core** - Data model, error taxonomy, shared-state aliases
//! 2. **cellkit-planner** - Obstacle boxes, A* grid search, rise/traverse/descend routes
//! 3. **cellkit-communication** - Transports, device channel, gantry/arm/gripper drivers
//! 4. **cellkit-settings** - Configuration and the persisted factory file
//! 5. **cellkit-jobs** - Job records, persistence and machine action dispatch
//! 6. **cellkit** - This crate: cell assembly and the command-line binary

pub mod cell;

pub use cell::{Cell, ARM, GANTRY, GRIPPER};

pub use cellkit_core::{
    ConnectionError, ControllerError, Error, Holder, JobError, Location, PlannerError, Pose,
    Position, ProtocolError, Result, ToolEnd, Waypoint,
};

pub use cellkit_planner::{Aabb, PathPlanner, PlannerConfig, WorkspaceBounds};

pub use cellkit_communication::{
    list_ports, ArmClient, ArmConfig, ConnectionDriver, ConnectionParams, DeviceChannel,
    GantryConfig, GantryController, GantryInfo, GantryState, GripperClient, GripperConfig,
    SerialPortInfo, ToolChangeConfig,
};

pub use cellkit_settings::{Config, FactoryFile, FactoryStore, SettingsError};

pub use cellkit_jobs::{Job, JobStatus, JobsManager, Machine, MachineKind, MachineRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Console output with pretty formatting, filtered by `RUST_LOG` (default
/// `info`). Setting `CELLKIT_LOG_FORMAT=json` switches to one JSON object
/// per event.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CELLKIT_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_line_number(true)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
