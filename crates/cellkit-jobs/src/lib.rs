//! # CellKit Jobs
//!
//! Persisted job records and their execution. A job names a machine, an
//! action and a parameter object; [`JobsManager`] stores jobs and runs them
//! on background tasks through a [`MachineRegistry`], which resolves the
//! machine by name and the action through the machine kind's closed action
//! set.

pub mod actions;
pub mod job;
pub mod machine;
pub mod manager;

pub use actions::{ArmAction, GantryAction, GripperAction, MachineKind};
pub use job::{Job, JobStatus};
pub use machine::{Machine, MachineActions, MachineRegistry};
pub use manager::JobsManager;
