//! # CellKit Core
//!
//! Core types, errors, and utilities shared by every CellKit crate.
//! Provides the machine data model (positions, poses, tool holders),
//! the unified error taxonomy, and thread-safe type aliases.

pub mod data;
pub mod error;
pub mod types;

pub use data::{Holder, Location, Pose, Position, ToolEnd, Waypoint};

pub use error::{
    ConnectionError, ControllerError, Error, JobError, PlannerError, ProtocolError, Result,
};

pub use types::{thread_safe, thread_safe_rw, ThreadSafe, ThreadSafeRw, ThreadSafeRwMap};
