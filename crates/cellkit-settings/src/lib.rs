//! # CellKit Settings
//!
//! Application configuration and the persisted factory file.
//!
//! [`Config`] holds transport, timing and planner settings and is read from
//! a `.toml` or `.json` file. [`FactoryFile`] records the physical state of
//! the cell (tool end, holders, locations, obstacles) and is rewritten on
//! every change through a [`FactoryStore`].

pub mod config;
pub mod error;
pub mod factory;

pub use config::Config;
pub use error::{SettingsError, SettingsResult};
pub use factory::{ArmState, FactoryFile, FactoryStore, MachineSections};
