//! Type system utilities and aliases.
//!
//! ## Modules
//!
//! - [`aliases`]: Type aliases for the `Arc<Mutex<T>>` / `Arc<RwLock<T>>` shapes
//!   used for machine state shared between tasks.

pub mod aliases;

pub use aliases::*;
