//! Type aliases for commonly used shared-state types.
//!
//! Machine drivers hold their state behind `Arc<...>` so that background
//! motion tasks and request handlers can see the same values. These aliases
//! keep those signatures readable.
//!
//! ```rust,ignore
//! use cellkit_core::types::*;
//!
//! let toolend: ThreadSafeRw<ToolEnd> = thread_safe_rw(ToolEnd::default());
//! toolend.write().tool = Some("gripper".into());
//! ```

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// A thread-safe, mutex-protected wrapper for cross-task sharing.
///
/// Uses `parking_lot::Mutex`; never hold the guard across an `.await`.
pub type ThreadSafe<T> = Arc<Mutex<T>>;

/// A thread-safe reader-writer lock wrapper for read-heavy state.
pub type ThreadSafeRw<T> = Arc<RwLock<T>>;

/// A thread-safe reader-writer hash map.
pub type ThreadSafeRwMap<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Create a new `ThreadSafe<T>` from a value.
pub fn thread_safe<T>(value: T) -> ThreadSafe<T> {
    Arc::new(Mutex::new(value))
}

/// Create a new `ThreadSafeRw<T>` from a value.
pub fn thread_safe_rw<T>(value: T) -> ThreadSafeRw<T> {
    Arc::new(RwLock::new(value))
}
