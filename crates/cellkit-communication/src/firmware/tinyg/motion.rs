//! Supervised background motion
//!
//! `goto` runs on a tokio task. The driver keeps the task's abort handle so
//! that `reset` can cancel it, and callers get a [`MotionHandle`] they can
//! poll or await.

use cellkit_core::{ControllerError, Position, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinHandle};

/// Tracks in-flight motion tasks for one machine
#[derive(Debug, Default)]
pub struct MotionTracker {
    active: Arc<AtomicUsize>,
    handles: Mutex<Vec<AbortHandle>>,
}

impl MotionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_in_motion(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }

    /// Guard counting one motion as active until dropped
    pub(crate) fn begin(&self) -> MotionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        MotionGuard {
            active: self.active.clone(),
        }
    }

    /// Register a spawned task so it can be aborted
    pub(crate) fn track(&self, handle: &JoinHandle<Result<Position>>) {
        let mut handles = self.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle.abort_handle());
    }

    /// Abort every tracked task, returning how many were still running
    pub fn abort_all(&self) -> usize {
        let mut handles = self.handles.lock();
        let running = handles.iter().filter(|h| !h.is_finished()).count();
        for handle in handles.drain(..) {
            handle.abort();
        }
        running
    }
}

/// Decrements the active count when the task ends, including on abort
pub(crate) struct MotionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for MotionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle to one dispatched move
///
/// Dropping the handle does not cancel the move.
#[derive(Debug)]
pub struct MotionHandle {
    task: JoinHandle<Result<Position>>,
}

impl MotionHandle {
    pub(crate) fn new(task: JoinHandle<Result<Position>>) -> Self {
        Self { task }
    }

    /// True until the move command has been sent and acknowledged
    pub fn is_in_motion(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait for the move, returning the commanded target position
    pub async fn wait(self) -> Result<Position> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(ControllerError::MotionAborted {
                reason: "cancelled by reset".to_string(),
            }
            .into()),
            Err(e) => Err(ControllerError::MotionAborted {
                reason: e.to_string(),
            }
            .into()),
        }
    }

    /// Cancel this move's task
    pub fn abort(&self) {
        self.task.abort();
    }
}
