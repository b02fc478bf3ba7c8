//! Tool attach/detach sequence
//!
//! Both directions drive the same motion sequence against a holder:
//!
//! ```text
//! ApproachOut -> SeatIn -> Unlock -> Retreat -> Done
//! ```
//!
//! and differ only in the bookkeeping applied at `Done`. A tool id is
//! recorded in exactly one place: one holder, or the tool end.

use super::controller::{seconds, GantryController};
use cellkit_core::{ControllerError, Holder, Result};
use std::fmt;

/// Stage of a tool change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChangeStep {
    /// Move to the holder's approach pose and let the gantry settle
    ApproachOut,
    /// Move into the seat
    SeatIn,
    /// Cycle the latch output
    Unlock,
    /// Back out to the approach pose
    Retreat,
    Done,
}

impl ToolChangeStep {
    pub fn next(self) -> Self {
        match self {
            Self::ApproachOut => Self::SeatIn,
            Self::SeatIn => Self::Unlock,
            Self::Unlock => Self::Retreat,
            Self::Retreat | Self::Done => Self::Done,
        }
    }
}

impl fmt::Display for ToolChangeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ApproachOut => "APPROACH_OUT",
            Self::SeatIn => "SEAT_IN",
            Self::Unlock => "UNLOCK",
            Self::Retreat => "RETREAT",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Attach,
    Detach,
}

impl GantryController {
    /// Pick up the tool parked in `holder`
    ///
    /// A mounted tool is first returned with [`detach`](Self::detach).
    /// Returns `Ok(false)` when the holder does not exist, holds no tool, or
    /// the mounted tool has nowhere to go.
    pub async fn attach(&self, holder: &str) -> Result<bool> {
        let _sequence = self.tool_change_lock.lock().await;

        let target = {
            let state = self.state.read();
            match state.holder(holder) {
                Some(h) if !h.is_empty() => h.clone(),
                Some(_) => {
                    tracing::warn!("{}: holder {} is empty, nothing to attach", self.name(), holder);
                    return Ok(false);
                }
                None => {
                    tracing::warn!("{}: unknown holder {}", self.name(), holder);
                    return Ok(false);
                }
            }
        };

        let mounted = self.state.read().toolend.has_tool();
        if mounted && !self.detach_unlocked(None).await? {
            tracing::warn!("{}: could not park the mounted tool", self.name());
            return Ok(false);
        }

        self.run_sequence(&target, Direction::Attach).await?;

        {
            let mut state = self.state.write();
            let tool = state
                .holder(&target.name)
                .and_then(|h| h.tool.clone())
                .ok_or_else(|| ControllerError::UnknownHolder {
                    name: target.name.clone(),
                })?;
            if state.tool_locations(&tool).iter().any(|place| *place != target.name) {
                return Err(ControllerError::ToolConflict { tool }.into());
            }
            if let Some(h) = state.holder_mut(&target.name) {
                h.tool = None;
            }
            tracing::info!("{}: attached {} from {}", self.name(), tool, target.name);
            state.toolend.tool = Some(tool);
            state.toolend.holder = Some(target.name.clone());
        }
        self.notify_state_change();
        Ok(true)
    }

    /// Park the mounted tool
    ///
    /// With no target the tool goes back to the holder it came from if that
    /// is empty, otherwise to the first empty holder. Detaching with nothing
    /// mounted is a successful no-op. Returns `Ok(false)` when the named
    /// holder does not exist or is occupied, or no holder is free.
    pub async fn detach(&self, holder: Option<&str>) -> Result<bool> {
        let _sequence = self.tool_change_lock.lock().await;
        self.detach_unlocked(holder).await
    }

    async fn detach_unlocked(&self, holder: Option<&str>) -> Result<bool> {
        let target = {
            let state = self.state.read();
            if !state.toolend.has_tool() {
                tracing::debug!("{}: no tool mounted, detach is a no-op", self.name());
                return Ok(true);
            }
            match select_detach_target(&state.holders, state.toolend.holder.as_deref(), holder) {
                Some(h) => h.clone(),
                None => {
                    tracing::warn!(
                        "{}: no free holder for detach (requested {:?})",
                        self.name(),
                        holder
                    );
                    return Ok(false);
                }
            }
        };

        self.run_sequence(&target, Direction::Detach).await?;

        {
            let mut state = self.state.write();
            let tool = state.toolend.tool.take();
            state.toolend.holder = None;
            let slot = state
                .holder_mut(&target.name)
                .ok_or_else(|| ControllerError::UnknownHolder {
                    name: target.name.clone(),
                })?;
            slot.tool = tool;
            tracing::info!("{}: detached {:?} into {}", self.name(), slot.tool, target.name);
        }
        self.notify_state_change();
        Ok(true)
    }

    async fn run_sequence(&self, holder: &Holder, direction: Direction) -> Result<()> {
        let timing = self.config.tool_change.clone();
        let mut step = ToolChangeStep::ApproachOut;

        while step != ToolChangeStep::Done {
            tracing::info!("{}: {:?} {} at {}", self.name(), direction, step, holder.name);
            match step {
                ToolChangeStep::ApproachOut => {
                    self.goto(holder.out, timing.speed)?.wait().await?;
                    tokio::time::sleep(seconds(timing.approach_dwell_s)).await;
                }
                ToolChangeStep::SeatIn => {
                    self.goto(holder.seat, timing.speed)?.wait().await?;
                    tokio::time::sleep(seconds(timing.seat_dwell_s)).await;
                }
                ToolChangeStep::Unlock => {
                    self.unlock(seconds(timing.unlock_s)).await?;
                    tokio::time::sleep(seconds(timing.release_dwell_s)).await;
                }
                ToolChangeStep::Retreat => {
                    self.goto(holder.out, timing.speed)?.wait().await?;
                }
                ToolChangeStep::Done => {}
            }
            step = step.next();
        }
        Ok(())
    }
}

/// Choose the holder a detach parks into
fn select_detach_target<'a>(
    holders: &'a [Holder],
    origin: Option<&str>,
    requested: Option<&str>,
) -> Option<&'a Holder> {
    if let Some(name) = requested {
        return holders.iter().find(|h| h.name == name && h.is_empty());
    }
    origin
        .and_then(|name| holders.iter().find(|h| h.name == name && h.is_empty()))
        .or_else(|| holders.iter().find(|h| h.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellkit_core::Position;

    fn holders() -> Vec<Holder> {
        let at = |x: f64| Position::new(x, 0.0, 10.0, 0.0);
        vec![
            Holder::new("holder1", at(10.0), at(12.0)).with_tool("gripper"),
            Holder::new("holder2", at(20.0), at(22.0)),
            Holder::new("holder3", at(30.0), at(32.0)),
        ]
    }

    #[test]
    fn test_step_order() {
        let mut step = ToolChangeStep::ApproachOut;
        let mut seen = vec![step];
        while step != ToolChangeStep::Done {
            step = step.next();
            seen.push(step);
        }
        assert_eq!(
            seen.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            ["APPROACH_OUT", "SEAT_IN", "UNLOCK", "RETREAT", "DONE"]
        );
    }

    #[test]
    fn test_detach_target_prefers_origin() {
        let mut hs = holders();
        hs[0].tool = None;
        let target = select_detach_target(&hs, Some("holder1"), None).unwrap();
        assert_eq!(target.name, "holder1");
    }

    #[test]
    fn test_detach_target_falls_back_to_first_empty() {
        let hs = holders();
        let target = select_detach_target(&hs, Some("holder1"), None).unwrap();
        assert_eq!(target.name, "holder2");
        let target = select_detach_target(&hs, None, None).unwrap();
        assert_eq!(target.name, "holder2");
    }

    #[test]
    fn test_detach_target_named() {
        let hs = holders();
        assert_eq!(
            select_detach_target(&hs, None, Some("holder3")).map(|h| h.name.as_str()),
            Some("holder3")
        );
        assert!(select_detach_target(&hs, None, Some("holder1")).is_none());
        assert!(select_detach_target(&hs, None, Some("missing")).is_none());
    }

    #[tokio::test]
    async fn test_attach_conflict_keeps_holder_tool() {
        use super::super::controller::{GantryConfig, GantryState, ToolChangeConfig};
        use crate::communication::{
            Communicator, ConnectionParams, DeviceChannel, SimulatedTinyG, SimulatorState,
        };
        use cellkit_core::{thread_safe, Error};
        use std::sync::Arc;

        let sim = thread_safe(SimulatorState::default());
        let channel = DeviceChannel::with_factory(
            "gantry",
            Arc::new(move |_: &ConnectionParams| -> Box<dyn Communicator> {
                Box::new(SimulatedTinyG::with_state(sim.clone()))
            }),
        );
        let config = GantryConfig {
            settle_ms: 0,
            reset_settle_ms: 0,
            tool_change: ToolChangeConfig::immediate(),
            ..GantryConfig::default()
        };
        let mut hs = holders();
        hs[1].tool = Some("gripper".to_string());
        let gantry = GantryController::with_channel("gantry", config, channel).with_state(GantryState {
            holders: hs,
            ..GantryState::default()
        });
        gantry.connect(&ConnectionParams::simulated()).await.unwrap();

        let err = gantry.attach("holder1").await.unwrap_err();
        assert!(matches!(err, Error::Controller(ControllerError::ToolConflict { .. })));

        let state = gantry.snapshot();
        assert_eq!(state.holder("holder1").unwrap().tool.as_deref(), Some("gripper"));
        assert_eq!(state.holder("holder2").unwrap().tool.as_deref(), Some("gripper"));
        assert!(state.toolend.tool.is_none());
    }
}
