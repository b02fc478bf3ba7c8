//! Planner facade holding the workspace model and obstacle set.

use crate::geometry::{Aabb, WorkspaceBounds};
use crate::route::plan_path;
use cellkit_core::{PlannerError, Waypoint};
use serde::{Deserialize, Serialize};

/// Search parameters shared by every plan
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Grid spacing in millimeters
    pub step: f64,
    /// Tool clearance radius in millimeters
    pub radius: f64,
    /// Transit height for the horizontal leg
    pub safe_z: f64,
    /// Reachable XY area
    pub bounds: WorkspaceBounds,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            bounds: WorkspaceBounds::default(),
            step: 5.0,
            radius: 2.0,
            safe_z: 50.0,
        }
    }
}

impl PlannerConfig {
    /// Validate search parameters
    pub fn validate(&self) -> Result<(), PlannerError> {
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(PlannerError::InvalidParameter {
                reason: format!("step must be positive, got {}", self.step),
            });
        }
        if !(self.radius.is_finite() && self.radius >= 0.0) {
            return Err(PlannerError::InvalidParameter {
                reason: format!("radius must be non-negative, got {}", self.radius),
            });
        }
        if !self.bounds.is_valid() {
            return Err(PlannerError::InvalidParameter {
                reason: "workspace bounds are inverted".to_string(),
            });
        }
        Ok(())
    }
}

/// Route planner over a fixed obstacle set
#[derive(Debug, Clone, Default)]
pub struct PathPlanner {
    config: PlannerConfig,
    obstacles: Vec<Aabb>,
}

impl PathPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            obstacles: Vec::new(),
        }
    }

    /// Builder-style obstacle set
    pub fn with_obstacles(mut self, obstacles: impl IntoIterator<Item = Aabb>) -> Self {
        self.obstacles.extend(obstacles);
        self
    }

    pub fn add_obstacle(&mut self, obstacle: Aabb) {
        self.obstacles.push(obstacle);
    }

    pub fn clear_obstacles(&mut self) {
        self.obstacles.clear();
    }

    pub fn obstacles(&self) -> &[Aabb] {
        &self.obstacles
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Plan a route with the configured transit height
    pub fn plan(&self, start: Waypoint, goal: Waypoint) -> Result<Vec<Waypoint>, PlannerError> {
        self.plan_at(start, goal, self.config.safe_z)
    }

    /// Plan a route with an explicit transit height
    pub fn plan_at(
        &self,
        start: Waypoint,
        goal: Waypoint,
        safe_z: f64,
    ) -> Result<Vec<Waypoint>, PlannerError> {
        self.config.validate()?;
        plan_path(
            start,
            goal,
            &self.obstacles,
            &self.config.bounds,
            safe_z,
            self.config.step,
            self.config.radius,
        )
    }
}
