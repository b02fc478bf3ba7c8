//! # CellKit Planner
//!
//! Collision-free routing for the gantry tool tip.
//!
//! Obstacles are modelled as axis-aligned boxes. A route is built in three
//! phases: rise to a transit height, traverse an A* path in the XY plane
//! around the obstacle footprints, then descend to the goal.
//!
//! ```ignore
//! use cellkit_planner::{Aabb, PathPlanner, PlannerConfig};
//!
//! let mut planner = PathPlanner::new(PlannerConfig::default());
//! planner.add_obstacle(Aabb::new(40.0, 40.0, 0.0, 80.0, 80.0, 50.0)?);
//! let route = planner.plan((0.0, 0.0, 0.0).into(), (100.0, 100.0, 0.0).into())?;
//! ```

pub mod astar;
pub mod geometry;
pub mod planner;
pub mod route;

pub use astar::grid_search;
pub use geometry::{Aabb, WorkspaceBounds};
pub use planner::{PathPlanner, PlannerConfig};
pub use route::{check_transit_height, plan_path};
