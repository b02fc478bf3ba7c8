//! Three-phase route synthesis: rise, traverse, descend.

use crate::astar::grid_search;
use crate::geometry::{Aabb, WorkspaceBounds};
use cellkit_core::{PlannerError, Waypoint};

/// Reject a transit height that does not clear every obstacle top face.
pub fn check_transit_height(obstacles: &[Aabb], safe_z: f64) -> Result<(), PlannerError> {
    let highest = obstacles
        .iter()
        .map(Aabb::top)
        .fold(f64::NEG_INFINITY, f64::max);

    if highest >= safe_z {
        return Err(PlannerError::TransitTooLow {
            safe_z,
            obstacle_top: highest,
        });
    }
    Ok(())
}

/// Plan a 3-D tool-tip route from `start` to `goal`.
///
/// The route is: the point above `start` at `safe_z`, the XY grid path at
/// `safe_z` (its first node is that same point and is not repeated), then the
/// literal `goal`. The result therefore always has at least two waypoints.
///
/// Fails without producing a partial route when the XY search fails or an
/// obstacle reaches `safe_z`.
pub fn plan_path(
    start: Waypoint,
    goal: Waypoint,
    obstacles: &[Aabb],
    bounds: &WorkspaceBounds,
    safe_z: f64,
    step: f64,
    radius: f64,
) -> Result<Vec<Waypoint>, PlannerError> {
    check_transit_height(obstacles, safe_z)?;

    let xy_path = grid_search(start.xy(), goal.xy(), obstacles, bounds, step, radius)?;

    let mut route = Vec::with_capacity(xy_path.len() + 1);
    route.push(Waypoint::new(start.x, start.y, safe_z));
    route.extend(
        xy_path
            .into_iter()
            .skip(1)
            .map(|(x, y)| Waypoint::new(x, y, safe_z)),
    );
    route.push(goal);

    tracing::debug!(
        waypoints = route.len(),
        safe_z,
        "planned route from ({:.3}, {:.3}, {:.3}) to ({:.3}, {:.3}, {:.3})",
        start.x,
        start.y,
        start.z,
        goal.x,
        goal.y,
        goal.z
    );
    Ok(route)
}
