use cellkit_core::{PlannerError, Waypoint};
use cellkit_planner::{grid_search, plan_path, Aabb, PathPlanner, PlannerConfig, WorkspaceBounds};
use proptest::prelude::*;

fn cell_bounds() -> WorkspaceBounds {
    WorkspaceBounds::new((0.0, 150.0), (0.0, 150.0))
}

#[test]
fn test_detour_around_central_obstacle() {
    let obstacle = Aabb::new(40.0, 40.0, 0.0, 80.0, 80.0, 50.0).unwrap();
    let route = plan_path(
        Waypoint::new(0.0, 0.0, 0.0),
        Waypoint::new(100.0, 100.0, 0.0),
        &[obstacle],
        &cell_bounds(),
        60.0,
        10.0,
        5.0,
    )
    .unwrap();

    assert_eq!(route.first(), Some(&Waypoint::new(0.0, 0.0, 60.0)));
    assert_eq!(route.last(), Some(&Waypoint::new(100.0, 100.0, 0.0)));

    for wp in &route[1..route.len() - 1] {
        let inside = (35.0..=85.0).contains(&wp.x) && (35.0..=85.0).contains(&wp.y);
        assert!(!inside, "waypoint {:?} crosses the obstacle", wp);
        assert_eq!(wp.z, 60.0);
    }
}

#[test]
fn test_goal_within_one_step_gives_two_points() {
    let route = plan_path(
        Waypoint::new(20.0, 20.0, 0.0),
        Waypoint::new(20.0, 20.0, 10.0),
        &[],
        &cell_bounds(),
        60.0,
        10.0,
        5.0,
    )
    .unwrap();
    assert_eq!(
        route,
        vec![Waypoint::new(20.0, 20.0, 60.0), Waypoint::new(20.0, 20.0, 10.0)]
    );

    let route = plan_path(
        Waypoint::new(20.0, 20.0, 0.0),
        Waypoint::new(24.0, 17.0, 0.0),
        &[],
        &cell_bounds(),
        60.0,
        10.0,
        5.0,
    )
    .unwrap();
    assert_eq!(route.len(), 2);
}

#[test]
fn test_enclosed_goal_is_path_not_found() {
    let ring = [
        Aabb::new(90.0, 90.0, 0.0, 130.0, 92.0, 20.0).unwrap(),
        Aabb::new(90.0, 128.0, 0.0, 130.0, 130.0, 20.0).unwrap(),
        Aabb::new(90.0, 90.0, 0.0, 92.0, 130.0, 20.0).unwrap(),
        Aabb::new(128.0, 90.0, 0.0, 130.0, 130.0, 20.0).unwrap(),
    ];
    let planner = PathPlanner::new(PlannerConfig {
        bounds: cell_bounds(),
        step: 10.0,
        radius: 2.0,
        safe_z: 40.0,
    })
    .with_obstacles(ring);

    let err = planner
        .plan(Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(110.0, 110.0, 0.0))
        .unwrap_err();
    assert!(matches!(err, PlannerError::PathNotFound { .. }));
}

#[test]
fn test_low_transit_height_is_rejected() {
    let planner = PathPlanner::new(PlannerConfig {
        bounds: cell_bounds(),
        step: 10.0,
        radius: 5.0,
        safe_z: 40.0,
    })
    .with_obstacles([Aabb::new(40.0, 40.0, 0.0, 80.0, 80.0, 50.0).unwrap()]);

    let err = planner
        .plan(Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(100.0, 100.0, 0.0))
        .unwrap_err();
    assert!(matches!(err, PlannerError::TransitTooLow { .. }));

    assert!(planner
        .plan_at(Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(100.0, 100.0, 0.0), 60.0)
        .is_ok());
}

fn obstacle_strategy() -> impl Strategy<Value = Aabb> {
    (20.0..120.0f64, 20.0..120.0f64, 1.0..30.0f64, 1.0..30.0f64).prop_map(|(x, y, w, h)| {
        Aabb::new(x, y, 0.0, x + w, y + h, 10.0).unwrap()
    })
}

proptest! {
    #[test]
    fn prop_contains_xy_inclusive_at_inflated_edge(
        xmin in -500.0..500.0f64,
        ymin in -500.0..500.0f64,
        w in 0.0..200.0f64,
        h in 0.0..200.0f64,
        r in 0.0..50.0f64,
    ) {
        let b = Aabb::new(xmin, ymin, 0.0, xmin + w, ymin + h, 1.0).unwrap();
        let cy = ymin + h / 2.0;
        let cx = xmin + w / 2.0;
        let eps = 1e-3;

        prop_assert!(b.contains_xy(xmin - r, cy, r));
        prop_assert!(b.contains_xy(xmin + w + r, cy, r));
        prop_assert!(b.contains_xy(cx, ymin - r, r));
        prop_assert!(b.contains_xy(cx, ymin + h + r, r));

        prop_assert!(!b.contains_xy(xmin - r - eps, cy, r));
        prop_assert!(!b.contains_xy(xmin + w + r + eps, cy, r));
        prop_assert!(!b.contains_xy(cx, ymin - r - eps, r));
        prop_assert!(!b.contains_xy(cx, ymin + h + r + eps, r));
    }

    #[test]
    fn prop_grid_path_moves_one_step_and_avoids_obstacles(
        obstacles in prop::collection::vec(obstacle_strategy(), 0..4),
        gx in 0u32..15,
        gy in 0u32..15,
        step in prop::sample::select(vec![5.0f64, 10.0]),
        radius in 0.0..4.0f64,
    ) {
        let goal = (gx as f64 * 10.0, gy as f64 * 10.0);
        match grid_search((0.0, 0.0), goal, &obstacles, &cell_bounds(), step, radius) {
            Ok(path) => {
                prop_assert!(!path.is_empty());
                prop_assert_eq!(path[0], (0.0, 0.0));
                for pair in path.windows(2) {
                    let dx = (pair[1].0 - pair[0].0).abs();
                    let dy = (pair[1].1 - pair[0].1).abs();
                    let one_axis = (dx == step && dy == 0.0) || (dx == 0.0 && dy == step);
                    prop_assert!(one_axis, "non-unit move {:?}", pair);
                }
                for &(x, y) in &path[1..] {
                    prop_assert!(!obstacles.iter().any(|o| o.contains_xy(x, y, radius)));
                }
                let last = path[path.len() - 1];
                prop_assert!((last.0 - goal.0).abs() < step && (last.1 - goal.1).abs() < step);
            }
            Err(err) => {
                let is_not_found = matches!(err, PlannerError::PathNotFound { .. });
                prop_assert!(is_not_found);
            }
        }
    }

    #[test]
    fn prop_route_starts_at_transit_and_ends_at_goal(
        sx in 0u32..15,
        sy in 0u32..15,
        gx in 0.0..150.0f64,
        gy in 0.0..150.0f64,
        gz in 0.0..40.0f64,
    ) {
        let start = Waypoint::new(sx as f64 * 10.0, sy as f64 * 10.0, 0.0);
        let goal = Waypoint::new(gx, gy, gz);
        let route = plan_path(start, goal, &[], &cell_bounds(), 60.0, 10.0, 2.0).unwrap();
        prop_assert!(route.len() >= 2);
        prop_assert_eq!(route[0], Waypoint::new(start.x, start.y, 60.0));
        prop_assert_eq!(route[route.len() - 1], goal);
    }
}
