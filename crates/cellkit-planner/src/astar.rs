//! A* search on an implicit XY grid
//!
//! The grid is anchored at the start point and spaced by `step`; moves are
//! the four axis directions only, each costing `step`. The heuristic is the
//! Manhattan distance to the goal, which is admissible and consistent for
//! this move set.
//!
//! Cells are kept as integer offsets from the start so that coordinates are
//! recomputed as `start + i * step` instead of accumulating float error.

use crate::geometry::{Aabb, WorkspaceBounds};
use cellkit_core::PlannerError;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

type Cell = (i64, i64);

const MOVES: [Cell; 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// Open-set entry, ordered as a min-heap on f-score then insertion order.
#[derive(Debug, Clone, Copy)]
struct OpenEntry {
    f: f64,
    seq: u64,
    steps: u64,
    cell: Cell,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the smallest f first, then the oldest entry
        other
            .f
            .total_cmp(&self.f)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Find a four-connected grid path from `start` to within one `step` of `goal`.
///
/// Returns the XY points from `start` (inclusive) to the first node whose
/// distance to `goal` is below `step` on both axes. Consecutive points differ
/// by exactly `step` on one axis. Nodes outside `bounds` or inside any
/// obstacle footprint inflated by `radius` are never entered; the start node
/// itself is not checked.
///
/// # Errors
///
/// [`PlannerError::PathNotFound`] when the reachable part of the grid is
/// exhausted, and [`PlannerError::InvalidParameter`] for a non-positive
/// `step` or a negative `radius`.
pub fn grid_search(
    start: (f64, f64),
    goal: (f64, f64),
    obstacles: &[Aabb],
    bounds: &WorkspaceBounds,
    step: f64,
    radius: f64,
) -> Result<Vec<(f64, f64)>, PlannerError> {
    if !(step.is_finite() && step > 0.0) {
        return Err(PlannerError::InvalidParameter {
            reason: format!("step must be positive, got {step}"),
        });
    }
    if !(radius.is_finite() && radius >= 0.0) {
        return Err(PlannerError::InvalidParameter {
            reason: format!("radius must be non-negative, got {radius}"),
        });
    }

    let point = |cell: Cell| {
        (
            start.0 + cell.0 as f64 * step,
            start.1 + cell.1 as f64 * step,
        )
    };
    let heuristic = |(x, y): (f64, f64)| (goal.0 - x).abs() + (goal.1 - y).abs();

    let origin: Cell = (0, 0);
    let mut open = BinaryHeap::new();
    let mut best_steps: HashMap<Cell, u64> = HashMap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut seq = 0u64;

    best_steps.insert(origin, 0);
    open.push(OpenEntry {
        f: heuristic(start),
        seq,
        steps: 0,
        cell: origin,
    });

    let mut expanded = 0usize;
    while let Some(entry) = open.pop() {
        // Skip entries superseded by a cheaper route to the same cell
        if best_steps.get(&entry.cell) != Some(&entry.steps) {
            continue;
        }

        let (x, y) = point(entry.cell);
        if (x - goal.0).abs() < step && (y - goal.1).abs() < step {
            tracing::debug!(expanded, steps = entry.steps, "grid search reached goal");
            return Ok(reconstruct(&came_from, entry.cell)
                .into_iter()
                .map(point)
                .collect());
        }
        expanded += 1;

        for (dx, dy) in MOVES {
            let next = (entry.cell.0 + dx, entry.cell.1 + dy);
            let (nx, ny) = point(next);

            if !bounds.contains(nx, ny) {
                continue;
            }
            if obstacles.iter().any(|obs| obs.contains_xy(nx, ny, radius)) {
                continue;
            }

            let tentative = entry.steps + 1;
            if tentative < best_steps.get(&next).copied().unwrap_or(u64::MAX) {
                came_from.insert(next, entry.cell);
                best_steps.insert(next, tentative);
                seq += 1;
                open.push(OpenEntry {
                    f: tentative as f64 * step + heuristic((nx, ny)),
                    seq,
                    steps: tentative,
                    cell: next,
                });
            }
        }
    }

    tracing::debug!(expanded, "grid search exhausted open set");
    Err(PlannerError::PathNotFound { start, goal })
}

fn reconstruct(came_from: &HashMap<Cell, Cell>, mut current: Cell) -> Vec<Cell> {
    let mut cells = vec![current];
    while let Some(&prev) = came_from.get(&current) {
        cells.push(prev);
        current = prev;
    }
    cells.reverse();
    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_field() -> WorkspaceBounds {
        WorkspaceBounds::new((0.0, 100.0), (0.0, 100.0))
    }

    #[test]
    fn test_straight_line_without_obstacles() {
        let path = grid_search((0.0, 0.0), (50.0, 0.0), &[], &open_field(), 10.0, 1.0).unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(path.first(), Some(&(0.0, 0.0)));
        assert_eq!(path.last(), Some(&(50.0, 0.0)));
    }

    #[test]
    fn test_start_within_step_of_goal() {
        let path = grid_search((10.0, 10.0), (12.0, 13.0), &[], &open_field(), 5.0, 1.0).unwrap();
        assert_eq!(path, vec![(10.0, 10.0)]);
    }

    #[test]
    fn test_step_count_is_manhattan_when_clear() {
        let path = grid_search((0.0, 0.0), (30.0, 40.0), &[], &open_field(), 10.0, 0.0).unwrap();
        // 3 + 4 moves plus the start node
        assert_eq!(path.len(), 8);
    }

    #[test]
    fn test_enclosed_goal_not_found() {
        let walls = [
            Aabb::new(60.0, 60.0, 0.0, 90.0, 62.0, 10.0).unwrap(),
            Aabb::new(60.0, 88.0, 0.0, 90.0, 90.0, 10.0).unwrap(),
            Aabb::new(60.0, 60.0, 0.0, 62.0, 90.0, 10.0).unwrap(),
            Aabb::new(88.0, 60.0, 0.0, 90.0, 90.0, 10.0).unwrap(),
        ];
        let err = grid_search((0.0, 0.0), (75.0, 75.0), &walls, &open_field(), 5.0, 1.0)
            .unwrap_err();
        assert!(matches!(err, PlannerError::PathNotFound { .. }));
    }

    #[test]
    fn test_goal_outside_bounds_not_found() {
        let bounds = WorkspaceBounds::new((0.0, 20.0), (0.0, 20.0));
        let err = grid_search((0.0, 0.0), (100.0, 0.0), &[], &bounds, 5.0, 0.0).unwrap_err();
        assert!(matches!(err, PlannerError::PathNotFound { .. }));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(matches!(
            grid_search((0.0, 0.0), (1.0, 1.0), &[], &open_field(), 0.0, 1.0),
            Err(PlannerError::InvalidParameter { .. })
        ));
        assert!(matches!(
            grid_search((0.0, 0.0), (1.0, 1.0), &[], &open_field(), 1.0, -1.0),
            Err(PlannerError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_deterministic_for_identical_inputs() {
        let obstacle = [Aabb::new(20.0, 20.0, 0.0, 40.0, 40.0, 5.0).unwrap()];
        let a = grid_search((0.0, 0.0), (60.0, 60.0), &obstacle, &open_field(), 5.0, 2.0).unwrap();
        let b = grid_search((0.0, 0.0), (60.0, 60.0), &obstacle, &open_field(), 5.0, 2.0).unwrap();
        assert_eq!(a, b);
    }
}
