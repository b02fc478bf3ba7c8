//! Obstacle geometry
//!
//! Axis-aligned bounding boxes and rectangular workspace limits.

use cellkit_core::{PlannerError, Waypoint};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
///
/// Immutable once built; [`Aabb::new`] rejects boxes whose minimum exceeds
/// the maximum on any axis, and deserialization goes through the same check.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AabbRepr", into = "AabbRepr")]
pub struct Aabb {
    xmin: f64,
    ymin: f64,
    zmin: f64,
    xmax: f64,
    ymax: f64,
    zmax: f64,
}

impl Aabb {
    /// Create a box from its six extents
    pub fn new(
        xmin: f64,
        ymin: f64,
        zmin: f64,
        xmax: f64,
        ymax: f64,
        zmax: f64,
    ) -> Result<Self, PlannerError> {
        for (axis, lo, hi) in [("x", xmin, xmax), ("y", ymin, ymax), ("z", zmin, zmax)] {
            // NaN fails this comparison too
            if !(lo <= hi) {
                return Err(PlannerError::InvalidBox {
                    reason: format!("{axis}min {lo} > {axis}max {hi}"),
                });
            }
        }

        Ok(Self {
            xmin,
            ymin,
            zmin,
            xmax,
            ymax,
            zmax,
        })
    }

    /// Check whether a tool of `radius` at (x, y) overlaps the box footprint.
    ///
    /// Z is ignored: the answer holds for any transit height. Both bounds are
    /// inclusive, so a point exactly `radius` outside an edge collides.
    pub fn contains_xy(&self, x: f64, y: f64, radius: f64) -> bool {
        self.xmin - radius <= x
            && x <= self.xmax + radius
            && self.ymin - radius <= y
            && y <= self.ymax + radius
    }

    pub fn min(&self) -> Waypoint {
        Waypoint::new(self.xmin, self.ymin, self.zmin)
    }

    pub fn max(&self) -> Waypoint {
        Waypoint::new(self.xmax, self.ymax, self.zmax)
    }

    /// Height of the top face
    pub fn top(&self) -> f64 {
        self.zmax
    }
}

#[derive(Serialize, Deserialize)]
struct AabbRepr {
    xmin: f64,
    ymin: f64,
    zmin: f64,
    xmax: f64,
    ymax: f64,
    zmax: f64,
}

impl TryFrom<AabbRepr> for Aabb {
    type Error = PlannerError;

    fn try_from(r: AabbRepr) -> Result<Self, Self::Error> {
        Aabb::new(r.xmin, r.ymin, r.zmin, r.xmax, r.ymax, r.zmax)
    }
}

impl From<Aabb> for AabbRepr {
    fn from(b: Aabb) -> Self {
        Self {
            xmin: b.xmin,
            ymin: b.ymin,
            zmin: b.zmin,
            xmax: b.xmax,
            ymax: b.ymax,
            zmax: b.zmax,
        }
    }
}

/// Rectangular XY limits of the reachable workspace (inclusive)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceBounds {
    /// (min, max) along X
    pub x: (f64, f64),
    /// (min, max) along Y
    pub y: (f64, f64),
}

impl WorkspaceBounds {
    pub fn new(x: (f64, f64), y: (f64, f64)) -> Self {
        Self { x, y }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x.0 <= x && x <= self.x.1 && self.y.0 <= y && y <= self.y.1
    }

    pub fn is_valid(&self) -> bool {
        self.x.0 <= self.x.1 && self.y.0 <= self.y.1
    }
}

impl Default for WorkspaceBounds {
    fn default() -> Self {
        Self {
            x: (0.0, 600.0),
            y: (0.0, 400.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_inverted_axis() {
        let err = Aabb::new(10.0, 0.0, 0.0, 5.0, 10.0, 10.0).unwrap_err();
        assert!(matches!(err, PlannerError::InvalidBox { .. }));
        assert!(Aabb::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0).is_ok());
        assert!(Aabb::new(0.0, f64::NAN, 0.0, 1.0, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_contains_xy_edges() {
        let b = Aabb::new(40.0, 40.0, 0.0, 80.0, 80.0, 50.0).unwrap();
        assert!(b.contains_xy(60.0, 60.0, 0.0));
        assert!(b.contains_xy(35.0, 60.0, 5.0));
        assert!(!b.contains_xy(34.9, 60.0, 5.0));
        assert!(b.contains_xy(85.0, 85.0, 5.0));
        assert!(!b.contains_xy(85.0, 85.1, 5.0));
    }

    #[test]
    fn test_contains_xy_ignores_z() {
        let b = Aabb::new(0.0, 0.0, 100.0, 10.0, 10.0, 200.0).unwrap();
        assert!(b.contains_xy(5.0, 5.0, 0.0));
    }

    #[test]
    fn test_deserialize_validates() {
        let ok: Aabb = serde_json::from_str(
            r#"{"xmin":0,"ymin":0,"zmin":0,"xmax":1,"ymax":2,"zmax":3}"#,
        )
        .unwrap();
        assert_eq!(ok.top(), 3.0);

        let bad = serde_json::from_str::<Aabb>(
            r#"{"xmin":5,"ymin":0,"zmin":0,"xmax":1,"ymax":2,"zmax":3}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_bounds_inclusive() {
        let bounds = WorkspaceBounds::new((0.0, 150.0), (0.0, 150.0));
        assert!(bounds.contains(0.0, 150.0));
        assert!(!bounds.contains(-0.1, 10.0));
        assert!(bounds.is_valid());
    }
}
