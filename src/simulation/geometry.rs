//! Geometry calculations for building-aware propagation and mobility bounds.
//!
//! Contains helper functions for:
//! - Point-in-shape tests (rectangles, boxes)
//! - Segment-rectangle and segment-segment intersection with collinear handling
//! - Counting the external walls a straight radio path crosses

use serde::{Deserialize, Serialize};

use super::types::Position;

/// Axis-aligned rectangle in the horizontal plane, used for mobility bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rectangle {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Rectangle {
    pub const fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Rectangle { x_min, x_max, y_min, y_max }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    /// Inclusive containment test on x and y.
    pub fn contains(&self, p: &Position) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    /// Clamp x and y into the rectangle, keeping z.
    pub fn clamp(&self, p: Position) -> Position {
        Position {
            x: p.x.clamp(self.x_min, self.x_max),
            y: p.y.clamp(self.y_min, self.y_max),
            z: p.z,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x_min.is_finite() && self.x_max.is_finite() && self.y_min.is_finite() && self.y_max.is_finite() && self.x_min <= self.x_max && self.y_min <= self.y_max
    }
}

/// Axis-aligned building volume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BuildingBounds {
    #[serde(flatten)]
    pub footprint: Rectangle,
    #[serde(default)]
    pub z_min: f64,
    pub z_max: f64,
}

impl BuildingBounds {
    /// Inclusive point-in-box test.
    pub fn contains(&self, p: &Position) -> bool {
        self.footprint.contains(p) && p.z >= self.z_min && p.z <= self.z_max
    }
}

/// Number of external walls of `building` that the straight path `a`–`b` crosses.
///
/// - 0 when both endpoints are inside (indoor link) or the path misses the building
/// - 1 when exactly one endpoint is inside
/// - 2 when both endpoints are outside and the path passes through the footprint
///   below the roof
///
/// The vertical check is coarse: a pass-through only counts when at least one
/// endpoint is at or below the roof height.
pub fn walls_crossed(a: &Position, b: &Position, building: &BuildingBounds) -> u32 {
    let a_inside = building.contains(a);
    let b_inside = building.contains(b);
    match (a_inside, b_inside) {
        (true, true) => 0,
        (true, false) | (false, true) => 1,
        (false, false) => {
            if a.z > building.z_max && b.z > building.z_max {
                return 0;
            }
            if segment_crosses_rect_interior(a, b, &building.footprint) { 2 } else { 0 }
        }
    }
}

// ---------- Geometry helpers ----------

/// True if the segment touches any edge of the rectangle (x/y only).
fn segment_crosses_rect_interior(p1: &Position, p2: &Position, rect: &Rectangle) -> bool {
    let lt = Position::new(rect.x_min, rect.y_min, 0.0);
    let rt = Position::new(rect.x_max, rect.y_min, 0.0);
    let rb = Position::new(rect.x_max, rect.y_max, 0.0);
    let lb = Position::new(rect.x_min, rect.y_max, 0.0);

    segments_intersect(p1, p2, &lt, &rt) || segments_intersect(p1, p2, &rt, &rb) || segments_intersect(p1, p2, &rb, &lb) || segments_intersect(p1, p2, &lb, &lt)
}

/// Orientation of ordered triplet (a,b,c) in the x/y plane: returns 1 if
/// clockwise, -1 if counter-clockwise, and 0 if collinear.
fn orientation(a: &Position, b: &Position, c: &Position) -> i32 {
    let val = (b.y - a.y) * (c.x - b.x) - (b.x - a.x) * (c.y - b.y);
    if val > 0.0 {
        1
    } else if val < 0.0 {
        -1
    } else {
        0
    }
}

/// True if point b lies on segment a–c, assuming collinearity.
fn on_segment(a: &Position, b: &Position, c: &Position) -> bool {
    b.x >= a.x.min(c.x) && b.x <= a.x.max(c.x) && b.y >= a.y.min(c.y) && b.y <= a.y.max(c.y)
}

/// Robust segment–segment intersection including collinear overlap.
///
/// Uses the orientation-based algorithm which handles all cases:
/// - Proper crossing intersection (segments cross at an interior point)
/// - Endpoint touching (segments meet at an endpoint)
/// - Collinear overlap (segments lie on the same line and overlap)
///
/// # Parameters
///
/// * `p1`, `q1` - Endpoints of the first segment
/// * `p2`, `q2` - Endpoints of the second segment
///
/// # Returns
///
/// `true` if the segments intersect or touch, `false` if they are disjoint.
pub fn segments_intersect(p1: &Position, q1: &Position, p2: &Position, q2: &Position) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }
    (o1 == 0 && on_segment(p1, p2, q1)) || (o2 == 0 && on_segment(p1, q2, q1)) || (o3 == 0 && on_segment(p2, p1, q2)) || (o4 == 0 && on_segment(p2, q1, q2))
}
