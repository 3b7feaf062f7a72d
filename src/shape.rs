use nalgebra as na;

use crate::error::Error;
use crate::geometry;

/// Geometric primitive of a region or blind-spot mask, tagged by kind.
/// Each variant carries its own defining points.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    /// Two opposite corners.
    Rectangle {
        p1: na::Point2<f32>,
        p2: na::Point2<f32>,
    },
    /// Center plus radius; configured from a center point and one point
    /// on the circle.
    Circle { center: na::Point2<f32>, radius: f32 },
    /// Segment between two endpoints.
    Line {
        p1: na::Point2<f32>,
        p2: na::Point2<f32>,
    },
}

/// One independently activatable shape. Regions and blind spots are
/// built from several of these.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub label: Option<String>,
    pub kind: ShapeKind,
    pub active: bool,
}

impl Shape {
    pub fn new(kind: ShapeKind, label: Option<String>) -> Self {
        Self {
            label,
            kind,
            active: true,
        }
    }

    /// Build from a template entry: kind name (case-insensitive) and two
    /// defining points. Unknown names are a configuration error.
    pub fn from_template(
        kind: &str,
        p1: na::Point2<f32>,
        p2: na::Point2<f32>,
        label: Option<String>,
    ) -> Result<Self, Error> {
        let kind = match kind.to_ascii_lowercase().as_str() {
            "rectangle" => ShapeKind::Rectangle { p1, p2 },
            "circle" => ShapeKind::Circle {
                center: p1,
                radius: geometry::distance(p1, p2),
            },
            "line" => ShapeKind::Line { p1, p2 },
            other => return Err(Error::UnknownShape(other.to_string())),
        };
        Ok(Self::new(kind, label))
    }

    /// Translate the defining points.
    pub fn move_by(&mut self, dx: f32, dy: f32) {
        let d = na::Vector2::new(dx, dy);
        match &mut self.kind {
            ShapeKind::Rectangle { p1, p2 } | ShapeKind::Line { p1, p2 } => {
                *p1 += d;
                *p2 += d;
            }
            ShapeKind::Circle { center, .. } => *center += d,
        }
    }

    /// Point-in-shape test. Inactive shapes never collide.
    ///
    /// Rectangle bounds are exclusive, the circle boundary is inclusive.
    /// The line test demands an exact slope match inside the segment's
    /// bounding box.
    pub fn collides(&self, point: na::Point2<f32>) -> bool {
        if !self.active {
            return false;
        }
        match &self.kind {
            ShapeKind::Rectangle { p1, p2 } => in_open_bbox(point, *p1, *p2),
            ShapeKind::Circle { center, radius } => {
                geometry::distance(*center, point) <= *radius
            }
            ShapeKind::Line { p1, p2 } => {
                if !in_open_bbox(point, *p1, *p2) {
                    return false;
                }
                segment_slope(*p1, *p2) == segment_slope(point, *p2)
            }
        }
    }
}

#[inline]
fn in_open_bbox(p: na::Point2<f32>, a: na::Point2<f32>, b: na::Point2<f32>) -> bool {
    p.x > a.x.min(b.x) && p.x < a.x.max(b.x) && p.y > a.y.min(b.y) && p.y < a.y.max(b.y)
}

/// Unsigned slope; vertical runs report 1.
#[inline]
fn segment_slope(a: na::Point2<f32>, b: na::Point2<f32>) -> f32 {
    let dx = (a.x - b.x).abs();
    if dx > 0.0 {
        (a.y - b.y).abs() / dx
    } else {
        1.0
    }
}
