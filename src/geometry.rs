use nalgebra as na;
use num_traits::Float;

/// Mean of the present points, rounded to whole pixel coordinates.
///
/// Absent entries are dropped first; `None` when nothing remains. The
/// result does not depend on input order.
pub fn middle_point<F: na::RealField + Float>(
    points: &[Option<na::Point2<F>>],
) -> Option<na::Point2<F>> {
    let mut sum = na::Vector2::new(F::zero(), F::zero());
    let mut n = 0usize;

    for p in points.iter().flatten() {
        sum += p.coords;
        n += 1;
    }

    if n == 0 {
        return None;
    }

    let n = F::from(n)?;
    Some(na::Point2::new(
        Float::round(sum.x / n),
        Float::round(sum.y / n),
    ))
}

/// Euclidean distance between two points.
#[inline]
pub fn distance<F: na::RealField + Float>(p1: na::Point2<F>, p2: na::Point2<F>) -> F {
    na::distance(&p1, &p2)
}

/// `p2 + (p2 - p1)`, one step of linear dead reckoning.
#[inline]
pub fn extrapolate_linear<F: na::RealField + Float>(
    p1: na::Point2<F>,
    p2: na::Point2<F>,
) -> na::Point2<F> {
    p2 + (p2 - p1)
}

/// One-step position guess from the three most recent history entries,
/// newest first. A present latest entry wins; otherwise the two entries
/// before it are extrapolated; otherwise the position stays unknown.
pub fn guess_position(
    last: Option<na::Point2<f32>>,
    prev: Option<na::Point2<f32>>,
    prev2: Option<na::Point2<f32>>,
) -> Option<na::Point2<f32>> {
    if last.is_some() {
        return last;
    }
    match (prev2, prev) {
        (Some(a), Some(b)) => Some(extrapolate_linear(a, b)),
        _ => None,
    }
}

/// `atan2(dy, dx)` in degrees, normalized into `[0, 360)`.
#[inline]
pub fn angle_deg(dx: f32, dy: f32) -> f32 {
    dy.atan2(dx).to_degrees().rem_euclid(360.0)
}

/// Heading between two markers: direction of the p1->p2 vector rotated
/// by 90 degrees, normalized into `[0, 360)`.
#[inline]
pub fn norm_angle_deg(p1: na::Point2<f32>, p2: na::Point2<f32>) -> f32 {
    let dx = p2.x - p1.x;
    let dy = p2.y - p1.y;
    (dy.atan2(dx).to_degrees() + 90.0).rem_euclid(360.0)
}

/// Axis-aligned rectangle given by two opposite corners. Used for the
/// per-marker search windows; corners may lie outside the frame and get
/// clipped at use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub p1: na::Point2<f32>,
    pub p2: na::Point2<f32>,
}

impl Rect {
    pub fn new(p1: na::Point2<f32>, p2: na::Point2<f32>) -> Self {
        Self { p1, p2 }
    }

    pub fn from_coords(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(na::Point2::new(x1, y1), na::Point2::new(x2, y2))
    }

    /// Centered square window with the given half-width.
    pub fn around(center: na::Point2<f32>, half: f32) -> Self {
        Self::from_coords(
            center.x - half,
            center.y - half,
            center.x + half,
            center.y + half,
        )
    }

    /// Clip to `[0, w) x [0, h)` pixel index ranges, ordered corners.
    /// Degenerate windows collapse to an empty range rather than fail.
    pub fn clamp_to(&self, width: usize, height: usize) -> (usize, usize, usize, usize) {
        let (ax, bx) = if self.p1.x <= self.p2.x {
            (self.p1.x, self.p2.x)
        } else {
            (self.p2.x, self.p1.x)
        };
        let (ay, by) = if self.p1.y <= self.p2.y {
            (self.p1.y, self.p2.y)
        } else {
            (self.p2.y, self.p1.y)
        };

        let ax = (ax.max(0.0) as usize).min(width.saturating_sub(1));
        let ay = (ay.max(0.0) as usize).min(height.saturating_sub(1));
        let bx = (bx.max(0.0) as usize).min(width.saturating_sub(1));
        let by = (by.max(0.0) as usize).min(height.saturating_sub(1));

        (ax, ay, bx, by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    #[test]
    fn middle_point_single_survivor() {
        let pts = [None, Some(Point2::new(12.0f32, 7.0)), None];
        assert_eq!(middle_point(&pts), Some(Point2::new(12.0, 7.0)));
    }

    #[test]
    fn middle_point_empty_is_absent() {
        let pts: [Option<Point2<f32>>; 2] = [None, None];
        assert_eq!(middle_point(&pts), None);
        assert_eq!(middle_point::<f32>(&[]), None);
    }

    #[test]
    fn middle_point_order_invariant() {
        let a = [
            Some(Point2::new(100.0f32, 100.0)),
            Some(Point2::new(140.0, 100.0)),
        ];
        let b = [
            Some(Point2::new(140.0f32, 100.0)),
            Some(Point2::new(100.0, 100.0)),
        ];
        assert_eq!(middle_point(&a), middle_point(&b));
        assert_eq!(middle_point(&a), Some(Point2::new(120.0, 100.0)));
    }

    #[test]
    fn middle_point_rounds_to_pixels() {
        let pts = [
            Some(Point2::new(0.0f32, 0.0)),
            Some(Point2::new(1.0, 1.0)),
            Some(Point2::new(2.0, 0.0)),
        ];
        // mean y = 1/3, rounds down
        assert_eq!(middle_point(&pts), Some(Point2::new(1.0, 0.0)));
    }

    #[test]
    fn extrapolation_doubles_the_step() {
        let p = extrapolate_linear(Point2::new(10.0f32, 20.0), Point2::new(14.0, 18.0));
        assert_eq!(p, Point2::new(18.0, 16.0));
    }

    #[test]
    fn guess_prefers_present_latest() {
        let last = Some(Point2::new(5.0, 5.0));
        assert_eq!(guess_position(last, None, None), last);
    }

    #[test]
    fn guess_extrapolates_from_prior_pair() {
        let guessed = guess_position(
            None,
            Some(Point2::new(12.0, 10.0)),
            Some(Point2::new(10.0, 10.0)),
        );
        assert_eq!(guessed, Some(Point2::new(14.0, 10.0)));
    }

    #[test]
    fn guess_absent_without_evidence() {
        assert_eq!(guess_position(None, Some(Point2::new(1.0, 1.0)), None), None);
        assert_eq!(guess_position(None, None, None), None);
    }

    #[test]
    fn angles_are_normalized() {
        assert_relative_eq!(angle_deg(1.0, 0.0), 0.0);
        assert_relative_eq!(angle_deg(0.0, 1.0), 90.0);
        assert_relative_eq!(angle_deg(0.0, -1.0), 270.0);
        assert_relative_eq!(angle_deg(-1.0, 0.0), 180.0);
    }

    #[test]
    fn norm_angle_is_rotated_heading() {
        // horizontal pair: heading straight "up" in screen coordinates
        let a = Point2::new(100.0, 100.0);
        let b = Point2::new(140.0, 100.0);
        assert_relative_eq!(norm_angle_deg(a, b), 90.0);
        assert_relative_eq!(norm_angle_deg(b, a), 270.0);
    }

    #[test]
    fn rect_clamps_out_of_bounds_corners() {
        let r = Rect::from_coords(-40.0, -10.0, 700.0, 250.0);
        assert_eq!(r.clamp_to(640, 200), (0, 0, 639, 199));

        let r = Rect::from_coords(620.0, 10.0, 700.0, 50.0);
        assert_eq!(r.clamp_to(640, 200), (620, 10, 639, 50));
    }
}
