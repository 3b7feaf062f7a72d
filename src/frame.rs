use nalgebra as na;
use ndarray::Array3;

/// Where a frame came from. Only a tag; acquisition itself is behind
/// the [`FrameSource`](crate::pipeline::FrameSource) trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Camera,
    File,
}

/// One raster frame plus capture metadata. `img` is H x W x 3, BGR byte
/// order. Frames are handed through the pipeline by reference and never
/// retained beyond one processing step.
#[derive(Debug, Clone)]
pub struct Frame {
    pub img: Array3<u8>,
    /// Capture time in seconds since stream start.
    pub timestamp: f32,
    /// Seconds elapsed since the previous frame.
    pub interval: f32,
    pub source: SourceKind,
}

impl Frame {
    pub fn new(img: Array3<u8>, timestamp: f32, interval: f32, source: SourceKind) -> Self {
        Self {
            img,
            timestamp,
            interval,
            source,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.img.shape()[1]
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.img.shape()[0]
    }

    #[inline]
    fn put(&mut self, x: i64, y: i64, color: [u8; 3]) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width() || y >= self.height() {
            return;
        }
        for (c, v) in color.iter().enumerate() {
            self.img[[y, x, c]] = *v;
        }
    }

    /// Fill the axis-aligned rectangle between two corners, inclusive.
    pub fn fill_rect(&mut self, p1: na::Point2<f32>, p2: na::Point2<f32>, color: [u8; 3]) {
        let (x0, x1) = (p1.x.min(p2.x) as i64, p1.x.max(p2.x) as i64);
        let (y0, y1) = (p1.y.min(p2.y) as i64, p1.y.max(p2.y) as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.put(x, y, color);
            }
        }
    }

    /// Fill a disc, inclusive of the boundary.
    pub fn fill_circle(&mut self, center: na::Point2<f32>, radius: f32, color: [u8; 3]) {
        let r = radius.max(0.0);
        let (x0, x1) = ((center.x - r) as i64, (center.x + r).ceil() as i64);
        let (y0, y1) = ((center.y - r) as i64, (center.y + r).ceil() as i64);
        let r2 = r * r;
        for y in y0..=y1 {
            for x in x0..=x1 {
                let dx = x as f32 - center.x;
                let dy = y as f32 - center.y;
                if dx * dx + dy * dy <= r2 {
                    self.put(x, y, color);
                }
            }
        }
    }

    /// Stroke a line segment with the given pixel thickness.
    pub fn draw_line(
        &mut self,
        p1: na::Point2<f32>,
        p2: na::Point2<f32>,
        thickness: u32,
        color: [u8; 3],
    ) {
        let dx = p2.x - p1.x;
        let dy = p2.y - p1.y;
        let steps = dx.abs().max(dy.abs()).ceil().max(1.0) as usize;
        let half = (thickness as i64) / 2;

        for i in 0..=steps {
            let t = i as f32 / steps as f32;
            let cx = (p1.x + t * dx).round() as i64;
            let cy = (p1.y + t * dy).round() as i64;
            for oy in -half..=half {
                for ox in -half..=half {
                    self.put(cx + ox, cy + oy, color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn blank(w: usize, h: usize) -> Frame {
        Frame::new(Array3::zeros((h, w, 3)), 0.0, 0.04, SourceKind::File)
    }

    #[test]
    fn rect_fill_stays_in_bounds() {
        let mut f = blank(10, 10);
        f.fill_rect(
            na::Point2::new(-5.0, -5.0),
            na::Point2::new(20.0, 20.0),
            [0, 0, 255],
        );
        assert_eq!(f.img[[0, 0, 2]], 255);
        assert_eq!(f.img[[9, 9, 2]], 255);
    }

    #[test]
    fn circle_fill_is_inclusive() {
        let mut f = blank(21, 21);
        f.fill_circle(na::Point2::new(10.0, 10.0), 5.0, [255, 255, 255]);
        // point at exactly radius distance is painted
        assert_eq!(f.img[[10, 15, 0]], 255);
        // corner of the bounding box is not
        assert_eq!(f.img[[5, 5, 0]], 0);
    }

    #[test]
    fn line_covers_endpoints() {
        let mut f = blank(20, 20);
        f.draw_line(
            na::Point2::new(2.0, 2.0),
            na::Point2::new(15.0, 11.0),
            3,
            [1, 2, 3],
        );
        assert_eq!(f.img[[2, 2, 0]], 1);
        assert_eq!(f.img[[11, 15, 1]], 2);
    }
}
