use log::debug;
use ndarray::{s, Array2, Array3, ArrayView3};

use crate::error::Error;
use crate::frame::Frame;
use crate::marker::Marker;
use crate::shape::{Shape, ShapeKind};

const MASK_COLOR: [u8; 3] = [0, 0, 0];
const MASK_LINE_THICKNESS: u32 = 3;

/// Frame region blanked out before detection, e.g. a reflective surface
/// that would otherwise light up like a marker.
#[derive(Debug)]
pub struct BlindSpot {
    pub label: String,
    pub active: bool,
    pub masks: Vec<Shape>,
}

impl BlindSpot {
    pub fn new(label: impl Into<String>, masks: Vec<Shape>) -> Self {
        Self {
            label: label.into(),
            active: true,
            masks,
        }
    }
}

/// A connected component of the binary threshold mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Component {
    /// Pixel count in the (possibly downscaled) mask.
    pub area: f32,
    /// First-order moment centroid, ceiled to whole pixels.
    pub centroid: (f32, f32),
}

/// Finds colored markers per frame by HSV thresholding and keeps their
/// filtered position histories. Owns the markers and blind spots; fused
/// objects and regions live one level up, in the pipeline.
#[derive(Debug)]
pub struct Tracker {
    pub markers: Vec<Marker>,
    pub blindspots: Vec<BlindSpot>,
    /// Restrict per-marker detection to adaptive search windows.
    pub adaptive_tracking: bool,
    /// Working-frame dimensions after scaling, updated every frame.
    pub frame_width: usize,
    pub frame_height: usize,
    scale: f32,
}

impl Tracker {
    pub fn new(adaptive_tracking: bool) -> Self {
        Self {
            markers: Vec::new(),
            blindspots: Vec::new(),
            adaptive_tracking,
            frame_width: 640,
            frame_height: 380,
            scale: 1.0,
        }
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn marker(&self, label: &str) -> Option<&Marker> {
        self.markers.iter().find(|m| m.label == label)
    }

    pub fn marker_mut(&mut self, label: &str) -> Option<&mut Marker> {
        self.markers.iter_mut().find(|m| m.label == label)
    }

    pub fn add_marker(&mut self, marker: Marker) -> Result<(), Error> {
        if self.marker(&marker.label).is_some() {
            return Err(Error::DuplicateLabel(marker.label));
        }
        debug!("added marker {}", marker.label);
        self.markers.push(marker);
        Ok(())
    }

    /// Remove a marker. Unlinking from dependent objects is handled by
    /// the pipeline, which owns them.
    pub fn remove_marker(&mut self, label: &str) -> bool {
        let before = self.markers.len();
        self.markers.retain(|m| m.label != label);
        let removed = self.markers.len() != before;
        if removed {
            debug!("removed marker {label}");
        }
        removed
    }

    pub fn add_blindspot(&mut self, blindspot: BlindSpot) {
        debug!("added blindspot {}", blindspot.label);
        self.blindspots.push(blindspot);
    }

    pub fn remove_blindspot(&mut self, label: &str) -> bool {
        let before = self.blindspots.len();
        self.blindspots.retain(|b| b.label != label);
        before != self.blindspots.len()
    }

    /// Paint every active blind-spot mask black, in place. Must run
    /// before detection.
    pub fn mask_blindspots(&self, frame: &mut Frame) {
        for bs in self.blindspots.iter().filter(|b| b.active) {
            for mask in bs.masks.iter().filter(|m| m.active) {
                match &mask.kind {
                    ShapeKind::Rectangle { p1, p2 } => frame.fill_rect(*p1, *p2, MASK_COLOR),
                    ShapeKind::Circle { center, radius } => {
                        frame.fill_circle(*center, *radius, MASK_COLOR)
                    }
                    ShapeKind::Line { p1, p2 } => {
                        frame.draw_line(*p1, *p2, MASK_LINE_THICKNESS, MASK_COLOR)
                    }
                }
            }
        }
    }

    /// Run one detection pass over all markers.
    ///
    /// `scale < 1.0` downsamples the frame first (nearest neighbour, to
    /// keep blob edges hard); compute cost drops with scale^2 at the
    /// price of centroid resolution. Disabled markers still get exactly
    /// one (absent) history entry so all histories stay frame-aligned.
    pub fn track_markers(&mut self, frame: &Frame, scale: f32, elapsed: f32) {
        self.scale = scale.min(1.0);

        let hsv = if self.scale < 1.0 {
            bgr_to_hsv(&resize_nearest(&frame.img, self.scale).view())
        } else {
            bgr_to_hsv(&frame.img.view())
        };

        self.frame_height = hsv.shape()[0];
        self.frame_width = hsv.shape()[1];

        let adaptive = self.adaptive_tracking;
        let s = self.scale;
        for marker in &mut self.markers {
            if marker.detection_active {
                detect_marker(&hsv, marker, s, adaptive, elapsed);
            } else {
                marker.pos_hist.push(None);
            }
        }
    }
}

/// Threshold one marker in the HSV working frame and commit the outcome
/// to its filter and history.
fn detect_marker(hsv: &Array3<u8>, marker: &mut Marker, scale: f32, adaptive: bool, elapsed: f32) {
    let (h, w) = (hsv.shape()[0], hsv.shape()[1]);
    let area_range = (
        marker.range_area.0 * scale * scale,
        marker.range_area.1 * scale * scale,
    );

    // search window, clipped to the scaled frame
    let window = if adaptive { marker.search_window } else { None };
    let (ax, ay, view) = match window {
        Some(win) => {
            let scaled = crate::geometry::Rect::from_coords(
                win.p1.x * scale,
                win.p1.y * scale,
                win.p2.x * scale,
                win.p2.y * scale,
            );
            let (ax, ay, bx, by) = scaled.clamp_to(w, h);
            if bx <= ax || by <= ay {
                // window degenerated to nothing; normal per-frame miss
                marker.filter_position(elapsed, None);
                return;
            }
            (ax, ay, hsv.slice(s![ay..by, ax..bx, ..]))
        }
        None => (0, 0, hsv.view()),
    };

    let mut mask = threshold_hsv(
        &view,
        marker.range_hue,
        marker.range_sat,
        marker.range_val,
    );
    mask = dilate3(&mask);

    match find_largest_component(&mask, area_range) {
        Some(component) => {
            let (mut cx, mut cy) = component.centroid;
            cx += ax as f32;
            cy += ay as f32;
            // back to unscaled frame coordinates
            marker.filter_position(elapsed, Some((cx / scale, cy / scale)));
        }
        None => marker.filter_position(elapsed, None),
    }
}

/// Inclusive HSV threshold. A wrapping hue range (`lo > hi`, the red
/// seam) is the union of `[lo, 179]` and `[0, hi]`.
pub fn threshold_hsv(
    view: &ArrayView3<u8>,
    range_hue: (u8, u8),
    range_sat: (u8, u8),
    range_val: (u8, u8),
) -> Array2<u8> {
    let (h, w) = (view.shape()[0], view.shape()[1]);
    let mut mask = Array2::zeros((h, w));
    let wraps = range_hue.0 > range_hue.1;

    for y in 0..h {
        for x in 0..w {
            let hue = view[[y, x, 0]];
            let sat = view[[y, x, 1]];
            let val = view[[y, x, 2]];

            let hue_ok = if wraps {
                hue >= range_hue.0 || hue <= range_hue.1
            } else {
                hue >= range_hue.0 && hue <= range_hue.1
            };

            if hue_ok
                && sat >= range_sat.0
                && sat <= range_sat.1
                && val >= range_val.0
                && val <= range_val.1
            {
                mask[[y, x]] = 255;
            }
        }
    }

    mask
}

/// 3x3 binary dilation, countering salt-noise fragmentation of blobs.
pub fn dilate3(mask: &Array2<u8>) -> Array2<u8> {
    let (h, w) = (mask.shape()[0], mask.shape()[1]);
    let mut out = Array2::zeros((h, w));

    for y in 0..h {
        for x in 0..w {
            if mask[[y, x]] == 0 {
                continue;
            }
            let y0 = y.saturating_sub(1);
            let x0 = x.saturating_sub(1);
            for yy in y0..=(y + 1).min(h - 1) {
                for xx in x0..=(x + 1).min(w - 1) {
                    out[[yy, xx]] = 255;
                }
            }
        }
    }

    out
}

/// Largest 8-connected component whose area is `>= min` and, when a max
/// is configured (`max > 0`), `< max`. Ties go to the component
/// encountered first in row-major order. `None` when nothing qualifies.
pub fn find_largest_component(mask: &Array2<u8>, range_area: (f32, f32)) -> Option<Component> {
    let (h, w) = (mask.shape()[0], mask.shape()[1]);
    let (min_area, max_area) = range_area;

    let mut visited = Array2::<u8>::zeros((h, w));
    let mut stack: Vec<(usize, usize)> = Vec::new();
    let mut best: Option<Component> = None;
    let mut largest = 0.0f32;

    for sy in 0..h {
        for sx in 0..w {
            if mask[[sy, sx]] == 0 || visited[[sy, sx]] != 0 {
                continue;
            }

            // flood fill one component
            let mut count = 0u32;
            let mut sum_x = 0u64;
            let mut sum_y = 0u64;
            visited[[sy, sx]] = 1;
            stack.push((sy, sx));

            while let Some((y, x)) = stack.pop() {
                count += 1;
                sum_x += x as u64;
                sum_y += y as u64;

                let y0 = y.saturating_sub(1);
                let x0 = x.saturating_sub(1);
                for yy in y0..=(y + 1).min(h - 1) {
                    for xx in x0..=(x + 1).min(w - 1) {
                        if mask[[yy, xx]] != 0 && visited[[yy, xx]] == 0 {
                            visited[[yy, xx]] = 1;
                            stack.push((yy, xx));
                        }
                    }
                }
            }

            let area = count as f32;
            if area > largest && area >= min_area && (max_area == 0.0 || area < max_area) {
                largest = area;
                let cx = (sum_x as f32 / area).ceil();
                let cy = (sum_y as f32 / area).ceil();
                best = Some(Component {
                    area,
                    centroid: (cx, cy),
                });
            }
        }
    }

    best
}

/// BGR to HSV, OpenCV 8-bit convention: hue halved into `[0, 179]`,
/// saturation and value in `[0, 255]`.
pub fn bgr_to_hsv(img: &ArrayView3<u8>) -> Array3<u8> {
    let (h, w) = (img.shape()[0], img.shape()[1]);
    let mut out = Array3::zeros((h, w, 3));

    for y in 0..h {
        for x in 0..w {
            let (hh, ss, vv) =
                bgr_pixel_to_hsv(img[[y, x, 0]], img[[y, x, 1]], img[[y, x, 2]]);
            out[[y, x, 0]] = hh;
            out[[y, x, 1]] = ss;
            out[[y, x, 2]] = vv;
        }
    }

    out
}

fn bgr_pixel_to_hsv(b: u8, g: u8, r: u8) -> (u8, u8, u8) {
    let (bf, gf, rf) = (b as f32, g as f32, r as f32);
    let v = bf.max(gf).max(rf);
    let min = bf.min(gf).min(rf);
    let delta = v - min;

    let s = if v > 0.0 {
        (255.0 * delta / v).round() as u8
    } else {
        0
    };

    if delta == 0.0 {
        return (0, s, v as u8);
    }

    let mut hue = if v == rf {
        60.0 * (gf - bf) / delta
    } else if v == gf {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    (((hue / 2.0).round() as u16 % 180) as u8, s, v as u8)
}

/// Nearest-neighbour downsampling; preserves hard blob edges, unlike
/// interpolating kernels which smear threshold boundaries.
pub fn resize_nearest(img: &Array3<u8>, scale: f32) -> Array3<u8> {
    let (h, w) = (img.shape()[0], img.shape()[1]);
    let nh = ((h as f32 * scale).round() as usize).max(1);
    let nw = ((w as f32 * scale).round() as usize).max(1);
    let mut out = Array3::zeros((nh, nw, 3));

    for y in 0..nh {
        let sy = ((y as f32 / scale) as usize).min(h - 1);
        for x in 0..nw {
            let sx = ((x as f32 / scale) as usize).min(w - 1);
            for c in 0..3 {
                out[[y, x, c]] = img[[sy, sx, c]];
            }
        }
    }

    out
}
