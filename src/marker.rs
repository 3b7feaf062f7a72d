use nalgebra as na;

use crate::error::Error;
use crate::geometry::Rect;
use crate::history::History;
use crate::kalman::PositionFilter;

/// Hue values live in the OpenCV 8-bit domain `[0, 179]`.
pub const HUE_MAX: u8 = 179;

const POS_HISTORY_CAP: usize = 1024;

/// A single tracked colored marker (LED), defined by acceptance ranges
/// in HSV space and an admissible blob area.
///
/// The hue range may wrap across the circular domain (`lo > hi` means
/// `[lo, 179] U [0, hi]`, the red seam). Saturation and value ranges are
/// plain closed intervals. `range_area` is in squared pixels before any
/// frame downscaling; a max of 0 disables the upper bound.
#[derive(Debug)]
pub struct Marker {
    pub label: String,
    pub range_hue: (u8, u8),
    pub range_sat: (u8, u8),
    pub range_val: (u8, u8),
    pub range_area: (f32, f32),

    pub detection_active: bool,
    pub marker_visible: bool,

    /// Search window pinned to a constant location instead of following
    /// the fused object position (e.g. a sync LED).
    pub fixed_pos: bool,
    pub fixed_window: Option<Rect>,

    /// Labels of other markers this one is interpreted together with.
    pub linked_to: Vec<String>,

    /// Current adaptive search window; `None` until the first fusion
    /// pass, meaning the full frame is searched.
    pub search_window: Option<Rect>,

    pub filter: PositionFilter,

    /// Filtered position per processed frame, `None` for frames where
    /// no position could be produced. Grows by exactly one entry per
    /// frame as long as the marker exists.
    pub pos_hist: History<Option<na::Point2<f32>>>,
}

impl Marker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        label: impl Into<String>,
        range_hue: (u8, u8),
        range_sat: (u8, u8),
        range_val: (u8, u8),
        range_area: (f32, f32),
        fixed_pos: bool,
        linked_to: Vec<String>,
    ) -> Result<Self, Error> {
        let label = label.into();

        if range_hue.0 > HUE_MAX || range_hue.1 > HUE_MAX {
            return Err(Error::InvalidRange {
                label,
                channel: "hue",
            });
        }
        if range_sat.0 > range_sat.1 {
            return Err(Error::InvalidRange {
                label,
                channel: "saturation",
            });
        }
        if range_val.0 > range_val.1 {
            return Err(Error::InvalidRange {
                label,
                channel: "value",
            });
        }
        if range_area.0 < 0.0 || range_area.1 < 0.0 {
            return Err(Error::InvalidRange {
                label,
                channel: "area",
            });
        }

        Ok(Self {
            label,
            range_hue,
            range_sat,
            range_val,
            range_area,
            detection_active: true,
            marker_visible: true,
            fixed_pos,
            fixed_window: None,
            linked_to,
            search_window: None,
            filter: PositionFilter::new(),
            pos_hist: History::with_capacity(POS_HISTORY_CAP),
        })
    }

    /// Latest filtered position, if the marker is currently located.
    #[inline]
    pub fn position(&self) -> Option<na::Point2<f32>> {
        self.pos_hist.latest().copied().flatten()
    }

    /// Commit one frame's detection outcome.
    ///
    /// A measurement goes through the Kalman filter and the filtered
    /// position is appended. A miss with a prior filtered state coasts on
    /// the filter prediction, still appending one (predicted) entry. A
    /// miss with no usable prior appends an absent entry. Either way the
    /// history grows by exactly one.
    pub fn filter_position(&mut self, elapsed: f32, measured: Option<(f32, f32)>) {
        match measured {
            Some((x, y)) => {
                self.filter.update_measurement(x, y, elapsed);
                let pos = self.filter.update_filter();
                self.pos_hist
                    .push(pos.map(|(x, y)| na::Point2::new(x, y)));
            }
            None => {
                if matches!(self.pos_hist.latest(), Some(Some(_))) {
                    self.filter.update_missing();
                    let pos = self.filter.update_filter();
                    self.pos_hist
                        .push(pos.map(|(x, y)| na::Point2::new(x, y)));
                } else {
                    self.pos_hist.push(None);
                }
            }
        }
    }

    /// Hue range wraps across the red seam.
    #[inline]
    pub fn hue_wraps(&self) -> bool {
        self.range_hue.0 > self.range_hue.1
    }
}
