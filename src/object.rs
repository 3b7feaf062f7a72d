use nalgebra as na;

use crate::geometry::{self, Rect};
use crate::history::History;
use crate::marker::Marker;
use crate::slot::{Chatter, PinPreference, Slot, SlotKind, SlotReading, SlotSource, SlotValue};

const HISTORY_CAP: usize = 1024;

/// How far back fusion looks for the last known position when sizing
/// search windows, in frames.
const SEARCH_LOOKBACK: usize = 10;
/// Search-window half-width grows by this many pixels per frame of age.
const SEARCH_STEP: f32 = 25.0;

/// Fallback window when no recent position exists at all; clipped to the
/// frame during detection.
fn full_frame() -> Rect {
    Rect::from_coords(0.0, 0.0, 2000.0, 2000.0)
}

/// A tracked entity fused from one or more markers: position is the mean
/// of the linked markers' filtered positions, direction the heading
/// between the first marker pair, speed the per-frame displacement rate.
#[derive(Debug)]
pub struct ObjectOfInterest {
    pub label: String,
    /// Marker labels, in order. The order defines the pairing for the
    /// direction computation.
    pub linked_markers: Vec<String>,
    pub tracked: bool,
    pub traced: bool,
    /// Dead-reckon a position for frames where fusion came up empty.
    pub guessing_enabled: bool,
    /// Frame bounds used to discard out-of-range guessed positions.
    pub max_x: f32,
    pub max_y: f32,

    pub pos_hist: History<Option<na::Point2<f32>>>,
    pub dir_hist: History<Option<f32>>,
    pub speed_hist: History<Option<f32>>,

    direction: Option<f32>,
    speed: Option<f32>,

    pub slots: Vec<Slot>,
    pub pin_prefs: Vec<PinPreference>,
}

impl ObjectOfInterest {
    pub fn new(
        label: impl Into<String>,
        linked_markers: Vec<String>,
        traced: bool,
        tracked: bool,
        pin_prefs: Vec<PinPreference>,
        max_x: f32,
        max_y: f32,
    ) -> Self {
        // listed order matters: first come, first served at pin binding
        let slots = vec![
            Slot::new(SlotKind::Analog, SlotSource::PositionX),
            Slot::new(SlotKind::Analog, SlotSource::PositionY),
            Slot::new(SlotKind::Analog, SlotSource::Direction),
            Slot::new(SlotKind::Analog, SlotSource::Speed),
        ];

        Self {
            label: label.into(),
            linked_markers,
            tracked,
            traced,
            guessing_enabled: false,
            max_x,
            max_y,
            pos_hist: History::with_capacity(HISTORY_CAP),
            dir_hist: History::with_capacity(HISTORY_CAP),
            speed_hist: History::with_capacity(HISTORY_CAP),
            direction: None,
            speed: None,
            slots,
            pin_prefs,
        }
    }

    /// Latest fused positions of the linked markers, in link order.
    /// Markers without any history yet are skipped entirely.
    fn linked_positions(&self, markers: &[Marker]) -> Vec<Option<na::Point2<f32>>> {
        self.linked_markers
            .iter()
            .filter_map(|label| markers.iter().find(|m| &m.label == label))
            .filter(|m| !m.pos_hist.is_empty())
            .map(|m| m.position())
            .collect()
    }

    /// Fuse the linked marker positions into one entry per frame.
    ///
    /// Untracked objects are a no-op: their history does not grow, so it
    /// stops being frame-aligned. Callers must check `tracked` before
    /// indexing by frame number.
    pub fn update_position(&mut self, markers: &[Marker]) {
        if !self.tracked {
            return;
        }
        let fused = geometry::middle_point(&self.linked_positions(markers));
        self.pos_hist.push(fused);
    }

    /// Most recent fused position.
    #[inline]
    pub fn position(&self) -> Option<na::Point2<f32>> {
        self.pos_hist.latest().copied().flatten()
    }

    /// Position as consumers should see it: dead-reckoned when guessing
    /// is enabled, plain fused otherwise.
    pub fn effective_position(&self) -> Option<na::Point2<f32>> {
        if self.guessing_enabled {
            self.position_guessed()
        } else {
            self.position()
        }
    }

    /// Position with one-step dead reckoning applied when the latest
    /// fusion came up empty. Out-of-frame guesses are discarded.
    pub fn position_guessed(&self) -> Option<na::Point2<f32>> {
        let guessed = geometry::guess_position(
            self.pos_hist.back(0).copied().flatten(),
            self.pos_hist.back(1).copied().flatten(),
            self.pos_hist.back(2).copied().flatten(),
        )?;
        if guessed.x < 0.0 || guessed.x > self.max_x || guessed.y < 0.0 || guessed.y > self.max_y {
            return None;
        }
        Some(guessed)
    }

    /// Re-derive every linked marker's search window from the fusion
    /// history: the older the last known position, the wider the window.
    /// Fixed-position markers always get their configured constant
    /// window instead.
    pub fn update_search_windows(&self, markers: &mut [Marker]) {
        let mut window = full_frame();
        for age in 0..self.pos_hist.len().min(SEARCH_LOOKBACK) {
            if let Some(Some(pos)) = self.pos_hist.back(age) {
                window = Rect::around(*pos, (age as f32 + 1.0) * SEARCH_STEP);
                break;
            }
        }

        for label in &self.linked_markers {
            if let Some(marker) = markers.iter_mut().find(|m| &m.label == label) {
                if marker.fixed_pos {
                    if let Some(fixed) = marker.fixed_window {
                        marker.search_window = Some(fixed);
                    }
                } else {
                    marker.search_window = Some(window);
                }
            }
        }
    }

    /// Heading from the first two linked markers with a current
    /// position. Markers beyond the first two are ignored. With fewer
    /// than two current detections the last known direction is kept.
    pub fn update_direction(&mut self, markers: &[Marker]) {
        if !self.tracked || self.linked_markers.len() < 2 {
            return;
        }

        let mut current = self
            .linked_positions(markers)
            .into_iter()
            .flatten();

        match (current.next(), current.next()) {
            (Some(p1), Some(p2)) => {
                let theta = geometry::norm_angle_deg(p1, p2);
                self.dir_hist.push(Some(theta));
                self.direction = Some(theta);
            }
            _ => {
                self.direction = self.dir_hist.latest().copied().flatten();
            }
        }
    }

    #[inline]
    pub fn direction(&self) -> Option<f32> {
        self.direction
    }

    /// Speed in px/s from the last two fused positions. When either is
    /// missing, falls back to the oldest recorded speed, if any.
    pub fn update_speed(&mut self, elapsed: f32) {
        let last = self.pos_hist.back(0).copied().flatten();
        let prev = self.pos_hist.back(1).copied().flatten();

        match (last, prev) {
            (Some(a), Some(b)) if elapsed > 0.0 => {
                self.speed_hist.push(self.speed);
                self.speed = Some(geometry::distance(a, b) / elapsed);
            }
            _ => {
                self.speed = self.speed_hist.asc_iter().copied().flatten().next();
            }
        }
    }

    #[inline]
    pub fn speed(&self) -> Option<f32> {
        self.speed
    }

    /// Apply pin preferences and bind greedy slots to matching pins.
    pub fn update_slots(&mut self, chatter: &dyn Chatter) {
        for slot in &mut self.slots {
            for pref in &self.pin_prefs {
                if pref.slot == slot.label() && slot.pin_pref.as_deref() != Some(&pref.pin) {
                    slot.pin_pref = Some(pref.pin.clone());
                }
            }
            slot.bind_preferred(chatter);
        }
    }

    fn slot_value(&self, source: &SlotSource) -> SlotValue {
        let v = match source {
            SlotSource::PositionX => self.position().map(|p| p.x),
            SlotSource::PositionY => self.position().map(|p| p.y),
            SlotSource::Direction => self.direction,
            SlotSource::Speed => self.speed,
            SlotSource::Collision(_) => None,
        };
        SlotValue::Analog(v)
    }

    /// Readings for every pin-bound slot, for the per-cycle output push.
    pub fn readings(&self) -> Vec<SlotReading> {
        self.slots
            .iter()
            .filter_map(|slot| {
                slot.pin.as_ref().map(|pin| SlotReading {
                    pin: pin.clone(),
                    label: format!("{}/{}", self.label, slot.label()),
                    value: self.slot_value(&slot.source),
                })
            })
            .collect()
    }

    pub fn unlink_marker(&mut self, label: &str) {
        self.linked_markers.retain(|l| l != label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    fn marker_at(label: &str, pos: Option<(f32, f32)>) -> Marker {
        let mut m = Marker::new(
            label,
            (0, 10),
            (0, 255),
            (0, 255),
            (1.0, 0.0),
            false,
            vec![],
        )
        .unwrap();
        m.pos_hist.push(pos.map(|(x, y)| Point2::new(x, y)));
        m
    }

    fn object(linked: &[&str]) -> ObjectOfInterest {
        ObjectOfInterest::new(
            "subject",
            linked.iter().map(|s| s.to_string()).collect(),
            false,
            true,
            vec![],
            639.0,
            379.0,
        )
    }

    #[test]
    fn fused_position_is_marker_mean() {
        let markers = vec![
            marker_at("a", Some((100.0, 100.0))),
            marker_at("b", Some((140.0, 100.0))),
        ];
        let mut obj = object(&["a", "b"]);
        obj.update_position(&markers);
        assert_eq!(obj.position(), Some(Point2::new(120.0, 100.0)));
    }

    #[test]
    fn lost_marker_falls_back_to_the_rest() {
        let markers = vec![
            marker_at("a", None),
            marker_at("b", Some((140.0, 100.0))),
        ];
        let mut obj = object(&["a", "b"]);
        obj.update_position(&markers);
        assert_eq!(obj.position(), Some(Point2::new(140.0, 100.0)));

        let markers = vec![marker_at("a", None), marker_at("b", None)];
        obj.update_position(&markers);
        assert_eq!(obj.position(), None);
        assert_eq!(obj.pos_hist.len(), 2);
    }

    #[test]
    fn untracked_history_does_not_grow() {
        let markers = vec![marker_at("a", Some((10.0, 10.0)))];
        let mut obj = object(&["a"]);
        obj.tracked = false;
        obj.update_position(&markers);
        assert!(obj.pos_hist.is_empty());
    }

    #[test]
    fn direction_uses_first_two_valid_markers() {
        // three linked markers; the third must not influence the heading
        let markers = vec![
            marker_at("a", Some((100.0, 100.0))),
            marker_at("b", Some((140.0, 100.0))),
            marker_at("c", Some((120.0, 300.0))),
        ];
        let mut obj = object(&["a", "b", "c"]);
        obj.update_direction(&markers);
        assert_relative_eq!(obj.direction().unwrap(), 90.0);

        // first marker lost: the pair shifts to (b, c)
        let markers = vec![
            marker_at("a", None),
            marker_at("b", Some((140.0, 100.0))),
            marker_at("c", Some((140.0, 300.0))),
        ];
        obj.update_direction(&markers);
        assert_relative_eq!(obj.direction().unwrap(), 180.0);
    }

    #[test]
    fn direction_falls_back_to_last_known() {
        let markers = vec![
            marker_at("a", Some((100.0, 100.0))),
            marker_at("b", Some((140.0, 100.0))),
        ];
        let mut obj = object(&["a", "b"]);
        obj.update_direction(&markers);

        let lost = vec![marker_at("a", None), marker_at("b", None)];
        obj.update_direction(&lost);
        assert_relative_eq!(obj.direction().unwrap(), 90.0);
    }

    #[test]
    fn single_marker_object_has_no_direction() {
        let markers = vec![marker_at("a", Some((10.0, 10.0)))];
        let mut obj = object(&["a"]);
        obj.update_direction(&markers);
        assert_eq!(obj.direction(), None);
    }

    #[test]
    fn speed_from_displacement_over_elapsed() {
        let mut obj = object(&["a"]);
        obj.pos_hist.push(Some(Point2::new(100.0, 100.0)));
        obj.pos_hist.push(Some(Point2::new(130.0, 140.0)));
        obj.update_speed(0.5);
        assert_relative_eq!(obj.speed().unwrap(), 100.0); // 50 px / 0.5 s
    }

    #[test]
    fn speed_falls_back_to_oldest_recorded() {
        let mut obj = object(&["a"]);
        obj.pos_hist.push(Some(Point2::new(0.0, 0.0)));
        obj.pos_hist.push(Some(Point2::new(10.0, 0.0)));
        obj.update_speed(0.5); // 20 px/s, pushes None placeholder first
        obj.pos_hist.push(Some(Point2::new(30.0, 0.0)));
        obj.update_speed(0.5); // 40 px/s, pushes the 20 into history

        obj.pos_hist.push(None);
        obj.update_speed(0.5);
        // oldest recorded entry is the None placeholder's successor: 20
        assert_relative_eq!(obj.speed().unwrap(), 20.0);
    }

    #[test]
    fn search_window_widens_with_position_age() {
        let mut markers = vec![marker_at("a", Some((0.0, 0.0)))];
        let mut obj = object(&["a"]);

        obj.pos_hist.push(Some(Point2::new(200.0, 200.0)));
        obj.update_search_windows(&mut markers);
        let w = markers[0].search_window.unwrap();
        assert_eq!(w, Rect::from_coords(175.0, 175.0, 225.0, 225.0));

        // two absent frames later the same anchor gives a wider window
        obj.pos_hist.push(None);
        obj.pos_hist.push(None);
        obj.update_search_windows(&mut markers);
        let w = markers[0].search_window.unwrap();
        assert_eq!(w, Rect::from_coords(125.0, 125.0, 275.0, 275.0));
    }

    #[test]
    fn no_recent_position_means_full_frame() {
        let mut markers = vec![marker_at("a", None)];
        let obj = object(&["a"]);
        obj.update_search_windows(&mut markers);
        assert_eq!(
            markers[0].search_window.unwrap(),
            Rect::from_coords(0.0, 0.0, 2000.0, 2000.0)
        );
    }

    #[test]
    fn fixed_marker_keeps_its_window() {
        let mut m = marker_at("sync", Some((0.0, 0.0)));
        m.fixed_pos = true;
        m.fixed_window = Some(Rect::from_coords(0.0, 259.0, 100.0, 359.0));
        let mut markers = vec![m];

        let mut obj = object(&["sync"]);
        obj.pos_hist.push(Some(Point2::new(300.0, 300.0)));
        obj.update_search_windows(&mut markers);

        assert_eq!(
            markers[0].search_window.unwrap(),
            Rect::from_coords(0.0, 259.0, 100.0, 359.0)
        );
    }

    #[test]
    fn guessing_mode_bridges_a_lost_frame() {
        let mut obj = object(&["a"]);
        obj.pos_hist.push(Some(Point2::new(100.0, 100.0)));
        obj.pos_hist.push(Some(Point2::new(110.0, 100.0)));
        obj.pos_hist.push(None);

        assert_eq!(obj.effective_position(), None);
        obj.guessing_enabled = true;
        assert_eq!(obj.effective_position(), Some(Point2::new(120.0, 100.0)));
    }

    #[test]
    fn guessed_position_discards_out_of_frame() {
        let mut obj = object(&["a"]);
        obj.pos_hist.push(Some(Point2::new(600.0, 100.0)));
        obj.pos_hist.push(Some(Point2::new(630.0, 100.0)));
        obj.pos_hist.push(None);
        // extrapolates to (660, 100), beyond max_x
        assert_eq!(obj.position_guessed(), None);
    }
}
