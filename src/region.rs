use std::collections::HashMap;

use log::debug;
use nalgebra as na;

use crate::object::ObjectOfInterest;
use crate::shape::Shape;
use crate::slot::{Chatter, PinPreference, Slot, SlotKind, SlotReading, SlotSource, SlotValue};

const PASSIVE_ALPHA: f32 = 0.4;
const ACTIVE_ALPHA: f32 = 0.8;
const PASSIVE_SCALE: f32 = 150.0 / 255.0;

/// Normalized display color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    fn from_rgb8(rgb: [u8; 3], a: f32) -> Self {
        Self {
            r: rgb[0] as f32 / 255.0,
            g: rgb[1] as f32 / 255.0,
            b: rgb[2] as f32 / 255.0,
            a,
        }
    }

    fn scaled(&self, k: f32, a: f32) -> Self {
        Self {
            r: self.r * k,
            g: self.g * k,
            b: self.b * k,
            a,
        }
    }
}

const DEFAULT_COLOR: [u8; 3] = [128, 128, 128];

/// Spatial zone tested against object positions each cycle. A region is
/// "hit" when any of its active shapes contains any tracked object; the
/// display color flips between a passive and an active variant purely as
/// a function of the current highlight flag (no debounce, so it flickers
/// when the collision state alternates every frame).
#[derive(Debug)]
pub struct Region {
    pub label: String,
    pub shapes: Vec<Shape>,
    pub highlighted: bool,

    pub normal_color: Rgba,
    pub passive_color: Rgba,
    pub active_color: Rgba,
    /// Currently displayed color, tracks the highlight state.
    pub color: Rgba,

    /// One digital collision slot per live object.
    pub slots: Vec<Slot>,
    /// Preferences keyed by object label.
    pub pin_prefs: Vec<PinPreference>,

    /// Last cycle's per-object collision outcome; `None` = untestable.
    collisions: HashMap<String, Option<bool>>,
}

impl Region {
    pub fn new(
        label: impl Into<String>,
        shapes: Vec<Shape>,
        color: Option<[u8; 3]>,
        pin_prefs: Vec<PinPreference>,
    ) -> Self {
        let normal = Rgba::from_rgb8(color.unwrap_or(DEFAULT_COLOR), PASSIVE_ALPHA);
        let passive = normal.scaled(PASSIVE_SCALE, PASSIVE_ALPHA);
        let active = normal.scaled(1.0, ACTIVE_ALPHA);

        Self {
            label: label.into(),
            shapes,
            highlighted: false,
            normal_color: normal,
            passive_color: passive,
            active_color: active,
            color: passive,
            slots: Vec::new(),
            pin_prefs,
            collisions: HashMap::new(),
        }
    }

    /// Start-of-cycle reset: clear the highlight and re-apply configured
    /// pin preferences to the per-object slots.
    pub fn update_state(&mut self) {
        self.highlighted = false;
        for slot in &mut self.slots {
            for pref in &self.pin_prefs {
                if pref.slot == slot.label() {
                    slot.pin_pref = Some(pref.pin.clone());
                }
            }
        }
    }

    /// Point-in-region test: OR over all active shapes. An absent point
    /// yields `None` (unknown, not "no collision") and leaves the
    /// highlight untouched.
    pub fn collision_test(&mut self, point: Option<na::Point2<f32>>) -> Option<bool> {
        let point = point?;
        let hit = self.shapes.iter().any(|s| s.collides(point));
        if hit {
            self.highlighted = true;
        }
        self.toggle_highlight();
        Some(hit)
    }

    fn toggle_highlight(&mut self) {
        self.color = if self.highlighted {
            self.active_color
        } else {
            self.passive_color
        };
    }

    /// Test every tracked object and record the per-object outcomes for
    /// the slot push.
    pub fn evaluate(&mut self, objects: &[ObjectOfInterest]) {
        for obj in objects.iter().filter(|o| o.tracked) {
            let result = self.collision_test(obj.effective_position());
            self.collisions.insert(obj.label.clone(), result);
        }
    }

    /// Synchronize the slot set with the live object collection: one
    /// collision slot per object, stale slots dropped. Must run whenever
    /// objects are added or removed.
    pub fn refresh_slots(&mut self, objects: &[ObjectOfInterest]) {
        for obj in objects {
            let exists = self
                .slots
                .iter()
                .any(|s| matches!(&s.source, SlotSource::Collision(l) if l == &obj.label));
            if !exists {
                debug!("region {}: linked object {}", self.label, obj.label);
                self.slots.push(Slot::new(
                    SlotKind::Digital,
                    SlotSource::Collision(obj.label.clone()),
                ));
            }
        }

        let live: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
        self.slots.retain(|s| match &s.source {
            SlotSource::Collision(l) => live.contains(&l.as_str()),
            _ => true,
        });
        self.collisions.retain(|l, _| live.contains(&l.as_str()));
    }

    pub fn update_slots(&mut self, chatter: &dyn Chatter) {
        for slot in &mut self.slots {
            slot.bind_preferred(chatter);
        }
    }

    /// Readings for every pin-bound collision slot.
    pub fn readings(&self) -> Vec<SlotReading> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let pin = slot.pin.clone()?;
                let state = match &slot.source {
                    SlotSource::Collision(obj) => self.collisions.get(obj).copied().flatten(),
                    _ => None,
                };
                Some(SlotReading {
                    pin,
                    label: format!("{}/{}", self.label, slot.label()),
                    value: SlotValue::Digital(state),
                })
            })
            .collect()
    }

    /// Last recorded collision outcome for an object.
    pub fn collides_with(&self, object_label: &str) -> Option<bool> {
        self.collisions.get(object_label).copied().flatten()
    }

    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    pub fn move_by(&mut self, dx: f32, dy: f32) {
        for shape in &mut self.shapes {
            shape.move_by(dx, dy);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ShapeKind;
    use nalgebra::Point2;

    fn region() -> Region {
        Region::new(
            "goal",
            vec![Shape::new(
                ShapeKind::Rectangle {
                    p1: Point2::new(0.0, 0.0),
                    p2: Point2::new(50.0, 50.0),
                },
                None,
            )],
            Some([255, 0, 0]),
            vec![],
        )
    }

    fn object_at(label: &str, pos: Option<(f32, f32)>) -> ObjectOfInterest {
        let mut obj = ObjectOfInterest::new(label, vec![], false, true, vec![], 639.0, 379.0);
        obj.pos_hist.push(pos.map(|(x, y)| Point2::new(x, y)));
        obj
    }

    #[test]
    fn hit_then_miss_drives_highlight_and_color() {
        let mut r = region();
        let inside = [object_at("subject", Some((25.0, 25.0)))];
        let outside = [object_at("subject", Some((60.0, 60.0)))];

        r.update_state();
        r.evaluate(&inside);
        assert!(r.highlighted);
        assert_eq!(r.color, r.active_color);
        assert_eq!(r.collides_with("subject"), Some(true));

        r.update_state();
        r.evaluate(&outside);
        assert!(!r.highlighted);
        assert_eq!(r.color, r.passive_color);
        assert_eq!(r.collides_with("subject"), Some(false));
    }

    #[test]
    fn absent_position_is_unknown_not_false() {
        let mut r = region();
        let lost = [object_at("subject", None)];
        r.update_state();
        r.evaluate(&lost);
        assert_eq!(r.collides_with("subject"), None);
        assert!(!r.highlighted);
    }

    #[test]
    fn any_active_shape_counts() {
        let mut r = region();
        r.add_shape(Shape::new(
            ShapeKind::Circle {
                center: Point2::new(100.0, 100.0),
                radius: 10.0,
            },
            None,
        ));
        assert_eq!(r.collision_test(Some(Point2::new(100.0, 105.0))), Some(true));

        r.shapes[1].active = false;
        r.update_state();
        assert_eq!(r.collision_test(Some(Point2::new(100.0, 105.0))), Some(false));
    }

    #[test]
    fn refresh_slots_tracks_object_collection() {
        let mut r = region();
        let objects = vec![object_at("a", None), object_at("b", None)];
        r.refresh_slots(&objects);
        assert_eq!(r.slots.len(), 2);

        // idempotent
        r.refresh_slots(&objects);
        assert_eq!(r.slots.len(), 2);

        let objects = vec![object_at("b", None)];
        r.refresh_slots(&objects);
        assert_eq!(r.slots.len(), 1);
        assert_eq!(r.slots[0].label(), "b");
    }
}
