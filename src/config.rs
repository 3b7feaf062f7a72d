use log::error;
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::geometry::Rect;
use crate::marker::Marker;
use crate::object::ObjectOfInterest;
use crate::pipeline::Pipeline;
use crate::region::Region;
use crate::shape::Shape;
use crate::slot::PinPreference;
use crate::tracker::BlindSpot;

fn default_true() -> bool {
    true
}

fn default_scale() -> f32 {
    1.0
}

fn default_max_x() -> f32 {
    639.0
}

fn default_max_y() -> f32 {
    379.0
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShapeTemplate {
    /// "rectangle", "circle" or "line", case-insensitive.
    pub shape: String,
    pub p1: (f32, f32),
    pub p2: (f32, f32),
    #[serde(default)]
    pub label: Option<String>,
}

impl ShapeTemplate {
    fn build(&self) -> Result<Shape, crate::error::Error> {
        Shape::from_template(
            &self.shape,
            na::Point2::new(self.p1.0, self.p1.1),
            na::Point2::new(self.p2.0, self.p2.1),
            self.label.clone(),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarkerTemplate {
    pub label: String,
    pub range_hue: (u8, u8),
    pub range_sat: (u8, u8),
    pub range_val: (u8, u8),
    pub range_area: (f32, f32),
    #[serde(default)]
    pub fixed_pos: bool,
    /// Constant search window for fixed-position markers.
    #[serde(default)]
    pub fixed_window: Option<((f32, f32), (f32, f32))>,
    #[serde(default)]
    pub linked_to: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ObjectTemplate {
    pub label: String,
    #[serde(default)]
    pub linked_markers: Vec<String>,
    #[serde(default = "default_true")]
    pub tracked: bool,
    #[serde(default)]
    pub traced: bool,
    #[serde(default)]
    pub pins: Vec<PinPreference>,
    #[serde(default = "default_max_x")]
    pub max_x: f32,
    #[serde(default = "default_max_y")]
    pub max_y: f32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegionTemplate {
    pub label: String,
    #[serde(default)]
    pub shapes: Vec<ShapeTemplate>,
    /// RGB; a default gray is used when omitted.
    #[serde(default)]
    pub color: Option<[u8; 3]>,
    #[serde(default)]
    pub pins: Vec<PinPreference>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BlindSpotTemplate {
    pub label: String,
    #[serde(default)]
    pub masks: Vec<ShapeTemplate>,
}

/// Declarative description of a full tracking setup, the on-disk twin of
/// a live pipeline.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TrackerTemplate {
    #[serde(default = "default_true")]
    pub adaptive_tracking: bool,
    #[serde(default = "default_scale")]
    pub scale: f32,
    #[serde(default)]
    pub markers: Vec<MarkerTemplate>,
    #[serde(default)]
    pub objects: Vec<ObjectTemplate>,
    #[serde(default)]
    pub regions: Vec<RegionTemplate>,
    #[serde(default)]
    pub blindspots: Vec<BlindSpotTemplate>,
}

impl Default for TrackerTemplate {
    fn default() -> Self {
        Self {
            adaptive_tracking: true,
            scale: 1.0,
            markers: Vec::new(),
            objects: Vec::new(),
            regions: Vec::new(),
            blindspots: Vec::new(),
        }
    }
}

impl TrackerTemplate {
    /// Populate a pipeline from this template. Malformed entities are
    /// logged and skipped, never fatal: a typo in one marker must not
    /// take the whole session down.
    pub fn apply(&self, pipeline: &mut Pipeline) {
        pipeline.tracker.adaptive_tracking = self.adaptive_tracking;
        pipeline.scale = self.scale;

        for t in &self.markers {
            let marker = Marker::new(
                &t.label,
                t.range_hue,
                t.range_sat,
                t.range_val,
                t.range_area,
                t.fixed_pos,
                t.linked_to.clone(),
            );
            match marker {
                Ok(mut marker) => {
                    if let Some((p1, p2)) = t.fixed_window {
                        marker.fixed_window = Some(Rect::from_coords(p1.0, p1.1, p2.0, p2.1));
                    }
                    if let Err(e) = pipeline.add_marker(marker) {
                        error!("skipping marker {}: {e}", t.label);
                    }
                }
                Err(e) => error!("skipping marker {}: {e}", t.label),
            }
        }

        for t in &self.objects {
            let object = ObjectOfInterest::new(
                &t.label,
                t.linked_markers.clone(),
                t.traced,
                t.tracked,
                t.pins.clone(),
                t.max_x,
                t.max_y,
            );
            if let Err(e) = pipeline.add_object(object) {
                error!("skipping object {}: {e}", t.label);
            }
        }

        for t in &self.regions {
            let shapes = build_shapes(&t.label, &t.shapes);
            let region = Region::new(&t.label, shapes, t.color, t.pins.clone());
            if let Err(e) = pipeline.add_region(region) {
                error!("skipping region {}: {e}", t.label);
            }
        }

        for t in &self.blindspots {
            let masks = build_shapes(&t.label, &t.masks);
            pipeline.add_blindspot(BlindSpot::new(&t.label, masks));
        }
    }
}

fn build_shapes(owner: &str, templates: &[ShapeTemplate]) -> Vec<Shape> {
    templates
        .iter()
        .filter_map(|t| match t.build() {
            Ok(shape) => Some(shape),
            Err(e) => {
                error!("skipping shape of {owner}: {e}");
                None
            }
        })
        .collect()
}
