use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, info};
use serde_derive::Serialize;

use crate::error::Error;
use crate::frame::Frame;
use crate::marker::Marker;
use crate::object::ObjectOfInterest;
use crate::region::Region;
use crate::slot::{Chatter, SlotReading};
use crate::tracker::{BlindSpot, Tracker};

/// Produces frames to process. Implementations wrap a camera, a video
/// file, or a synthetic generator in tests.
pub trait FrameSource {
    /// Next frame, or `None` when the source is exhausted.
    fn grab(&mut self) -> Option<Frame>;
}

/// Consumes frames plus their annotations, typically writing video to
/// disk. Runs out-of-process in production setups, hence the liveness
/// probe.
pub trait Recorder {
    fn push(&mut self, frame: &Frame, annotation: &FrameAnnotation) -> Result<(), Error>;
    fn is_alive(&self) -> bool;
}

/// Per-frame tracking result sink (CSV writer, debug console, ...).
pub trait DataLogger {
    fn log_frame(&mut self, annotation: &FrameAnnotation);
}

/// One object's tracking state at a single frame.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ObjectSnapshot {
    pub label: String,
    pub position: Option<(f32, f32)>,
    pub direction: Option<f32>,
    pub speed: Option<f32>,
    /// Linked marker positions, in link order. Markers flagged
    /// invisible report absent.
    pub marker_positions: Vec<Option<(f32, f32)>>,
}

/// Everything the pipeline knows about one processed frame, handed to
/// the recorder and the data logger.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrameAnnotation {
    pub timestamp: f32,
    pub objects: Vec<ObjectSnapshot>,
}

impl FrameAnnotation {
    /// Tab-separated log lines, one per object.
    pub fn log_lines(&self) -> Vec<String> {
        self.objects
            .iter()
            .map(|o| {
                let pos = match o.position {
                    Some((x, y)) => format!("({x}, {y})"),
                    None => "-".to_string(),
                };
                format!("{}\t{}\t{}", self.timestamp, o.label, pos)
            })
            .collect()
    }
}

/// Ties the whole tracking cycle together: grab a frame, mask blind
/// spots, detect markers, fuse objects, test regions, push slot states
/// out, then hand the annotated frame to the recorder and logger.
///
/// The pipeline owns every entity; cross-references between them are by
/// label and resolved fresh each cycle, so removing an entity can never
/// leave a dangling reference, only a label that no longer resolves.
pub struct Pipeline {
    pub tracker: Tracker,
    pub objects: Vec<ObjectOfInterest>,
    pub regions: Vec<Region>,
    /// Downscale factor applied before detection, capped at 1.0.
    pub scale: f32,

    source: Box<dyn FrameSource>,
    chatter: Box<dyn Chatter>,
    recorder: Option<Box<dyn Recorder>>,
    logger: Option<Box<dyn DataLogger>>,
}

impl Pipeline {
    pub fn new(tracker: Tracker, source: Box<dyn FrameSource>, chatter: Box<dyn Chatter>) -> Self {
        Self {
            tracker,
            objects: Vec::new(),
            regions: Vec::new(),
            scale: 1.0,
            source,
            chatter,
            recorder: None,
            logger: None,
        }
    }

    pub fn set_recorder(&mut self, recorder: Box<dyn Recorder>) {
        self.recorder = Some(recorder);
    }

    pub fn set_logger(&mut self, logger: Box<dyn DataLogger>) {
        self.logger = Some(logger);
    }

    pub fn add_marker(&mut self, marker: Marker) -> Result<(), Error> {
        self.tracker.add_marker(marker)
    }

    /// Remove a marker and unlink it from every object that used it.
    pub fn remove_marker(&mut self, label: &str) -> bool {
        let removed = self.tracker.remove_marker(label);
        if removed {
            for obj in &mut self.objects {
                obj.unlink_marker(label);
            }
        }
        removed
    }

    /// Link an existing marker to an existing object. Idempotent.
    pub fn link_marker(&mut self, object_label: &str, marker_label: &str) -> Result<(), Error> {
        if self.tracker.marker(marker_label).is_none() {
            return Err(Error::NotFound(marker_label.to_string()));
        }
        let obj = self
            .objects
            .iter_mut()
            .find(|o| o.label == object_label)
            .ok_or_else(|| Error::NotFound(object_label.to_string()))?;
        if !obj.linked_markers.iter().any(|l| l == marker_label) {
            obj.linked_markers.push(marker_label.to_string());
        }
        Ok(())
    }

    pub fn add_object(&mut self, object: ObjectOfInterest) -> Result<(), Error> {
        if self.object(&object.label).is_some() {
            return Err(Error::DuplicateLabel(object.label));
        }
        debug!("added object {}", object.label);
        self.objects.push(object);
        for region in &mut self.regions {
            region.refresh_slots(&self.objects);
        }
        Ok(())
    }

    /// Remove an object; every region drops its collision slot for it.
    pub fn remove_object(&mut self, label: &str) -> bool {
        let before = self.objects.len();
        self.objects.retain(|o| o.label != label);
        let removed = self.objects.len() != before;
        if removed {
            debug!("removed object {label}");
            for region in &mut self.regions {
                region.refresh_slots(&self.objects);
            }
        }
        removed
    }

    pub fn add_region(&mut self, mut region: Region) -> Result<(), Error> {
        if self.region(&region.label).is_some() {
            return Err(Error::DuplicateLabel(region.label));
        }
        region.refresh_slots(&self.objects);
        debug!("added region {}", region.label);
        self.regions.push(region);
        Ok(())
    }

    pub fn remove_region(&mut self, label: &str) -> bool {
        let before = self.regions.len();
        self.regions.retain(|r| r.label != label);
        before != self.regions.len()
    }

    pub fn add_blindspot(&mut self, blindspot: BlindSpot) {
        self.tracker.add_blindspot(blindspot);
    }

    pub fn object(&self, label: &str) -> Option<&ObjectOfInterest> {
        self.objects.iter().find(|o| o.label == label)
    }

    pub fn object_mut(&mut self, label: &str) -> Option<&mut ObjectOfInterest> {
        self.objects.iter_mut().find(|o| o.label == label)
    }

    pub fn region(&self, label: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.label == label)
    }

    pub fn region_mut(&mut self, label: &str) -> Option<&mut Region> {
        self.regions.iter_mut().find(|r| r.label == label)
    }

    /// Process one frame. `Ok(false)` means the source is exhausted.
    ///
    /// A dead recorder is abandoned rather than retried: recording stops,
    /// tracking continues, and the fault is surfaced exactly once.
    pub fn step(&mut self) -> Result<bool, Error> {
        let mut frame = match self.source.grab() {
            Some(frame) => frame,
            None => return Ok(false),
        };
        let elapsed = frame.interval;

        self.tracker.mask_blindspots(&mut frame);
        self.tracker.track_markers(&frame, self.scale, elapsed);

        for obj in &mut self.objects {
            obj.update_position(&self.tracker.markers);
            obj.update_search_windows(&mut self.tracker.markers);
            obj.update_direction(&self.tracker.markers);
            obj.update_speed(elapsed);
            obj.update_slots(self.chatter.as_ref());
        }

        for region in &mut self.regions {
            region.refresh_slots(&self.objects);
            region.update_state();
            region.evaluate(&self.objects);
            region.update_slots(self.chatter.as_ref());
        }

        let mut readings: Vec<SlotReading> = Vec::new();
        for obj in &self.objects {
            readings.extend(obj.readings());
        }
        for region in &self.regions {
            readings.extend(region.readings());
        }
        self.chatter.update_pins(&readings);

        let annotation = self.annotate(frame.timestamp);

        // log first: the per-frame series stays gapless even on a
        // recorder fault
        if let Some(logger) = self.logger.as_mut() {
            logger.log_frame(&annotation);
        }

        if let Some(recorder) = self.recorder.as_mut() {
            if recorder.is_alive() {
                recorder.push(&frame, &annotation)?;
            } else {
                error!("recorder is gone, abandoning recording");
                self.recorder = None;
                return Err(Error::RecorderDead);
            }
        }

        Ok(true)
    }

    /// Run until cancelled or the source runs dry, one `step` per
    /// `cadence` tick. Cycle faults are logged and the loop continues;
    /// a fault never stops tracking.
    pub fn run(&mut self, cancel: Arc<AtomicBool>, cadence: Duration) {
        let mut next = Instant::now();
        while !cancel.load(Ordering::Relaxed) {
            match self.step() {
                Ok(true) => {}
                Ok(false) => {
                    info!("frame source exhausted, stopping");
                    break;
                }
                Err(e) => error!("pipeline cycle failed: {e}"),
            }

            next += cadence;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            } else {
                // fell behind; resynchronize instead of bursting
                next = now;
            }
        }
    }

    fn annotate(&self, timestamp: f32) -> FrameAnnotation {
        let objects = self
            .objects
            .iter()
            .map(|o| ObjectSnapshot {
                label: o.label.clone(),
                position: o.position().map(|p| (p.x, p.y)),
                direction: o.direction(),
                speed: o.speed(),
                marker_positions: o
                    .linked_markers
                    .iter()
                    .map(|l| {
                        self.tracker
                            .marker(l)
                            .filter(|m| m.marker_visible)
                            .and_then(|m| m.position())
                            .map(|p| (p.x, p.y))
                    })
                    .collect(),
            })
            .collect();

        FrameAnnotation { timestamp, objects }
    }
}
