pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod history;
pub mod kalman;
pub mod marker;
pub mod object;
pub mod pipeline;
pub mod region;
pub mod shape;
pub mod slot;
pub mod tracker;

pub use crate::config::TrackerTemplate;
pub use crate::error::Error;
pub use crate::frame::{Frame, SourceKind};
pub use crate::history::History;
pub use crate::marker::Marker;
pub use crate::object::ObjectOfInterest;
pub use crate::pipeline::{DataLogger, FrameAnnotation, FrameSource, Pipeline, Recorder};
pub use crate::region::Region;
pub use crate::shape::{Shape, ShapeKind};
pub use crate::slot::{Chatter, PinPreference, Slot, SlotKind, SlotReading, SlotSource, SlotValue};
pub use crate::tracker::{BlindSpot, Tracker};
