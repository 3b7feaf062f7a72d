use serde_derive::{Deserialize, Serialize};

/// Electrical flavor of an output line.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    Digital,
    Analog,
}

/// Configured wish to wire a named slot to a specific physical pin.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PinPreference {
    /// Slot label ("x position", "speed", or an object label for
    /// region collision slots).
    pub slot: String,
    pub pin: String,
}

/// Which piece of tracker state a slot reads. Resolved against the
/// owning object or region at push time; slots never store accessor
/// callables, so removing the owner cannot leave a dangling binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSource {
    PositionX,
    PositionY,
    Direction,
    Speed,
    /// "object with this label currently collides with the owning region"
    Collision(String),
}

impl SlotSource {
    pub fn label(&self) -> &str {
        match self {
            SlotSource::PositionX => "x position",
            SlotSource::PositionY => "y position",
            SlotSource::Direction => "direction",
            SlotSource::Speed => "speed",
            SlotSource::Collision(obj) => obj,
        }
    }
}

/// A named binding between a state source and (optionally) a physical
/// output pin. Attaching or detaching a pin changes only the binding,
/// never the state source.
#[derive(Debug, Clone)]
pub struct Slot {
    pub kind: SlotKind,
    pub source: SlotSource,
    pub pin: Option<String>,
    pub pin_pref: Option<String>,
}

impl Slot {
    pub fn new(kind: SlotKind, source: SlotSource) -> Self {
        Self {
            kind,
            source,
            pin: None,
            pin_pref: None,
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        self.source.label()
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.pin.is_some()
    }

    pub fn attach_pin(&mut self, pin: impl Into<String>) {
        self.pin = Some(pin.into());
    }

    pub fn detach_pin(&mut self) {
        self.pin = None;
    }

    /// Bind to the first candidate pin matching the configured
    /// preference. No-op when already bound or without a preference.
    pub fn bind_preferred(&mut self, chatter: &dyn Chatter) {
        let pref = match (&self.pin_pref, &self.pin) {
            (Some(pref), None) => pref.clone(),
            _ => return,
        };
        for pin in chatter.pins_for_slot(self) {
            if pin == pref {
                self.attach_pin(pin);
                break;
            }
        }
    }
}

/// Value carried by one slot for one cycle. Absent means "unknown this
/// frame" (lost marker, untestable collision), not zero/false.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotValue {
    Digital(Option<bool>),
    Analog(Option<f32>),
}

/// One pin-bound slot's state, pushed to the output channel per cycle.
#[derive(Debug, Clone)]
pub struct SlotReading {
    pub pin: String,
    pub label: String,
    pub value: SlotValue,
}

/// The physical output channel. Maps slots to I/O lines; implementations
/// live outside the tracking core (serial link to a microcontroller,
/// test doubles, ...).
pub trait Chatter {
    /// Candidate pin identifiers compatible with the slot's kind.
    fn pins_for_slot(&self, slot: &Slot) -> Vec<String>;

    /// Actuate all currently bound slots with this cycle's values.
    fn update_pins(&mut self, readings: &[SlotReading]);
}
