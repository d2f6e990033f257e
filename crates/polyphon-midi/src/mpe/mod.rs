//! MPE (MIDI Polyphonic Expression) zones, channel allocation, configuration
//! messages and per-note expression tracking.

mod assigner;
mod instrument;
mod layout;
mod messages;
mod note;
mod remapper;
mod value;
mod zone;

pub use assigner::MpeChannelAssigner;
pub use instrument::{
    InstrumentEvent, MpeInstrument, TrackingMode, CC_PRESSURE_LSB, CC_PRESSURE_MSB,
    CC_TIMBRE_LSB, CC_TIMBRE_MSB,
};
pub use layout::{
    ListenerId, MpeZoneLayout, ZoneLayoutListener, PITCHBEND_RANGE_RPN, ZONE_LAYOUT_RPN,
};
pub use messages::MpeMessages;
pub use note::{KeyState, MpeNote};
pub use remapper::MpeChannelRemapper;
pub use value::MpeValue;
pub use zone::{
    MpeZone, ZoneType, DEFAULT_MASTER_PITCHBEND_RANGE, DEFAULT_PER_NOTE_PITCHBEND_RANGE,
    MAX_MEMBER_CHANNELS, MAX_PITCHBEND_RANGE,
};
