//! MIDI layer for polyphon.
//!
//! Provides the timestamped event model consumed by the voice pool, RPN/NRPN
//! parsing, MPE zone layout and channel allocation, and per-note expression
//! tracking.
//!
//! # Features
//!
//! - **Events**: [`MidiEvent`] with sample offsets and [`MidiBuffer`] for one block
//! - **RPN**: reassembly and generation of registered parameter messages
//! - **MPE**: zone layouts, channel assigner, remapper and the [`MpeInstrument`]
//!   note tracker (feature: `mpe`)
//!
//! Channels are 1-based (1-16) throughout the API.
//!
//! # Example
//!
//! ```ignore
//! use polyphon_midi::{MpeChannelAssigner, MpeZone};
//!
//! let mut assigner = MpeChannelAssigner::new(MpeZone::lower(3))?;
//! let channel = assigner.find_midi_channel_for_new_note(60);
//! assert_eq!(channel, 2);
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod event;
pub mod rpn;
pub mod utils;

#[cfg(feature = "mpe")]
pub mod mpe;

pub use event::{
    MidiBuffer, MidiEvent, CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_RESET_ALL_CONTROLLERS,
    CC_SOFT_PEDAL, CC_SOSTENUTO, CC_SUSTAIN, PITCH_WHEEL_CENTRE,
};
pub use rpn::{RpnDetector, RpnMessage};
pub use utils::{note_to_hz, note_to_hz_with_reference, pitch_wheel_to_bipolar, velocity_to_gain};

#[cfg(feature = "mpe")]
pub use mpe::{
    InstrumentEvent, KeyState, MpeChannelAssigner, MpeChannelRemapper, MpeInstrument, MpeMessages,
    MpeNote, MpeValue, MpeZone, MpeZoneLayout, TrackingMode, ZoneLayoutListener, ZoneType,
};

// Re-export midi-msg types used in public signatures
pub use midi_msg::{Channel, ChannelVoiceMsg, ControlChange};
