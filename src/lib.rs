//! # polyphon - polyphonic voice allocation
//!
//! Turns a stream of timestamped MIDI events into note starts and stops on a
//! fixed pool of voices, with optional MPE channel management in front.
//!
//! ## Architecture
//!
//! polyphon is an umbrella crate that coordinates:
//! - **polyphon-midi** - Event model, RPN parsing, MPE zones and channel allocation
//! - **polyphon-synth** - Voice pool (sound filtering, stealing, pedals, rendering)
//!
//! ## Quick Start
//!
//! ```ignore
//! use polyphon::prelude::*;
//!
//! let mut synth = Synthesiser::new();
//! synth.set_current_playback_sample_rate(48000.0);
//! for _ in 0..16 {
//!     synth.add_voice(Box::new(MyVoice::default()));
//! }
//! synth.add_sound(KeyRangeSound::full_range().into_ref());
//!
//! // MPE: spread notes over the member channels of a lower zone
//! let mut assigner = MpeChannelAssigner::new(MpeZone::lower(15))?;
//! let channel = assigner.find_midi_channel_for_new_note(60);
//! synth.note_on(channel, 60, 0.8);
//!
//! synth.render_next_block(&mut output, &events, 0, block_size);
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Voice pool and MPE
//! - `mpe` - MPE zone layouts, channel assigner, remapper, instrument and
//!   synthesiser base

pub mod error;
pub use error::{Error, Result};

/// MIDI event model, RPN handling and MPE.
pub use polyphon_midi as midi;

/// Voice pool.
pub use polyphon_synth as synth;

pub use polyphon_midi::{MidiBuffer, MidiEvent};
pub use polyphon_synth::{
    KeyRangeSound, Sound, SoundRef, Synthesiser, SynthesiserConfig, Voice, VoicePlayback,
    VoiceSlot, VoiceState,
};

#[cfg(feature = "mpe")]
pub use polyphon_midi::{
    InstrumentEvent, KeyState, MpeChannelAssigner, MpeChannelRemapper, MpeInstrument, MpeMessages,
    MpeNote, MpeValue, MpeZone, MpeZoneLayout, TrackingMode, ZoneType,
};
#[cfg(feature = "mpe")]
pub use polyphon_synth::{MpeRenderer, MpeSynthesiser};

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{Error, Result};

    // Events
    pub use crate::{MidiBuffer, MidiEvent};

    // Voice pool
    pub use crate::{
        KeyRangeSound, Sound, SoundRef, Synthesiser, SynthesiserConfig, Voice, VoicePlayback,
        VoiceState,
    };

    // MPE
    #[cfg(feature = "mpe")]
    pub use crate::{
        InstrumentEvent, MpeChannelAssigner, MpeInstrument, MpeNote, MpeRenderer, MpeSynthesiser,
        MpeValue, MpeZone, MpeZoneLayout,
    };
}
